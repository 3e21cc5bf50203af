//! MCP Tools Implementation
//!
//! Tool definitions and handlers exposing collection search, listing, reload
//! and sync. Core calls block on embedding and file I/O, so every handler runs
//! them on tokio's blocking pool.

use crate::SemanticError;
use crate::mcp::errors::{McpError, McpResult};
use crate::mcp::protocol::*;
use crate::mcp::server::ToolHandler;
use crate::registry::CollectionRegistry;
use crate::search::SearchService;
use crate::sync::{RELOADED_STATUS, SYNCED_STATUS, SyncController};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

type Arguments = HashMap<String, Value>;

/// Collection search tool handler
pub struct SearchHandler {
    service: Arc<SearchService>,
}

/// Full collection dump tool handler
pub struct ListRecordsHandler {
    service: Arc<SearchService>,
}

/// Loaded collections overview tool handler
pub struct ListCollectionsHandler {
    registry: Arc<CollectionRegistry>,
}

/// Reload-from-disk tool handler
pub struct ReloadHandler {
    controller: Arc<SyncController>,
}

/// Pull-then-reload tool handler
pub struct SyncHandler {
    controller: Arc<SyncController>,
}

impl SearchHandler {
    #[inline]
    pub fn new(service: Arc<SearchService>) -> Self {
        Self { service }
    }

    /// Create the search tool definition
    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "search".to_string(),
            description: Some(
                "Find the records of a collection most similar to a natural-language query"
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "collection": {
                        "type": "string",
                        "description": "Collection to search (see list_collections)"
                    },
                    "query": {
                        "type": "string",
                        "description": "Search query"
                    },
                    "top_k": {
                        "type": "integer",
                        "description": "Maximum number of results (default: 3)"
                    }
                },
                "required": ["collection", "query"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for SearchHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> McpResult<CallToolResult> {
        let tool = params.name;
        let args = params.arguments.unwrap_or_default();

        let collection = required_str(&args, &tool, "collection")?.to_string();
        let query = required_str(&args, &tool, "query")?.to_string();
        let top_k = top_k_argument(&args, &tool, self.service.default_top_k())?;

        debug!(
            "Searching collection: collection='{}', query='{}', top_k={}",
            collection, query, top_k
        );

        let service = Arc::clone(&self.service);
        let outcome =
            tokio::task::spawn_blocking(move || service.search(&collection, &query, top_k))
                .await?;

        match outcome {
            Ok(results) => Ok(CallToolResult::json(&serde_json::to_value(results)?)?),
            Err(e) => Ok(core_error(&tool, &e)),
        }
    }
}

impl ListRecordsHandler {
    #[inline]
    pub fn new(service: Arc<SearchService>) -> Self {
        Self { service }
    }

    /// Create the list_records tool definition
    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "list_records".to_string(),
            description: Some("List every record of a collection, unranked".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "collection": {
                        "type": "string",
                        "description": "Collection to list"
                    }
                },
                "required": ["collection"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for ListRecordsHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> McpResult<CallToolResult> {
        let tool = params.name;
        let args = params.arguments.unwrap_or_default();
        let collection = required_str(&args, &tool, "collection")?;

        debug!("Listing records of '{}'", collection);

        match self.service.list_all(collection) {
            Ok(list) => Ok(CallToolResult::json(&serde_json::to_value(list)?)?),
            Err(e) => Ok(core_error(&tool, &e)),
        }
    }
}

impl ListCollectionsHandler {
    #[inline]
    pub fn new(registry: Arc<CollectionRegistry>) -> Self {
        Self { registry }
    }

    /// Create the list_collections tool definition
    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "list_collections".to_string(),
            description: Some("List loaded collections with record counts".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for ListCollectionsHandler {
    #[inline]
    async fn handle(&self, _params: CallToolParams) -> McpResult<CallToolResult> {
        debug!("Listing collections");

        let response = json!({ "collections": self.registry.summaries() });
        Ok(CallToolResult::json(&response)?)
    }
}

impl ReloadHandler {
    #[inline]
    pub fn new(controller: Arc<SyncController>) -> Self {
        Self { controller }
    }

    /// Create the reload tool definition
    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "reload".to_string(),
            description: Some(
                "Reload every collection from its source file and rebuild its index".to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for ReloadHandler {
    #[inline]
    async fn handle(&self, _params: CallToolParams) -> McpResult<CallToolResult> {
        let controller = Arc::clone(&self.controller);
        let report = tokio::task::spawn_blocking(move || controller.reload()).await?;

        let response = json!({
            "status": RELOADED_STATUS,
            "collections": report,
        });
        Ok(CallToolResult::json(&response)?)
    }
}

impl SyncHandler {
    #[inline]
    pub fn new(controller: Arc<SyncController>) -> Self {
        Self { controller }
    }

    /// Create the sync tool definition
    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "sync".to_string(),
            description: Some(
                "Pull the latest collection sources from their remote, then reload".to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for SyncHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> McpResult<CallToolResult> {
        let controller = Arc::clone(&self.controller);
        let outcome = tokio::task::spawn_blocking(move || controller.sync()).await?;

        match outcome {
            Ok(report) => {
                let response = json!({
                    "status": SYNCED_STATUS,
                    "collections": report,
                });
                Ok(CallToolResult::json(&response)?)
            }
            Err(e) => {
                warn!("Tool '{}' failed: {}", params.name, e);
                let mut result = CallToolResult::json(&json!({ "error": e.to_string() }))?;
                result.is_error = Some(true);
                Ok(result)
            }
        }
    }
}

fn required_str<'a>(args: &'a Arguments, tool: &str, key: &str) -> McpResult<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| McpError::InvalidToolParameters {
            tool: tool.to_string(),
            message: format!("Missing required parameter: {}", key),
        })
}

/// `top_k` as a result count; absent means `default`, zero or negative means none
fn top_k_argument(args: &Arguments, tool: &str, default: usize) -> McpResult<usize> {
    match args.get("top_k") {
        None | Some(Value::Null) => Ok(default),
        Some(value) => {
            let top_k = value
                .as_i64()
                .ok_or_else(|| McpError::InvalidToolParameters {
                    tool: tool.to_string(),
                    message: format!("top_k must be an integer, got {}", value),
                })?;
            Ok(usize::try_from(top_k.max(0)).unwrap_or(usize::MAX))
        }
    }
}

fn core_error(tool: &str, error: &SemanticError) -> CallToolResult {
    warn!("Tool '{}' failed: {}", tool, error);
    CallToolResult::error(error.to_string())
}
