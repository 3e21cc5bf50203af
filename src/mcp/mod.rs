//! MCP (Model Context Protocol) Server Implementation
//!
//! A JSON-RPC 2.0 server on stdio (MCP protocol version 2025-06-18) exposing
//! collection search, listing, reload and sync as tools.

#[cfg(test)]
mod tests;

pub mod errors;
pub mod protocol;
pub mod server;
pub mod tools;

use std::sync::Arc;

use crate::registry::CollectionRegistry;
use crate::search::SearchService;
use crate::sync::SyncController;

pub use errors::{McpError, McpResult};
pub use protocol::{CallToolParams, CallToolResult, JsonRpcMessage, RequestId, Tool, ToolContent};
pub use server::{ConnectionState, McpServer, ToolHandler};
pub use tools::{
    ListCollectionsHandler, ListRecordsHandler, ReloadHandler, SearchHandler, SyncHandler,
};

/// Build a server with every collection tool registered
#[inline]
pub async fn collection_server(
    service: Arc<SearchService>,
    registry: Arc<CollectionRegistry>,
    controller: Arc<SyncController>,
) -> McpServer {
    let server = McpServer::new(
        env!("CARGO_PKG_NAME").to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    );

    server
        .register_tool(
            SearchHandler::tool_definition(),
            SearchHandler::new(Arc::clone(&service)),
        )
        .await;
    server
        .register_tool(
            ListRecordsHandler::tool_definition(),
            ListRecordsHandler::new(service),
        )
        .await;
    server
        .register_tool(
            ListCollectionsHandler::tool_definition(),
            ListCollectionsHandler::new(registry),
        )
        .await;
    server
        .register_tool(
            ReloadHandler::tool_definition(),
            ReloadHandler::new(Arc::clone(&controller)),
        )
        .await;
    server
        .register_tool(SyncHandler::tool_definition(), SyncHandler::new(controller))
        .await;

    server
}
