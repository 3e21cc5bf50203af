//! MCP Server Implementation
//!
//! Line-delimited JSON-RPC over stdio: connection state, tool registration and
//! message routing.

use crate::mcp::errors::{McpError, McpResult};
use crate::mcp::protocol::*;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, error, info, warn};

/// MCP Server state and configuration
pub struct McpServer {
    /// Server implementation information
    pub server_info: Implementation,
    /// Server capabilities
    pub capabilities: ServerCapabilities,
    /// Registered tools
    pub tools: Arc<RwLock<HashMap<String, Tool>>>,
    /// Tool handlers
    pub tool_handlers: Arc<RwLock<HashMap<String, Arc<dyn ToolHandler>>>>,
    /// Connection state
    pub connection_state: Arc<RwLock<ConnectionState>>,
}

/// Connection state tracking
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

/// Tool handler trait for implementing tool execution
///
/// Errors returned here become JSON-RPC errors. Failures the client should
/// read as a tool outcome belong in a [`CallToolResult::error`] instead.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, params: CallToolParams) -> McpResult<CallToolResult>;
}

impl McpServer {
    /// Create a new MCP server
    #[inline]
    pub fn new(name: String, version: String) -> Self {
        let server_info = Implementation { name, version };

        let capabilities = ServerCapabilities {
            logging: Some(LoggingCapability {}),
            tools: Some(ToolsCapability {
                list_changed: Some(false),
            }),
        };

        Self {
            server_info,
            capabilities,
            tools: Arc::new(RwLock::new(HashMap::new())),
            tool_handlers: Arc::new(RwLock::new(HashMap::new())),
            connection_state: Arc::new(RwLock::new(ConnectionState::Uninitialized)),
        }
    }

    /// Register a tool with the server
    #[inline]
    pub async fn register_tool<H>(&self, tool: Tool, handler: H)
    where
        H: ToolHandler + 'static,
    {
        let tool_name = tool.name.clone();

        {
            let mut tools = self.tools.write().await;
            tools.insert(tool_name.clone(), tool);
        }

        {
            let mut handlers = self.tool_handlers.write().await;
            handlers.insert(tool_name.clone(), Arc::new(handler));
        }

        debug!("Registered tool: {}", tool_name);
    }

    /// Start the server using stdio transport
    #[inline]
    pub async fn serve_stdio(self: Arc<Self>) -> Result<()> {
        info!("Starting MCP server with stdio transport");
        self.serve(BufReader::new(io::stdin()), io::stdout()).await
    }

    /// Serve line-delimited JSON-RPC messages until `reader` reaches EOF
    ///
    /// Tool calls run on their own tasks and reply as they finish, so a long
    /// `sync` never holds up a search sent after it. Every other message is
    /// handled in arrival order. Calls still running at EOF are awaited and
    /// answered before returning.
    #[inline]
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<JsonRpcMessage>();
        let mut lines = reader.lines();

        loop {
            tokio::select! {
                Some(reply) = reply_rx.recv() => {
                    send_message(&mut writer, &reply).await?;
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }

                        if is_tool_call(line) {
                            let server = Arc::clone(&self);
                            let reply_tx = reply_tx.clone();
                            let line = line.to_string();
                            tokio::spawn(async move {
                                let Some(reply) = server.handle_line(&line).await else {
                                    return;
                                };
                                if reply_tx.send(reply).is_err() {
                                    warn!("Dropped tool reply, connection already closed");
                                }
                            });
                        } else if let Some(reply) = self.handle_line(line).await {
                            send_message(&mut writer, &reply).await?;
                        }
                    }
                    Ok(None) => {
                        info!("EOF reached, closing connection");
                        break;
                    }
                    Err(e) => {
                        error!("Error reading from stdin: {}", e);
                        break;
                    }
                },
            }
        }

        drop(reply_tx);
        while let Some(reply) = reply_rx.recv().await {
            send_message(&mut writer, &reply).await?;
        }

        {
            let mut state = self.connection_state.write().await;
            *state = ConnectionState::Closed;
        }

        info!("MCP server stopped");
        Ok(())
    }

    /// Process one raw message, returning the reply to send, if any
    #[inline]
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcMessage> {
        let raw_value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                let error = McpError::ParseError {
                    message: e.to_string(),
                };
                error.log();
                return Some(error.to_error_response(None));
            }
        };

        let id = raw_value
            .get("id")
            .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok());

        let message = match parse_message(raw_value) {
            Ok(message) => message,
            Err(error) => {
                error.log();
                return Some(error.to_error_response(id));
            }
        };

        match message {
            JsonRpcMessage::Request(request) => Some(self.handle_request(request).await),
            JsonRpcMessage::Notification(notification) => {
                self.handle_notification(notification).await;
                None
            }
            JsonRpcMessage::Response(_) | JsonRpcMessage::ErrorResponse(_) => {
                warn!("Received unexpected response message from client");
                None
            }
        }
    }

    /// Get current connection state
    #[inline]
    pub async fn connection_state(&self) -> ConnectionState {
        self.connection_state.read().await.clone()
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcMessage {
        debug!("Handling request: {}", request.method);

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "tools/list" => self.handle_list_tools().await,
            "tools/call" => self.handle_call_tool(request.params).await,
            "ping" => Ok(serde_json::json!({})),
            method => Err(McpError::MethodNotFound {
                method: method.to_string(),
            }),
        };

        match result {
            Ok(result) => JsonRpcMessage::Response(JsonRpcResponse::new(result, request.id)),
            Err(error) => {
                error.log();
                error.to_error_response(Some(request.id))
            }
        }
    }

    async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "initialized" | "notifications/initialized" => {
                let mut state = self.connection_state.write().await;
                *state = ConnectionState::Ready;
                info!("Server ready to handle requests");
            }
            "notifications/cancelled" => {
                debug!("Received cancellation notification");
            }
            _ => {
                warn!("Unknown notification method: {}", notification.method);
            }
        }
    }

    async fn handle_initialize(&self, params: Option<Value>) -> McpResult<Value> {
        let params: InitializeParams = match params {
            Some(p) => serde_json::from_value(p)?,
            None => {
                return Err(McpError::InvalidParameters {
                    message: "Initialize request missing parameters".to_string(),
                });
            }
        };

        if !SUPPORTED_VERSIONS.contains(&params.protocol_version.as_str()) {
            return Err(McpError::UnsupportedProtocolVersion {
                version: params.protocol_version,
                supported: SUPPORTED_VERSIONS.iter().map(ToString::to_string).collect(),
            });
        }

        {
            let mut state = self.connection_state.write().await;
            *state = ConnectionState::Initializing;
        }

        let result = InitializeResult {
            protocol_version: params.protocol_version,
            capabilities: self.capabilities.clone(),
            server_info: self.server_info.clone(),
            instructions: Some(
                "Semantic search over named record collections. Use list_collections to see \
                 what is loaded, then search a collection with a natural-language query."
                    .to_string(),
            ),
        };

        info!("Client initialized: {}", params.client_info.name);
        Ok(serde_json::to_value(result)?)
    }

    async fn handle_list_tools(&self) -> McpResult<Value> {
        let tools = self.tools.read().await;
        let mut tools_vec: Vec<Tool> = tools.values().cloned().collect();
        tools_vec.sort_by(|a, b| a.name.cmp(&b.name));

        let result = ListToolsResult { tools: tools_vec };
        Ok(serde_json::to_value(result)?)
    }

    async fn handle_call_tool(&self, params: Option<Value>) -> McpResult<Value> {
        let params: CallToolParams = match params {
            Some(p) => serde_json::from_value(p)?,
            None => {
                return Err(McpError::InvalidParameters {
                    message: "Tool call request missing parameters".to_string(),
                });
            }
        };

        // Clone the handler out so the lock isn't held across the call
        let handler = {
            let handlers = self.tool_handlers.read().await;
            handlers
                .get(&params.name)
                .cloned()
                .ok_or_else(|| McpError::ToolNotFound {
                    name: params.name.clone(),
                })?
        };

        let result = handler.handle(params).await?;
        Ok(serde_json::to_value(result)?)
    }
}

impl Clone for McpServer {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            server_info: self.server_info.clone(),
            capabilities: self.capabilities.clone(),
            tools: Arc::clone(&self.tools),
            tool_handlers: Arc::clone(&self.tool_handlers),
            connection_state: Arc::clone(&self.connection_state),
        }
    }
}

/// Whether a raw line is a `tools/call` request
fn is_tool_call(line: &str) -> bool {
    serde_json::from_str::<Value>(line).is_ok_and(|value| {
        value.get("method").and_then(Value::as_str) == Some("tools/call")
    })
}

fn parse_message(raw_value: Value) -> McpResult<JsonRpcMessage> {
    if raw_value.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(McpError::InvalidRequest {
            message: format!("Expected \"jsonrpc\": \"{}\"", JSONRPC_VERSION),
        });
    }

    serde_json::from_value(raw_value).map_err(|e| McpError::InvalidRequest {
        message: e.to_string(),
    })
}

/// Send a message to the client
async fn send_message<W>(writer: &mut W, message: &JsonRpcMessage) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_string(message)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
