//! MCP Error Handling
//!
//! Classifies transport-level failures and maps them onto JSON-RPC error codes.

use crate::mcp::protocol::*;
use thiserror::Error;
use tracing::{error, warn};

/// MCP-specific errors that can occur during server operation
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Protocol version not supported: {version}. Supported versions: {supported:?}")]
    UnsupportedProtocolVersion {
        version: String,
        supported: Vec<String>,
    },

    #[error("Tool not found: {name}")]
    ToolNotFound { name: String },

    #[error("Invalid tool parameters for {tool}: {message}")]
    InvalidToolParameters { tool: String, message: String },

    #[error("Tool execution failed for {tool}: {message}")]
    ToolExecutionFailed { tool: String, message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Internal server error: {message}")]
    InternalError { message: String },

    #[error("JSON-RPC parse error: {message}")]
    ParseError { message: String },

    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    #[error("Invalid parameters: {message}")]
    InvalidParameters { message: String },
}

impl McpError {
    /// Convert MCP error to JSON-RPC error
    #[inline]
    pub fn to_jsonrpc_error(&self) -> JsonRpcError {
        let code = match self {
            Self::UnsupportedProtocolVersion { .. } => mcp_error_codes::INVALID_PROTOCOL_VERSION,
            Self::ToolNotFound { .. } => mcp_error_codes::TOOL_NOT_FOUND,
            Self::InvalidToolParameters { .. } | Self::InvalidParameters { .. } => {
                error_codes::INVALID_PARAMS
            }
            Self::ToolExecutionFailed { .. } | Self::InternalError { .. } => {
                error_codes::INTERNAL_ERROR
            }
            Self::InvalidRequest { .. } => error_codes::INVALID_REQUEST,
            Self::ParseError { .. } => error_codes::PARSE_ERROR,
            Self::MethodNotFound { .. } => error_codes::METHOD_NOT_FOUND,
        };

        JsonRpcError::new(code, self.to_string(), None)
    }

    /// Create error response message
    #[inline]
    pub fn to_error_response(&self, id: Option<RequestId>) -> JsonRpcMessage {
        let error = self.to_jsonrpc_error();
        JsonRpcMessage::ErrorResponse(JsonRpcErrorResponse::new(error, id))
    }

    /// Log the error with appropriate level
    #[inline]
    pub fn log(&self) {
        match self {
            Self::ParseError { .. }
            | Self::InvalidRequest { .. }
            | Self::InvalidParameters { .. }
            | Self::InvalidToolParameters { .. }
            | Self::MethodNotFound { .. }
            | Self::ToolNotFound { .. }
            | Self::UnsupportedProtocolVersion { .. } => {
                warn!("Client error: {}", self);
            }
            Self::ToolExecutionFailed { .. } | Self::InternalError { .. } => {
                error!("Server error: {}", self);
            }
        }
    }
}

/// Result type for MCP operations
pub type McpResult<T> = Result<T, McpError>;

impl From<anyhow::Error> for McpError {
    #[inline]
    fn from(error: anyhow::Error) -> Self {
        Self::InternalError {
            message: format!("{:#}", error),
        }
    }
}

impl From<serde_json::Error> for McpError {
    #[inline]
    fn from(error: serde_json::Error) -> Self {
        Self::InvalidParameters {
            message: error.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for McpError {
    #[inline]
    fn from(error: tokio::task::JoinError) -> Self {
        Self::InternalError {
            message: format!("Blocking task failed: {}", error),
        }
    }
}
