//! RPC message types shared by the gateway, the providers and the client.
//!
//! Uses JSON Lines (newline-delimited JSON) over a TCP stream.
//! Message schema uses familiar field names (id, method, params, result, error)
//! but does NOT implement JSON-RPC 2.0 specification.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Method names understood by the servers in this crate.
pub mod methods {
    pub const PING: &str = "ping";
    pub const TOOLS_LIST: &str = "tools.list";
    pub const TOOLS_INVOKE: &str = "tools.invoke";
    pub const RESOURCES_READ: &str = "resources.read";
    pub const GATEWAY_ASK: &str = "gateway.ask";
    pub const CATALOG_STATUS: &str = "catalog.status";
}

/// Request sent to a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Unique request ID for correlating responses.
    pub id: u64,
    /// Method name (e.g., "tools.list", "gateway.ask").
    pub method: String,
    /// Method parameters as JSON value.
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    /// Create a new request with the given method and params.
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }

    /// Create a request with no parameters.
    pub fn no_params(id: u64, method: impl Into<String>) -> Self {
        Self::new(id, method, Value::Object(Default::default()))
    }
}

/// Response sent back by a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Request ID this response corresponds to.
    pub id: u64,
    /// Result value on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error details on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Create a success response.
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: u64, error: RpcError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Check if this response indicates success.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Split into the result value or the error.
    pub fn into_result(self) -> std::result::Result<Value, RpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Error details in a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Error code.
    pub code: i32,
    /// Human-readable error message.
    pub message: String,
    /// Additional error data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Create a new error.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create an error with additional data.
    pub fn with_data(code: i32, message: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Parse error (-32700).
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PARSE_ERROR, message)
    }

    /// Method not found error (-32601).
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::METHOD_NOT_FOUND,
            format!("Unknown method: {}", method.into()),
        )
    }

    /// Invalid params error (-32602).
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INVALID_PARAMS, message)
    }

    /// Internal error (-32603).
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INTERNAL_ERROR, message)
    }

    /// Unknown tool error (1001).
    pub fn unknown_tool(name: impl Into<String>) -> Self {
        Self::new(ErrorCode::UNKNOWN_TOOL, format!("Unknown tool: {}", name.into()))
    }
}

/// Standard error codes.
pub struct ErrorCode;

impl ErrorCode {
    /// Invalid JSON.
    pub const PARSE_ERROR: i32 = -32700;
    /// Unknown method.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid parameters, including invalid tool arguments.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal server error.
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Provider does not offer the tool.
    pub const UNKNOWN_TOOL: i32 = 1001;
    /// Tool ran and reported a failure.
    pub const TOOL_FAILED: i32 = 1002;
    /// Gateway could not complete a turn; `data.kind` carries the taxonomy.
    pub const TURN_FAILED: i32 = 1003;
}
