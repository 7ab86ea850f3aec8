//! Provider transport - how the gateway reaches a provider
//!
//! The cache and the router only see `ProviderTransport`; `RpcTransport` is the
//! production implementation and `MockTransport` a scripted double.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::domain::{ProviderEndpoint, ToolDescriptor};
use crate::ipc::{ErrorCode, RpcClient, methods};

/// Failure talking to a provider
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    /// Could not reach the provider or it did not answer in time
    #[error("{0}")]
    Unavailable(String),

    /// Provider answered with a fault
    #[error("provider fault {code}: {message}")]
    Fault {
        code: i32,
        message: String,
        detail: Option<Value>,
    },
}

impl TransportError {
    pub fn fault(code: i32, message: impl Into<String>) -> Self {
        Self::Fault {
            code,
            message: message.into(),
            detail: None,
        }
    }
}

/// Call/response primitive towards tool providers
#[async_trait]
pub trait ProviderTransport: Send + Sync {
    /// Fetch the provider's tool catalog
    async fn list_tools(&self, endpoint: &ProviderEndpoint) -> Result<Vec<ToolDescriptor>, TransportError>;

    /// Invoke a tool and return its raw payload
    async fn invoke(
        &self,
        endpoint: &ProviderEndpoint,
        tool_name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Value, TransportError>;
}

/// Transport over the crate's newline-delimited JSON RPC
#[derive(Debug, Clone)]
pub struct RpcTransport {
    timeout: Duration,
}

impl RpcTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn call(&self, endpoint: &ProviderEndpoint, method: &str, params: Value) -> Result<Value, TransportError> {
        let client = RpcClient::new(endpoint.address.clone(), self.timeout);
        let response = client
            .call(method, params)
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;

        response.into_result().map_err(|e| TransportError::Fault {
            code: e.code,
            message: e.message,
            detail: e.data,
        })
    }
}

#[async_trait]
impl ProviderTransport for RpcTransport {
    async fn list_tools(&self, endpoint: &ProviderEndpoint) -> Result<Vec<ToolDescriptor>, TransportError> {
        let result = self.call(endpoint, methods::TOOLS_LIST, json!({})).await?;
        let tools = result
            .get("tools")
            .cloned()
            .ok_or_else(|| TransportError::fault(ErrorCode::PARSE_ERROR, "tools.list response has no 'tools' field"))?;

        serde_json::from_value(tools)
            .map_err(|e| TransportError::fault(ErrorCode::PARSE_ERROR, format!("Malformed tool catalog: {}", e)))
    }

    async fn invoke(
        &self,
        endpoint: &ProviderEndpoint,
        tool_name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Value, TransportError> {
        let params = json!({
            "name": tool_name,
            "arguments": arguments,
        });
        self.call(endpoint, methods::TOOLS_INVOKE, params).await
    }
}

/// Scripted transport for tests
///
/// Catalogs and tool replies are keyed by provider id. Every invocation is
/// recorded so tests can assert which provider was (or was not) called.
#[derive(Debug, Default)]
pub struct MockTransport {
    catalogs: Mutex<HashMap<String, Result<Vec<ToolDescriptor>, TransportError>>>,
    replies: Mutex<HashMap<(String, String), Result<Value, TransportError>>>,
    delay: Option<Duration>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(self, provider_id: &str, tools: Vec<ToolDescriptor>) -> Self {
        self.set_catalog(provider_id, Ok(tools));
        self
    }

    pub fn with_reply(self, provider_id: &str, tool_name: &str, reply: Result<Value, TransportError>) -> Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.insert((provider_id.to_string(), tool_name.to_string()), reply);
        }
        self
    }

    /// Delay every invocation, to exercise timeouts
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replace what `list_tools` returns for a provider
    pub fn set_catalog(&self, provider_id: &str, catalog: Result<Vec<ToolDescriptor>, TransportError>) {
        if let Ok(mut catalogs) = self.catalogs.lock() {
            catalogs.insert(provider_id.to_string(), catalog);
        }
    }

    /// `(provider_id, tool_name)` for every invocation so far
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ProviderTransport for MockTransport {
    async fn list_tools(&self, endpoint: &ProviderEndpoint) -> Result<Vec<ToolDescriptor>, TransportError> {
        let catalogs = self
            .catalogs
            .lock()
            .map_err(|_| TransportError::Unavailable("mock poisoned".to_string()))?;
        catalogs
            .get(&endpoint.provider_id)
            .cloned()
            .unwrap_or_else(|| Err(TransportError::Unavailable("connection refused".to_string())))
    }

    async fn invoke(
        &self,
        endpoint: &ProviderEndpoint,
        tool_name: &str,
        _arguments: &Map<String, Value>,
    ) -> Result<Value, TransportError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((endpoint.provider_id.clone(), tool_name.to_string()));
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let replies = self
            .replies
            .lock()
            .map_err(|_| TransportError::Unavailable("mock poisoned".to_string()))?;
        replies
            .get(&(endpoint.provider_id.clone(), tool_name.to_string()))
            .cloned()
            .unwrap_or_else(|| Err(TransportError::Unavailable("connection refused".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_mock_records_calls() {
        let transport = MockTransport::new().with_reply("dt", "get_current_date", Ok(json!("2025-04-05")));
        let endpoint = ProviderEndpoint::new("dt", "127.0.0.1:1");

        let value = transport.invoke(&endpoint, "get_current_date", &Map::new()).await.unwrap();
        assert_eq!(value, json!("2025-04-05"));
        assert_eq!(transport.calls(), vec![("dt".to_string(), "get_current_date".to_string())]);
    }

    #[tokio::test]
    async fn test_mock_unscripted_is_unavailable() {
        let transport = MockTransport::new();
        let endpoint = ProviderEndpoint::new("sql", "127.0.0.1:1");
        let err = transport.list_tools(&endpoint).await.unwrap_err();
        assert!(matches!(err, TransportError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_rpc_transport_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = RpcTransport::new(Duration::from_millis(500));
        let endpoint = ProviderEndpoint::new("sql", addr.to_string());
        let err = transport.list_tools(&endpoint).await.unwrap_err();
        assert!(matches!(err, TransportError::Unavailable(_)));
    }

    #[test]
    fn test_fault_display() {
        let err = TransportError::fault(ErrorCode::TOOL_FAILED, "boom");
        assert_eq!(err.to_string(), "provider fault 1002: boom");
    }
}
