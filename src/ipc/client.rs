//! RPC client used by the gateway (towards providers) and the CLI (towards the gateway).
//!
//! Each call opens its own connection, writes one request line and waits for
//! one response line. The whole exchange is bounded by the configured timeout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::error::{GatewayError, Result};
use crate::ipc::messages::{RpcRequest, RpcResponse, methods};

/// Client for one RPC server address
#[derive(Debug)]
pub struct RpcClient {
    address: String,
    timeout: Duration,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send a request and wait for its response.
    ///
    /// Transport failures (connect, IO, timeout, garbled reply) are
    /// `GatewayError::Ipc`; an error *response* is returned as `Ok`.
    pub async fn call(&self, method: &str, params: Value) -> Result<RpcResponse> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = RpcRequest::new(id, method, params);

        match tokio::time::timeout(self.timeout, self.exchange(&request)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Ipc(format!(
                "Request '{}' to {} timed out after {}ms",
                method,
                self.address,
                self.timeout.as_millis()
            ))),
        }
    }

    /// Send ping request.
    pub async fn ping(&self) -> Result<bool> {
        let response = self.call(methods::PING, serde_json::json!({})).await?;
        Ok(response.is_success())
    }

    async fn exchange(&self, request: &RpcRequest) -> Result<RpcResponse> {
        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(|e| GatewayError::Ipc(format!("Failed to connect to {}: {}", self.address, e)))?;
        let (reader, mut writer) = stream.into_split();

        let json = serde_json::to_string(request)?;
        writer
            .write_all(json.as_bytes())
            .await
            .map_err(|e| GatewayError::Ipc(format!("Failed to write: {}", e)))?;
        writer
            .write_all(b"\n")
            .await
            .map_err(|e| GatewayError::Ipc(format!("Failed to write newline: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| GatewayError::Ipc(format!("Failed to flush: {}", e)))?;

        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        let read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| GatewayError::Ipc(format!("Failed to read response: {}", e)))?;
        if read == 0 {
            return Err(GatewayError::Ipc(format!(
                "Connection to {} closed before a response arrived",
                self.address
            )));
        }

        let response: RpcResponse = serde_json::from_str(line.trim())
            .map_err(|e| GatewayError::Ipc(format!("Malformed response from {}: {}", self.address, e)))?;
        if response.id != request.id {
            return Err(GatewayError::Ipc(format!(
                "Response id {} does not match request id {}",
                response.id, request.id
            )));
        }

        Ok(response)
    }
}
