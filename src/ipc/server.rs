//! RPC Server - TCP listener speaking newline-delimited JSON
//!
//! Provides:
//! - TCP stream listener with a client cap
//! - Per-connection request handling, one spawned task per request
//! - Caller-disconnect detection surfaced through `RequestContext`

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::error::{GatewayError, Result};
use crate::ipc::messages::{RpcError, RpcRequest, RpcResponse, methods};

/// Default maximum number of concurrently connected clients
pub const DEFAULT_MAX_CLIENTS: usize = 64;

/// Per-request context handed to handlers
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    caller_gone: Arc<AtomicBool>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the caller has disconnected
    pub fn is_cancelled(&self) -> bool {
        self.caller_gone.load(Ordering::SeqCst)
    }

    /// Mark the caller as gone
    pub fn cancel(&self) {
        self.caller_gone.store(true, Ordering::SeqCst);
    }
}

/// Handler trait for processing requests
pub trait RequestHandler: Send + Sync {
    /// Handle a request and return a response
    fn handle(
        &self,
        request: RpcRequest,
        ctx: RequestContext,
    ) -> impl Future<Output = RpcResponse> + Send;
}

/// RPC server bound to a TCP address
pub struct RpcServer {
    listener: TcpListener,
    max_clients: usize,
    active: Arc<AtomicUsize>,
}

impl RpcServer {
    /// Bind to `addr` (host:port). Port 0 picks an ephemeral port.
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Ipc(format!("Failed to bind {}: {}", addr, e)))?;
        Ok(Self {
            listener,
            max_clients: DEFAULT_MAX_CLIENTS,
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Set max clients
    pub fn with_max_clients(mut self, max: usize) -> Self {
        self.max_clients = max;
        self
    }

    /// Address the listener actually bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` resolves
    pub async fn run<H, S>(self, handler: Arc<H>, shutdown: S) -> Result<()>
    where
        H: RequestHandler + 'static,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            if self.active.load(Ordering::SeqCst) >= self.max_clients {
                                log::warn!("Rejecting connection from {}: at capacity ({})", peer, self.max_clients);
                                continue;
                            }
                            self.active.fetch_add(1, Ordering::SeqCst);

                            let handler = Arc::clone(&handler);
                            let active = Arc::clone(&self.active);
                            tokio::spawn(async move {
                                if let Err(e) = handle_client(stream, handler).await {
                                    log::debug!("Connection from {} ended with error: {}", peer, e);
                                }
                                active.fetch_sub(1, Ordering::SeqCst);
                            });
                        }
                        Err(e) => {
                            log::warn!("Accept error: {}", e);
                        }
                    }
                }
                _ = &mut shutdown => {
                    log::info!("RPC server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Handle a single client connection
async fn handle_client<H: RequestHandler + 'static>(stream: TcpStream, handler: Arc<H>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            break; // EOF - client disconnected
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<RpcRequest>(trimmed) {
            Ok(request) if request.method == methods::PING => {
                RpcResponse::success(request.id, serde_json::json!({"pong": true}))
            }
            Ok(request) => {
                let id = request.id;
                let ctx = RequestContext::new();
                let watch = ctx.clone();
                let handler = Arc::clone(&handler);
                let mut task = tokio::spawn(async move { handler.handle(request, ctx).await });

                tokio::select! {
                    joined = &mut task => joined.unwrap_or_else(|e| {
                        log::error!("Request handler for id {} failed: {}", id, e);
                        RpcResponse::error(id, RpcError::internal_error("request handler failed"))
                    }),
                    peeked = reader.fill_buf() => match peeked {
                        Ok(buf) if !buf.is_empty() => {
                            // Pipelined request; finish this one first
                            task.await.unwrap_or_else(|e| {
                                log::error!("Request handler for id {} failed: {}", id, e);
                                RpcResponse::error(id, RpcError::internal_error("request handler failed"))
                            })
                        }
                        _ => {
                            log::info!("Caller disconnected while request {} was in flight", id);
                            watch.cancel();
                            return Ok(());
                        }
                    }
                }
            }
            Err(e) => RpcResponse::error(0, RpcError::parse_error(format!("Parse error: {}", e))),
        };

        let response_json = serde_json::to_string(&response)?;
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::RpcClient;
    use std::time::Duration;

    struct EchoHandler;

    impl RequestHandler for EchoHandler {
        fn handle(
            &self,
            request: RpcRequest,
            _ctx: RequestContext,
        ) -> impl Future<Output = RpcResponse> + Send {
            async move { RpcResponse::success(request.id, request.params) }
        }
    }

    async fn spawn_echo() -> SocketAddr {
        let server = RpcServer::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run(Arc::new(EchoHandler), std::future::pending()));
        addr
    }

    #[test]
    fn test_request_context_cancel() {
        let ctx = RequestContext::new();
        let clone = ctx.clone();
        assert!(!ctx.is_cancelled());
        clone.cancel();
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = RpcServer::bind("127.0.0.1:0").await.unwrap().with_max_clients(2);
        assert_eq!(server.max_clients, 2);
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_invalid_address() {
        let result = RpcServer::bind("not-an-address").await;
        assert!(matches!(result, Err(GatewayError::Ipc(_))));
    }

    #[tokio::test]
    async fn test_echo_round_trip() {
        let addr = spawn_echo().await;
        let client = RpcClient::new(addr.to_string(), Duration::from_secs(2));

        let response = client.call("echo", serde_json::json!({"hello": "world"})).await.unwrap();
        assert_eq!(response.into_result().unwrap()["hello"], "world");
    }

    #[tokio::test]
    async fn test_builtin_ping() {
        let addr = spawn_echo().await;
        let client = RpcClient::new(addr.to_string(), Duration::from_secs(2));
        assert!(client.ping().await.unwrap());
    }

    #[tokio::test]
    async fn test_parse_error_response() {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

        let addr = spawn_echo().await;
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        writer.write_all(b"this is not json\n").await.unwrap();

        let mut line = String::new();
        BufReader::new(reader).read_line(&mut line).await.unwrap();
        let response: RpcResponse = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(response.error.unwrap().code, crate::ipc::ErrorCode::PARSE_ERROR);
    }
}
