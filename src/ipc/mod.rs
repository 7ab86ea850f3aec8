//! RPC transport: newline-delimited JSON request/response over TCP.
//!
//! Providers serve `tools.list` / `tools.invoke`; the gateway serves
//! `gateway.ask` / `catalog.status`; the CLI client talks to the gateway.

pub mod client;
pub mod messages;
pub mod server;

pub use client::RpcClient;
pub use messages::{ErrorCode, RpcError, RpcRequest, RpcResponse, methods};
pub use server::{RequestContext, RequestHandler, RpcServer};
