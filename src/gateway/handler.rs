//! Gateway request handlers
//!
//! Handles the client-facing methods:
//! - gateway.ask: run one conversation turn
//! - catalog.status: per-provider catalog freshness and health

use std::future::Future;
use std::sync::Arc;

use serde_json::{Value, json};

use crate::domain::{FinalTextSource, ToolInvocationResult};
use crate::error::GatewayError;
use crate::ipc::{ErrorCode, RequestContext, RequestHandler, RpcError, RpcRequest, RpcResponse, methods};

use super::orchestrator::Orchestrator;

/// RPC handler served by the gateway process
pub struct GatewayHandler {
    orchestrator: Arc<Orchestrator>,
}

impl GatewayHandler {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

impl RequestHandler for GatewayHandler {
    fn handle(&self, request: RpcRequest, ctx: RequestContext) -> impl Future<Output = RpcResponse> + Send {
        let orchestrator = Arc::clone(&self.orchestrator);
        async move {
            match request.method.as_str() {
                methods::GATEWAY_ASK => handle_ask(request.id, &request.params, &orchestrator, &ctx).await,
                methods::CATALOG_STATUS => handle_catalog_status(request.id, &orchestrator).await,
                other => RpcResponse::error(request.id, RpcError::method_not_found(other)),
            }
        }
    }
}

/// Handle gateway.ask - answer one prompt
pub async fn handle_ask(id: u64, params: &Value, orchestrator: &Orchestrator, ctx: &RequestContext) -> RpcResponse {
    let prompt = match params["prompt"].as_str().map(str::trim) {
        Some(p) if !p.is_empty() => p,
        _ => return RpcResponse::error(id, RpcError::invalid_params("Missing 'prompt' parameter")),
    };

    log::info!("Received prompt: '{}'", truncate(prompt, 100));

    match orchestrator.handle_turn(prompt, ctx).await {
        Ok(turn) => {
            let tool = match (turn.tool_request(), turn.tool_result.as_ref()) {
                (Some(request), Some(tool_result)) => Some(tool_summary(&request.tool_name, tool_result)),
                _ => None,
            };
            let mut result = json!({
                "response": turn.final_text.unwrap_or_default(),
                "source": turn.final_source.unwrap_or(FinalTextSource::Model),
            });
            if let Some(tool) = tool {
                result["tool"] = tool;
            }
            RpcResponse::success(id, result)
        }
        Err(e) => {
            if matches!(e, GatewayError::Cancelled(_)) {
                log::info!("Turn {} cancelled: {}", id, e);
            } else {
                log::error!("Turn {} failed: {}", id, e);
            }
            RpcResponse::error(id, turn_error(&e))
        }
    }
}

/// Handle catalog.status - report what the cache currently holds
pub async fn handle_catalog_status(id: u64, orchestrator: &Orchestrator) -> RpcResponse {
    let cache = orchestrator.cache();
    let mut providers = Vec::new();
    for snapshot in cache.snapshot_all().await {
        let healthy = cache
            .endpoint(&snapshot.provider_id)
            .map(|e| e.is_healthy())
            .unwrap_or(false);
        providers.push(json!({
            "provider_id": snapshot.provider_id,
            "healthy": healthy,
            "tools": snapshot.tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            "fetched_at": snapshot.fetched_at,
            "fetch_error": snapshot.fetch_error,
        }));
    }
    RpcResponse::success(id, json!({ "providers": providers }))
}

fn tool_summary(tool_name: &str, result: &ToolInvocationResult) -> Value {
    match result {
        ToolInvocationResult::Success { .. } => json!({"name": tool_name, "status": "success"}),
        ToolInvocationResult::Failure(failure) => json!({
            "name": tool_name,
            "status": "failure",
            "kind": failure.kind,
            "message": failure.message,
            "detail": failure.provider_detail,
        }),
    }
}

/// Structured error for a failed turn: `data.kind` carries the taxonomy
fn turn_error(err: &GatewayError) -> RpcError {
    RpcError::with_data(ErrorCode::TURN_FAILED, err.to_string(), json!({ "kind": err.kind() }))
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
