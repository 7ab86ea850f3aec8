//! Provider request handler
//!
//! Serves a `ToolRegistry` over RPC:
//! - tools.list: `{provider, tools}`
//! - tools.invoke: `{name, arguments}` -> tool payload or a typed fault
//! - resources.read: `{uri}` -> resource content

use std::future::Future;
use std::sync::Arc;

use serde_json::{Map, Value, json};

use crate::ipc::{RequestContext, RequestHandler, RpcError, RpcRequest, RpcResponse, methods};

use super::registry::ToolRegistry;

pub struct ProviderHandler {
    registry: Arc<ToolRegistry>,
}

impl ProviderHandler {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}

impl RequestHandler for ProviderHandler {
    fn handle(&self, request: RpcRequest, _ctx: RequestContext) -> impl Future<Output = RpcResponse> + Send {
        let registry = Arc::clone(&self.registry);
        async move {
            match request.method.as_str() {
                methods::TOOLS_LIST => handle_list(request.id, &registry),
                methods::TOOLS_INVOKE => handle_invoke(request.id, request.params, registry).await,
                methods::RESOURCES_READ => handle_resource(request.id, &request.params, registry).await,
                other => RpcResponse::error(request.id, RpcError::method_not_found(other)),
            }
        }
    }
}

/// Handle tools.list
fn handle_list(id: u64, registry: &ToolRegistry) -> RpcResponse {
    RpcResponse::success(
        id,
        json!({
            "provider": registry.provider_id(),
            "tools": registry.descriptors(),
        }),
    )
}

/// Handle tools.invoke - runs the tool on the blocking pool
async fn handle_invoke(id: u64, params: Value, registry: Arc<ToolRegistry>) -> RpcResponse {
    let name = match params["name"].as_str() {
        Some(n) => n.to_string(),
        None => return RpcResponse::error(id, RpcError::invalid_params("Missing 'name' parameter")),
    };
    let arguments = match params.get("arguments") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => return RpcResponse::error(id, RpcError::invalid_params("'arguments' must be an object")),
    };

    let joined = tokio::task::spawn_blocking(move || registry.invoke(&name, &arguments)).await;
    match joined {
        Ok(Ok(payload)) => RpcResponse::success(id, payload),
        Ok(Err(fault)) => RpcResponse::error(id, fault.to_rpc_error()),
        Err(e) => {
            log::error!("Tool task panicked: {}", e);
            RpcResponse::error(id, RpcError::internal_error("tool execution panicked"))
        }
    }
}

/// Handle resources.read
async fn handle_resource(id: u64, params: &Value, registry: Arc<ToolRegistry>) -> RpcResponse {
    let uri = match params["uri"].as_str() {
        Some(u) => u.to_string(),
        None => return RpcResponse::error(id, RpcError::invalid_params("Missing 'uri' parameter")),
    };

    let joined = tokio::task::spawn_blocking(move || registry.read_resource(&uri)).await;
    match joined {
        Ok(Ok(content)) => RpcResponse::success(id, json!({ "contents": content })),
        Ok(Err(fault)) => RpcResponse::error(id, fault.to_rpc_error()),
        Err(e) => {
            log::error!("Resource task panicked: {}", e);
            RpcResponse::error(id, RpcError::internal_error("resource read panicked"))
        }
    }
}
