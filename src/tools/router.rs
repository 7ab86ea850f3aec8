//! Tool routing and dispatch
//!
//! Resolves a requested tool name against the catalog snapshots, calls the one
//! owning provider with a bounded timeout and folds every outcome into a
//! `ToolInvocationResult`.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::CatalogSnapshot;
use crate::domain::{ProviderEndpoint, ToolFailure, ToolInvocationRequest, ToolInvocationResult};
use crate::error::ErrorKind;

use super::transport::{ProviderTransport, TransportError};

/// Default per-call timeout towards providers
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ToolRouter {
    transport: Arc<dyn ProviderTransport>,
    endpoints: Vec<Arc<ProviderEndpoint>>,
    call_timeout: Duration,
}

impl ToolRouter {
    pub fn new(transport: Arc<dyn ProviderTransport>, endpoints: Vec<Arc<ProviderEndpoint>>) -> Self {
        Self {
            transport,
            endpoints,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Set the per-call timeout
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Route one tool call. Never retries; never returns an error.
    pub async fn route(
        &self,
        request: &ToolInvocationRequest,
        catalog: &[Arc<CatalogSnapshot>],
    ) -> ToolInvocationResult {
        let owners: Vec<&str> = catalog
            .iter()
            .filter(|s| s.has_tool(&request.tool_name))
            .map(|s| s.provider_id.as_str())
            .collect();

        let provider_id = match owners.as_slice() {
            [] => {
                log::warn!("No provider offers tool '{}'", request.tool_name);
                return ToolInvocationResult::failure(
                    ErrorKind::UnknownTool,
                    format!("No provider offers a tool named '{}'", request.tool_name),
                );
            }
            [one] => *one,
            many => {
                log::error!("Tool '{}' is claimed by providers {:?}", request.tool_name, many);
                return ToolInvocationResult::failure(
                    ErrorKind::AmbiguousTool,
                    format!(
                        "Tool '{}' is offered by more than one provider: {}",
                        request.tool_name,
                        many.join(", ")
                    ),
                );
            }
        };

        let Some(endpoint) = self.endpoints.iter().find(|e| e.provider_id == provider_id) else {
            return ToolInvocationResult::failure(
                ErrorKind::ConfigurationError,
                format!("Provider '{}' has no configured endpoint", provider_id),
            );
        };

        log::debug!("Dispatching '{}' to provider '{}'", request.tool_name, provider_id);
        let outcome = tokio::time::timeout(
            self.call_timeout,
            self.transport.invoke(endpoint, &request.tool_name, &request.arguments),
        )
        .await;

        match outcome {
            Ok(Ok(payload)) => {
                endpoint.observe(true);
                ToolInvocationResult::success(payload)
            }
            Ok(Err(TransportError::Fault { code, message, detail })) => {
                endpoint.observe(true);
                log::warn!(
                    "Provider '{}' failed tool '{}' ({}): {}",
                    provider_id,
                    request.tool_name,
                    code,
                    message
                );
                let detail = detail
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| message.clone());
                ToolInvocationResult::Failure(
                    ToolFailure::new(
                        ErrorKind::ProviderError,
                        format!("Tool '{}' failed: {}", request.tool_name, message),
                    )
                    .with_detail(detail),
                )
            }
            Ok(Err(TransportError::Unavailable(reason))) => {
                endpoint.observe(false);
                ToolInvocationResult::Failure(
                    ToolFailure::new(
                        ErrorKind::ProviderUnavailable,
                        format!("Provider '{}' is unavailable", provider_id),
                    )
                    .with_detail(reason),
                )
            }
            Err(_) => {
                endpoint.observe(false);
                ToolInvocationResult::Failure(ToolFailure::new(
                    ErrorKind::ProviderUnavailable,
                    format!(
                        "Provider '{}' did not answer within {}ms",
                        provider_id,
                        self.call_timeout.as_millis()
                    ),
                ))
            }
        }
    }
}
