//! Orchestration loop - one prompt in, one answer out
//!
//! `Start -> CatalogRead -> ModelQuery -> Done` for a direct answer, or
//! `... -> ToolRequested -> ToolDispatch -> ResultReady -> Rephrase|DirectRender -> Done`
//! when the model asks for a tool.

use std::sync::Arc;

use crate::cache::DefinitionCache;
use crate::domain::{ConversationTurn, FinalTextSource, ModelOutput, TurnStage};
use crate::error::{GatewayError, Result};
use crate::ipc::RequestContext;
use crate::llm::ModelBridge;
use crate::tools::{MergedCatalog, ToolRouter};

use super::render::render_result;

pub struct Orchestrator {
    cache: Arc<DefinitionCache>,
    router: ToolRouter,
    bridge: ModelBridge,
    rephrase: bool,
}

impl Orchestrator {
    pub fn new(cache: Arc<DefinitionCache>, router: ToolRouter, bridge: ModelBridge) -> Self {
        Self {
            cache,
            router,
            bridge,
            rephrase: true,
        }
    }

    /// Enable or disable the second model call that phrases tool results
    pub fn with_rephrase(mut self, enabled: bool) -> Self {
        self.rephrase = enabled;
        self
    }

    pub fn cache(&self) -> &Arc<DefinitionCache> {
        &self.cache
    }

    /// Run one turn to completion
    pub async fn handle_turn(&self, user_text: &str, ctx: &RequestContext) -> Result<ConversationTurn> {
        let mut stages = vec![TurnStage::Start];

        stages.push(TurnStage::CatalogRead);
        let snapshots = self.cache.snapshot_all().await;
        let catalog = MergedCatalog::merge(&snapshots).inspect_err(|e| {
            log::error!("Refusing turn, tool catalog is inconsistent: {}", e);
        })?;
        log::debug!("Turn sees {} tools from {} providers", catalog.len(), snapshots.len());

        if ctx.is_cancelled() {
            return Err(GatewayError::Cancelled("caller disconnected before the model was queried".to_string()));
        }

        stages.push(TurnStage::ModelQuery);
        let output = self.bridge.converse(user_text, catalog.descriptors()).await?;
        let mut turn = ConversationTurn::new(user_text, catalog.into_descriptors(), output);

        if let ModelOutput::FinalAnswer { text } = &turn.model_output {
            let text = text.clone();
            turn.finish(text, FinalTextSource::Model);
            stages.push(TurnStage::Done);
            turn.stages = stages;
            return Ok(turn);
        }

        stages.push(TurnStage::ToolRequested);
        let Some(request) = turn.tool_request().cloned() else {
            return Err(GatewayError::ModelResponseInvalid("tool call without a request".to_string()));
        };

        if ctx.is_cancelled() {
            log::info!("Abandoning turn before dispatching '{}': caller disconnected", request.tool_name);
            return Err(GatewayError::Cancelled(format!(
                "caller disconnected before '{}' was dispatched",
                request.tool_name
            )));
        }

        stages.push(TurnStage::ToolDispatch);
        let result = self.router.route(&request, &snapshots).await;
        stages.push(TurnStage::ResultReady);

        let rephrased = if self.rephrase {
            stages.push(TurnStage::Rephrase);
            match self.bridge.rephrase(&turn, &result).await {
                Ok(text) => Some(text),
                Err(e) => {
                    log::warn!("Rephrase failed, rendering the tool result directly: {}", e);
                    None
                }
            }
        } else {
            None
        };

        match rephrased {
            Some(text) => turn.finish(text, FinalTextSource::Rephrased),
            None => {
                stages.push(TurnStage::DirectRender);
                turn.finish(render_result(&request.tool_name, &result), FinalTextSource::DirectRender);
            }
        }

        turn.tool_result = Some(result);
        stages.push(TurnStage::Done);
        turn.stages = stages;
        Ok(turn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ProviderEndpoint, ToolDescriptor};
    use crate::error::ErrorKind;
    use crate::llm::MockModelClient;
    use crate::tools::{MockTransport, TransportError};
    use serde_json::{Value, json};

    fn tool_call(name: &str, arguments: Value) -> Value {
        json!({"message": {"role": "assistant", "content": "", "tool_calls": [
            {"function": {"name": name, "arguments": arguments}}
        ]}})
    }

    fn answer(text: &str) -> Value {
        json!({"message": {"role": "assistant", "content": text}})
    }

    async fn orchestrator(
        transport: MockTransport,
        model: MockModelClient,
    ) -> (Orchestrator, Arc<MockTransport>, Arc<MockModelClient>) {
        let transport = Arc::new(transport);
        let model = Arc::new(model);
        let endpoints: Vec<_> = ["datetime", "sqlite"]
            .iter()
            .map(|id| Arc::new(ProviderEndpoint::new(*id, "127.0.0.1:1")))
            .collect();

        let cache = Arc::new(DefinitionCache::new(endpoints.clone(), transport.clone()));
        cache.refresh_all().await;
        let router = ToolRouter::new(transport.clone(), endpoints);
        let orchestrator = Orchestrator::new(cache, router, ModelBridge::new(model.clone()));
        (orchestrator, transport, model)
    }

    fn catalogs() -> MockTransport {
        MockTransport::new()
            .with_catalog("datetime", vec![ToolDescriptor::new("calculate_date_difference", "")])
            .with_catalog("sqlite", vec![ToolDescriptor::new("read_query", "")])
    }

    #[tokio::test]
    async fn test_final_answer_never_touches_providers() {
        let model = MockModelClient::new().with_response(answer("Hello!"));
        let (orch, transport, _) = orchestrator(catalogs(), model).await;

        let turn = orch.handle_turn("hi", &RequestContext::new()).await.unwrap();
        assert_eq!(turn.final_text.as_deref(), Some("Hello!"));
        assert_eq!(turn.final_source, Some(FinalTextSource::Model));
        assert_eq!(turn.catalog_used.len(), 2);
        assert_eq!(
            turn.stages,
            vec![TurnStage::Start, TurnStage::CatalogRead, TurnStage::ModelQuery, TurnStage::Done]
        );
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_tool_turn_rephrased() {
        let transport = catalogs().with_reply("datetime", "calculate_date_difference", Ok(json!(264)));
        let model = MockModelClient::new()
            .with_response(tool_call(
                "calculate_date_difference",
                json!({"start_date": "2025-04-05", "end_date": "2025-12-25", "unit": "days"}),
            ))
            .with_response(answer("There are 264 days until Christmas."));
        let (orch, transport, _) = orchestrator(transport, model).await;

        let turn = orch.handle_turn("How many days until Christmas?", &RequestContext::new()).await.unwrap();
        assert_eq!(turn.final_text.as_deref(), Some("There are 264 days until Christmas."));
        assert_eq!(turn.final_source, Some(FinalTextSource::Rephrased));
        assert_eq!(turn.tool_result.as_ref().unwrap().payload(), Some(&json!(264)));
        assert_eq!(transport.calls().len(), 1);
        assert!(turn.stages.contains(&TurnStage::Rephrase));
        assert!(!turn.stages.contains(&TurnStage::DirectRender));
    }

    #[tokio::test]
    async fn test_failed_rephrase_falls_back_to_direct_render() {
        let transport = catalogs().with_reply("sqlite", "read_query", Ok(json!([{"count": 3}])));
        let model = MockModelClient::new()
            .with_response(tool_call("read_query", json!({"query": "SELECT COUNT(*) AS count FROM users"})))
            .with_error(GatewayError::ModelUnavailable("refused".into()));
        let (orch, _, _) = orchestrator(transport, model).await;

        let turn = orch.handle_turn("How many users?", &RequestContext::new()).await.unwrap();
        let text = turn.final_text.unwrap();
        assert!(!text.is_empty());
        assert!(text.contains("count: 3"));
        assert_eq!(turn.final_source, Some(FinalTextSource::DirectRender));
        assert!(turn.stages.ends_with(&[TurnStage::Rephrase, TurnStage::DirectRender, TurnStage::Done]));
    }

    #[tokio::test]
    async fn test_rephrase_disabled_renders_directly() {
        let transport = catalogs().with_reply("datetime", "calculate_date_difference", Ok(json!(264)));
        let model = MockModelClient::new().with_response(tool_call("calculate_date_difference", json!({})));
        let (orch, _, model) = orchestrator(transport, model).await;
        let orch = orch.with_rephrase(false);

        let turn = orch.handle_turn("days?", &RequestContext::new()).await.unwrap();
        assert_eq!(turn.final_text.as_deref(), Some("Result of 'calculate_date_difference': 264"));
        assert_eq!(model.requests().len(), 1);
        assert!(!turn.stages.contains(&TurnStage::Rephrase));
    }

    #[tokio::test]
    async fn test_provider_down_yields_unavailable_result() {
        // sqlite is in the catalog but has no scripted reply, so dispatch fails to connect
        let model = MockModelClient::new()
            .with_response(tool_call("read_query", json!({"query": "SELECT 1"})))
            .with_response(answer("The database is unavailable right now."));
        let (orch, _, _) = orchestrator(catalogs(), model).await;

        let turn = orch.handle_turn("query", &RequestContext::new()).await.unwrap();
        assert_eq!(turn.tool_result.unwrap().kind(), Some(ErrorKind::ProviderUnavailable));
        assert_eq!(turn.final_text.as_deref(), Some("The database is unavailable right now."));
    }

    #[tokio::test]
    async fn test_stale_catalog_still_routes_and_reports_unavailable() {
        let model = MockModelClient::new()
            .with_response(tool_call("read_query", json!({"query": "SELECT COUNT(*) FROM orders;"})));
        let (orch, transport, _) = orchestrator(catalogs(), model).await;
        let orch = orch.with_rephrase(false);

        // sqlite answered at startup, then goes away before the next refresh
        transport.set_catalog("sqlite", Err(TransportError::Unavailable("connection refused".into())));
        orch.cache().refresh_all().await;
        let stale = orch.cache().get("sqlite").await.unwrap();
        assert!(stale.has_tool("read_query"));
        assert!(stale.fetched_at.is_some());
        assert_eq!(stale.fetch_error.as_deref(), Some("connection refused"));

        let turn = orch.handle_turn("how many orders?", &RequestContext::new()).await.unwrap();
        assert_eq!(transport.calls(), vec![("sqlite".to_string(), "read_query".to_string())]);
        assert_eq!(turn.tool_result.as_ref().unwrap().kind(), Some(ErrorKind::ProviderUnavailable));
        assert_eq!(turn.final_source, Some(FinalTextSource::DirectRender));
        assert!(!turn.final_text.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_tool_from_model() {
        let model = MockModelClient::new().with_response(tool_call("frobnicate", json!({})));
        let (orch, transport, _) = orchestrator(catalogs(), model).await;
        let orch = orch.with_rephrase(false);

        let turn = orch.handle_turn("frob", &RequestContext::new()).await.unwrap();
        assert_eq!(turn.tool_result.unwrap().kind(), Some(ErrorKind::UnknownTool));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_collision_fails_turn_with_configuration_error() {
        let transport = MockTransport::new()
            .with_catalog("datetime", vec![ToolDescriptor::new("read_query", "")])
            .with_catalog("sqlite", vec![ToolDescriptor::new("read_query", "")]);
        let (orch, _, model) = orchestrator(transport, MockModelClient::new()).await;

        let err = orch.handle_turn("query", &RequestContext::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationError);
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn test_model_errors_abort_turn() {
        let model = MockModelClient::new().with_response(json!({"unexpected": true}));
        let (orch, _, _) = orchestrator(catalogs(), model).await;

        let err = orch.handle_turn("hi", &RequestContext::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelResponseInvalid);
    }

    #[tokio::test]
    async fn test_cancelled_caller_skips_dispatch() {
        let transport = catalogs().with_reply("sqlite", "read_query", Ok(json!([])));
        let model = MockModelClient::new().with_response(tool_call("read_query", json!({"query": "SELECT 1"})));
        let (orch, transport, model) = orchestrator(transport, model).await;

        let ctx = RequestContext::new();
        ctx.cancel();
        let err = orch.handle_turn("query", &ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(transport.calls().is_empty());
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn test_empty_catalog_still_answers() {
        let model = MockModelClient::new().with_response(answer("ok"));
        let (orch, _, model) = orchestrator(MockTransport::new(), model).await;
        let turn = orch.handle_turn("hi", &RequestContext::new()).await.unwrap();
        assert_eq!(turn.final_text.as_deref(), Some("ok"));
        assert!(model.requests()[0].tools.is_empty());
    }
}
