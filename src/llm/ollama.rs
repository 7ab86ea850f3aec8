//! Ollama API client implementation
//!
//! This module implements the ModelClient trait for Ollama's `/api/chat`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::error::{GatewayError, Result};
use crate::llm::client::ModelClient;
use crate::llm::types::ChatRequest;

/// Default Ollama base URL
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Default model to use
pub const DEFAULT_MODEL: &str = "llama3";

/// Configuration for the Ollama client
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Ollama API client
pub struct OllamaClient {
    client: Client,
    config: OllamaConfig,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::ModelUnavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ModelClient for OllamaClient {
    async fn chat(&self, request: &ChatRequest) -> Result<Value> {
        let body = request.to_ollama_body(&self.config.model);
        log::debug!("Sending chat request to {} ({} messages)", self.chat_url(), request.messages.len());

        let response = self
            .client
            .post(self.chat_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                GatewayError::ModelUnavailable(format!(
                    "Could not reach model endpoint at {}: {}",
                    self.config.base_url, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GatewayError::ModelUnavailable(format!(
                "Model endpoint returned {}: {}",
                status, error_body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| GatewayError::ModelResponseInvalid(format!("Response body is not JSON: {}", e)))
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

impl std::fmt::Debug for OllamaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaClient")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ChatMessage;

    #[test]
    fn test_config_default() {
        let config = OllamaConfig::default();
        assert_eq!(config.base_url, "http://localhost:11434");
        assert_eq!(config.model, "llama3");
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_chat_url_trims_slash() {
        let client = OllamaClient::new(OllamaConfig {
            base_url: "http://ollama:11434/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.chat_url(), "http://ollama:11434/api/chat");
        assert_eq!(client.model(), "llama3");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_model_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = OllamaClient::new(OllamaConfig {
            base_url: format!("http://{}", addr),
            timeout: Duration::from_secs(2),
            ..Default::default()
        })
        .unwrap();

        let err = client
            .chat(&ChatRequest::new(vec![ChatMessage::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ModelUnavailable(_)));
    }
}
