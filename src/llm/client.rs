//! Model client trait and a scripted double

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{GatewayError, Result};

use super::types::ChatRequest;

/// Stateless chat client - each call is independent
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send one chat request and return the raw response body
    async fn chat(&self, request: &ChatRequest) -> Result<Value>;

    /// Model name used for requests
    fn model(&self) -> &str;
}

/// Mock client that replays queued responses and records requests
#[derive(Debug, Default)]
pub struct MockModelClient {
    responses: Mutex<VecDeque<Result<Value>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockModelClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw response body
    pub fn with_response(self, body: Value) -> Self {
        self.push(Ok(body));
        self
    }

    /// Queue an error
    pub fn with_error(self, error: GatewayError) -> Self {
        self.push(Err(error));
        self
    }

    pub fn push(&self, response: Result<Value>) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(response);
        }
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn chat(&self, request: &ChatRequest) -> Result<Value> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        self.responses
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_else(|| Err(GatewayError::ModelUnavailable("no mock response queued".to_string())))
    }

    fn model(&self) -> &str {
        "mock"
    }
}
