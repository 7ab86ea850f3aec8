//! Chat message types for the model endpoint
//!
//! Shapes follow Ollama's `/api/chat` request body.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::domain::ToolInvocationRequest;

/// Role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<Value>,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Tool output fed back to the model
    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }

    /// Assistant message that records a tool call it made
    pub fn assistant_tool_call(request: &ToolInvocationRequest) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            tool_calls: vec![json!({
                "function": {
                    "name": request.tool_name,
                    "arguments": request.arguments,
                }
            })],
        }
    }
}

/// One chat call: messages plus the function-calling tool list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// Entries in `{"type": "function", "function": {...}}` form
    pub tools: Vec<Value>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<Value>) -> Self {
        self.tools = tools;
        self
    }

    /// Request body for `POST /api/chat`
    pub fn to_ollama_body(&self, model: &str) -> Value {
        let mut body = json!({
            "model": model,
            "messages": self.messages,
            "stream": false,
        });
        if !self.tools.is_empty() {
            body["tools"] = json!(self.tools);
        }
        body
    }
}
