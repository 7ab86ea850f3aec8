//! Model bridge - turns a prompt plus catalog into a `ModelOutput`
//!
//! The model may ask for a tool in two ways:
//! - native function calling (`message.tool_calls`), arguments as an object or a JSON string
//! - a JSON directive as the whole message content: `{"tool": "<name>", "arguments": {...}}`,
//!   optionally wrapped in a ``` fence
//!
//! Anything else with non-empty content is a final answer.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::domain::{ConversationTurn, ModelOutput, ToolDescriptor, ToolInvocationRequest, ToolInvocationResult};
use crate::error::{GatewayError, Result};

use super::client::ModelClient;
use super::types::{ChatMessage, ChatRequest};

const REPHRASE_PROMPT: &str = "You called a tool to help answer the user's question. \
Using the tool result that follows, answer the question directly and concisely in plain text. \
If the tool reported an error, explain briefly what went wrong.";

pub struct ModelBridge {
    client: Arc<dyn ModelClient>,
}

impl ModelBridge {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self { client }
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    /// Ask the model about `user_text` with `tools` on offer
    pub async fn converse(&self, user_text: &str, tools: &[ToolDescriptor]) -> Result<ModelOutput> {
        let mut messages = Vec::with_capacity(2);
        if !tools.is_empty() {
            messages.push(ChatMessage::system(system_prompt(tools)));
        }
        messages.push(ChatMessage::user(user_text));

        let request = ChatRequest::new(messages).with_tools(tools.iter().map(|t| t.to_model_tool()).collect());
        let body = self.client.chat(&request).await?;
        let output = parse_model_output(&body)?;

        match &output {
            ModelOutput::ToolCall { request } => log::info!("Model requested tool '{}'", request.tool_name),
            ModelOutput::FinalAnswer { .. } => log::debug!("Model answered directly"),
        }
        Ok(output)
    }

    /// Second call, without tools, asking the model to phrase the tool result
    pub async fn rephrase(&self, turn: &ConversationTurn, result: &ToolInvocationResult) -> Result<String> {
        let request = turn.tool_request().ok_or_else(|| {
            GatewayError::ModelResponseInvalid("rephrase requested for a turn without a tool call".to_string())
        })?;

        let messages = vec![
            ChatMessage::system(REPHRASE_PROMPT),
            ChatMessage::user(turn.user_text.clone()),
            ChatMessage::assistant_tool_call(request),
            ChatMessage::tool(tool_result_content(result)),
        ];

        let body = self.client.chat(&ChatRequest::new(messages)).await?;
        match parse_model_output(&body)? {
            ModelOutput::FinalAnswer { text } => Ok(text),
            ModelOutput::ToolCall { request } => Err(GatewayError::ModelResponseInvalid(format!(
                "model asked for tool '{}' while phrasing a result",
                request.tool_name
            ))),
        }
    }
}

/// Instructions for models without native function calling
fn system_prompt(tools: &[ToolDescriptor]) -> String {
    let mut prompt = String::from(
        "You are an assistant with access to the tools listed below.\n\
         To use a tool, reply with ONLY a JSON object of the form \
         {\"tool\": \"<tool name>\", \"arguments\": {<argument name>: <value>}}.\n\
         If no tool is needed, answer in plain text.\n\nTools:\n",
    );
    for tool in tools {
        prompt.push_str(&format!("- {}: {}\n", tool.name, tool.description));
        for param in &tool.parameters {
            let required = if param.required { "required" } else { "optional" };
            prompt.push_str(&format!(
                "    {} ({}, {}): {}",
                param.name,
                param.param_type.schema_name(),
                required,
                param.description
            ));
            if !param.allowed.is_empty() {
                prompt.push_str(&format!(" [one of: {}]", param.allowed.join(", ")));
            }
            prompt.push('\n');
        }
    }
    prompt
}

/// Tool output as the model sees it
fn tool_result_content(result: &ToolInvocationResult) -> String {
    match result {
        ToolInvocationResult::Success { payload } => match payload {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
        ToolInvocationResult::Failure(failure) => serde_json::json!({
            "error": {
                "kind": failure.kind,
                "message": failure.message,
            }
        })
        .to_string(),
    }
}

/// Parse a raw chat response body.
///
/// Accepts Ollama's `{"message": ...}` and the OpenAI-style
/// `{"choices": [{"message": ...}]}` envelopes; unknown fields are ignored.
pub fn parse_model_output(body: &Value) -> Result<ModelOutput> {
    let message = body
        .get("message")
        .or_else(|| body.pointer("/choices/0/message"))
        .filter(|m| m.is_object())
        .ok_or_else(|| GatewayError::ModelResponseInvalid("response has no message".to_string()))?;

    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array).filter(|c| !c.is_empty()) {
        if calls.len() > 1 {
            log::warn!("Model requested {} tool calls; only the first is used", calls.len());
        }
        let request = parse_native_call(&calls[0])?;
        return Ok(ModelOutput::ToolCall { request });
    }

    let content = message.get("content").and_then(Value::as_str).unwrap_or("").trim();
    if content.is_empty() {
        return Err(GatewayError::ModelResponseInvalid(
            "message has neither content nor tool calls".to_string(),
        ));
    }

    if let Some(request) = parse_directive(content)? {
        return Ok(ModelOutput::ToolCall { request });
    }

    Ok(ModelOutput::FinalAnswer {
        text: content.to_string(),
    })
}

fn parse_native_call(call: &Value) -> Result<ToolInvocationRequest> {
    let function = call.get("function").unwrap_or(call);
    let name = function
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| GatewayError::ModelResponseInvalid("tool call has no function name".to_string()))?;

    let arguments = match function.get("arguments") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(Value::String(raw)) if raw.trim().is_empty() => Map::new(),
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(arguments_not_object(name)),
            Err(e) => {
                return Err(GatewayError::ModelResponseInvalid(format!(
                    "arguments for tool '{}' are not valid JSON: {}",
                    name, e
                )));
            }
        },
        Some(_) => return Err(arguments_not_object(name)),
    };

    Ok(ToolInvocationRequest::new(name, arguments))
}

/// Recognise a JSON tool directive in message content.
///
/// `Ok(None)` means the content is an ordinary answer.
fn parse_directive(content: &str) -> Result<Option<ToolInvocationRequest>> {
    let candidate = strip_fence(content);
    if !candidate.starts_with('{') {
        return Ok(None);
    }
    let Ok(Value::Object(object)) = serde_json::from_str::<Value>(candidate) else {
        return Ok(None);
    };

    // {"tool": ...} is the documented form; {"name": ..., "arguments": ...} is what llama3 tends to emit
    let name = match (object.get("tool"), object.get("name"), object.get("arguments")) {
        (Some(tool), _, _) => tool.as_str(),
        (None, Some(name), Some(_)) => name.as_str(),
        _ => return Ok(None),
    };
    let name = name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| GatewayError::ModelResponseInvalid("tool directive has no tool name".to_string()))?;

    let arguments = match object.get("arguments") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => return Err(arguments_not_object(name)),
    };

    Ok(Some(ToolInvocationRequest::new(name, arguments)))
}

fn strip_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop an info string such as `json`
    let inner = match inner.find('\n') {
        Some(newline) if !inner[..newline].trim_start().starts_with('{') => &inner[newline + 1..],
        _ => inner,
    };
    inner.trim()
}

fn arguments_not_object(name: &str) -> GatewayError {
    GatewayError::ModelResponseInvalid(format!("arguments for tool '{}' must be a JSON object", name))
}
