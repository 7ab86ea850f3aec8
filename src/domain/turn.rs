//! Per-request conversation state

use std::fmt;

use serde::{Deserialize, Serialize};

use super::descriptor::ToolDescriptor;
use super::invocation::{ToolInvocationRequest, ToolInvocationResult};

/// What the model asked for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelOutput {
    FinalAnswer { text: String },
    ToolCall { request: ToolInvocationRequest },
}

impl ModelOutput {
    pub fn is_tool_call(&self) -> bool {
        matches!(self, ModelOutput::ToolCall { .. })
    }
}

/// Orchestration state machine stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStage {
    Start,
    CatalogRead,
    ModelQuery,
    ToolRequested,
    ToolDispatch,
    ResultReady,
    Rephrase,
    DirectRender,
    Done,
}

impl fmt::Display for TurnStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnStage::Start => "start",
            TurnStage::CatalogRead => "catalog_read",
            TurnStage::ModelQuery => "model_query",
            TurnStage::ToolRequested => "tool_requested",
            TurnStage::ToolDispatch => "tool_dispatch",
            TurnStage::ResultReady => "result_ready",
            TurnStage::Rephrase => "rephrase",
            TurnStage::DirectRender => "direct_render",
            TurnStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Where the final text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalTextSource {
    /// First model answer, no tool involved
    Model,
    /// Model phrased the tool result
    Rephrased,
    /// Deterministic rendering of the tool result
    DirectRender,
}

/// Everything that happened while answering one prompt. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user_text: String,
    pub catalog_used: Vec<ToolDescriptor>,
    pub model_output: ModelOutput,
    pub tool_result: Option<ToolInvocationResult>,
    pub final_text: Option<String>,
    pub final_source: Option<FinalTextSource>,
    pub stages: Vec<TurnStage>,
}

impl ConversationTurn {
    pub fn new(user_text: impl Into<String>, catalog_used: Vec<ToolDescriptor>, model_output: ModelOutput) -> Self {
        Self {
            user_text: user_text.into(),
            catalog_used,
            model_output,
            tool_result: None,
            final_text: None,
            final_source: None,
            stages: Vec::new(),
        }
    }

    /// The tool call the model asked for, if any
    pub fn tool_request(&self) -> Option<&ToolInvocationRequest> {
        match &self.model_output {
            ModelOutput::ToolCall { request } => Some(request),
            ModelOutput::FinalAnswer { .. } => None,
        }
    }

    pub fn finish(&mut self, text: String, source: FinalTextSource) {
        self.final_text = Some(text);
        self.final_source = Some(source);
    }
}
