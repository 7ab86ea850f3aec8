//! Domain types for toolgate
//!
//! - ToolDescriptor / ParamSpec: what a provider says about one of its tools
//! - ProviderEndpoint: where a provider lives and whether it answered last time
//! - ToolInvocationRequest / ToolInvocationResult: one routed tool call
//! - ConversationTurn: everything that happened while answering one prompt

pub mod descriptor;
pub mod invocation;
pub mod turn;

pub use descriptor::{ParamSpec, ParamType, ProviderEndpoint, ToolDescriptor};
pub use invocation::{ToolFailure, ToolInvocationRequest, ToolInvocationResult};
pub use turn::{ConversationTurn, FinalTextSource, ModelOutput, TurnStage};
