//! Model Layer - Ollama chat integration and tool-call parsing
//!
//! This module provides:
//! - Chat message types for the model endpoint
//! - ModelClient trait for API abstraction
//! - OllamaClient implementation
//! - ModelBridge: prompt building and response parsing

pub mod bridge;
pub mod client;
pub mod ollama;
pub mod types;

pub use bridge::{ModelBridge, parse_model_output};
pub use client::{MockModelClient, ModelClient};
pub use ollama::{OllamaClient, OllamaConfig};
pub use types::{ChatMessage, ChatRequest, Role};
