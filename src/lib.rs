//! toolgate - a tool-augmented conversational gateway
//!
//! A gateway process keeps a cached catalog of the tools offered by a set of
//! provider servers, asks a local model whether a user request needs a tool,
//! routes the call to the one provider offering it and turns the result back
//! into a natural-language answer.

pub mod cache;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod ipc;
pub mod llm;
pub mod providers;
pub mod tools;

pub use error::{ErrorKind, GatewayError, Result};
