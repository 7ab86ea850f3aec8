//! Gateway - the client-facing process
//!
//! Ties the definition cache, model bridge and tool router together behind
//! the `gateway.ask` RPC.

pub mod handler;
pub mod orchestrator;
pub mod render;

pub use handler::GatewayHandler;
pub use orchestrator::Orchestrator;
pub use render::render_result;
