//! Tool providers
//!
//! A provider is a small RPC server exposing a `ToolRegistry`. Two ship with
//! toolgate: date/time arithmetic and a SQLite database.

pub mod datetime;
pub mod handler;
pub mod registry;
pub mod sqlite;

pub use handler::ProviderHandler;
pub use registry::{ResourceReader, ToolFault, ToolHandler, ToolRegistry, str_arg, validate_arguments};
pub use sqlite::SqliteStore;
