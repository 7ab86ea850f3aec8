//! Tool System - catalog merging, provider transport, and routing

mod catalog;
mod router;
mod transport;

pub use catalog::MergedCatalog;
pub use router::{DEFAULT_CALL_TIMEOUT, ToolRouter};
pub use transport::{MockTransport, ProviderTransport, RpcTransport, TransportError};
