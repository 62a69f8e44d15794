//! Network module.
//!
//! Contains the Gateway (WebSocket listener), the endpoint path grammar,
//! and the per-connection Session handler.

mod endpoint;
mod gateway;
mod session;

pub use endpoint::Endpoint;
pub use gateway::Gateway;
pub use session::Session;
