//! WebSocket subsystem.
//!
//! # Data Flow
//! ```text
//! GET /ws (upgrade):
//!     → session.rs (identify caller, admission 503/429, upgrade)
//!     → hub.rs register (caps re-checked inside the loop)
//!     → read pump  ──► hub dispatch (message.rs rules)
//!     → write pump ◄── bounded outbound queue (connection.rs)
//! ```
//!
//! # Design Decisions
//! - The hub loop is the only writer of registry.rs
//! - No delivery guarantees; a slow consumer is disconnected, never waited on

pub mod connection;
pub mod hub;
pub mod message;
pub mod registry;
pub mod session;

pub use connection::{ConnectionId, ConnectionState};
pub use hub::{Hub, HubHandle, HubStats, Inbound};
pub use message::WsMessage;
pub use session::ws_handler;
