//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     broadcast → HTTP server stops accepting, drains for the grace period
//!               → hub closes every WebSocket connection
//!               → rate-limit sweeper exits
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config, logging, metrics, background tasks, then the listener
//! - Shutdown has timeout: forced exit after the grace period

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::{shutdown_on_signal, wait_for_signal};
