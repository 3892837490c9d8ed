//! Reverse proxy subsystem.
//!
//! # Data Flow
//! ```text
//! Request (after middleware):
//!     → engine.rs::route (longest prefix → Backend)
//!     → engine.rs::forward (rewrite headers, per-service deadline)
//!     → backend response streamed back, or 503 / 504 / 502
//! ```
//!
//! # Design Decisions
//! - Backends are immutable after startup
//! - Connection failures on idempotent requests are retried with backoff

pub mod backend;
pub mod engine;

pub use backend::Backend;
pub use engine::{classify, FailureKind, HttpClient, ProxyEngine, ProxyStats};
