//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → per-service deadline (enforced by the proxy engine)
//!     → On connection failure: retries.rs (check if retryable, retry with backoff)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Retries only for idempotent requests (GET, HEAD, etc.)

pub mod retries;

pub use retries::{is_retryable_method, RetryPolicy};
