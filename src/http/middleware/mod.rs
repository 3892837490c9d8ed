//! Request interceptors.
//!
//! # Data Flow
//! ```text
//! request_id → recovery → security headers → cors → access_log
//!     → rate limit (security::rate_limit) → auth (protected routes only)
//! ```
//!
//! Security headers are plain `SetResponseHeaderLayer`s added by the server.

pub mod access_log;
pub mod cors;
pub mod recovery;
pub mod request_id;

pub use access_log::access_log_middleware;
pub use cors::cors_middleware;
pub use recovery::recovery_middleware;
pub use request_id::{request_id_middleware, X_REQUEST_ID};
