//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → client_ip.rs (resolve caller IP from forwarding headers)
//!     → rate_limit.rs (global, then per-user or per-IP buckets)
//!     → headers.rs (strip hop-by-hop, add X-Forwarded-For, hardening headers)
//!     → Pass to auth and routing
//! ```
//!
//! # Design Decisions
//! - Admission control rejects immediately; callers never wait for tokens
//! - No trust in client input: identity headers are rebuilt by the gateway

pub mod client_ip;
pub mod headers;
pub mod rate_limit;

pub use client_ip::resolve_client_ip;
pub use rate_limit::{rate_limit_middleware, RateLimitState, RateLimiter, RateLimiterStats};
