//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → router.rs (route lookup)
//!     → matcher.rs (evaluate prefix conditions)
//!     → Return: service name or no match (404)
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → Sort by prefix length
//!     → Freeze as immutable ServiceRouter
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route
//! - First match wins (longest prefix first)

pub mod matcher;
pub mod router;

pub use matcher::{compile_pattern, Matcher};
pub use router::ServiceRouter;
