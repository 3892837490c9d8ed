//! Health reporting subsystem.
//!
//! # Data Flow
//! ```text
//! GET /health:
//!     → proxy engine fans out probe.rs::probe_backend to every backend
//!     → probe.rs::aggregate folds results into GatewayHealth
//!     → 200 if every service is healthy, 503 otherwise
//! ```
//!
//! # Design Decisions
//! - Probes run concurrently, each bounded by min(service timeout, check cap)
//! - The report is computed on demand; there is no background checker

pub mod probe;

pub use probe::{aggregate, probe_backend, GatewayHealth, ServiceHealth};
