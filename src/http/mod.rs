//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware chain)
//!     → middleware/ (request id, recovery, cors, access log)
//!     → handlers.rs (health, stats, proxy dispatch, fallbacks)
//!     → Send to client
//! ```

pub mod context;
pub mod handlers;
pub mod middleware;
pub mod server;

pub use context::{Caller, RequestContext};
pub use middleware::X_REQUEST_ID;
pub use server::{build_router, AppState, HttpServer};
