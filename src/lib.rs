//! API gateway library.
//!
//! The front door of the news platform: every HTTP request and WebSocket
//! connection passes through here before reaching a backend service.
//!
//! ```text
//! request → request_id → recovery → security headers → cors → access log
//!         → rate limit → [auth] → router → proxy engine → backend
//!                                        ↘ upgrade → websocket hub
//! ```

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod models;
pub mod routing;

// Traffic handling
pub mod auth;
pub mod health;
pub mod proxy;
pub mod websocket;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use http::{AppState, HttpServer};
pub use lifecycle::Shutdown;
