//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Root configuration for the API gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener and process-level settings.
    pub server: ServerConfig,

    /// Backend services reachable through the proxy.
    pub services: Vec<ServiceConfig>,

    /// Ordered path prefix rules mapping requests to services.
    pub routes: Vec<RouteConfig>,

    /// JWT authentication.
    pub auth: AuthConfig,

    /// Hierarchical rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Cross-origin resource sharing.
    pub cors: CorsConfig,

    /// WebSocket hub.
    pub websocket: WebSocketConfig,

    /// Logging and access log settings.
    pub logging: LoggingConfig,

    /// Aggregate health endpoint.
    pub health: HealthConfig,

    /// Upstream forwarding behaviour.
    pub proxy: ProxySettings,

    /// Metrics exposition.
    pub observability: ObservabilityConfig,
}

impl GatewayConfig {
    /// Look up a backend service by its logical name.
    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.name == name)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Time in-flight requests get to finish after a shutdown signal.
    pub shutdown_grace_secs: u64,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            shutdown_grace_secs: 30,
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

impl ServerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// A backend service the gateway forwards to.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Logical service name used by routes, logs and response headers.
    pub name: String,

    /// Base URL (e.g., "http://news-management:8081").
    pub url: String,

    /// Path probed by the health endpoint.
    #[serde(default = "default_health_endpoint")]
    pub health_endpoint: String,

    /// Per-call deadline in milliseconds.
    #[serde(default = "default_service_timeout_ms")]
    pub timeout_ms: u64,

    /// Extra attempts for idempotent requests whose connection failed.
    #[serde(default)]
    pub retry_attempts: u32,
}

fn default_health_endpoint() -> String {
    "/health".to_string()
}

fn default_service_timeout_ms() -> u64 {
    30_000
}

impl ServiceConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            health_endpoint: default_health_endpoint(),
            timeout_ms: default_service_timeout_ms(),
            retry_attempts: 0,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Route configuration mapping a path prefix to a backend service.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RouteConfig {
    /// Path prefix to match.
    pub path_prefix: String,

    /// Service name to forward to.
    pub service: String,
}

impl RouteConfig {
    pub fn new(path_prefix: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            path_prefix: path_prefix.into(),
            service: service.into(),
        }
    }
}

/// The platform's route table, used when no routes are configured.
pub fn default_routes() -> Vec<RouteConfig> {
    vec![
        RouteConfig::new("/api/news/parse", "news-parsing"),
        RouteConfig::new("/api/parsing", "news-parsing"),
        RouteConfig::new("/api/news", "news-management"),
        RouteConfig::new("/api/categories", "news-management"),
        RouteConfig::new("/api/countries", "news-management"),
        RouteConfig::new("/api/pulses", "pulse"),
        RouteConfig::new("/api/feeds", "pulse"),
    ]
}

/// JWT authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Enforce bearer tokens on protected routes.
    pub enabled: bool,

    /// HMAC signing secret.
    pub jwt_secret: String,

    /// Access token lifetime in hours.
    pub jwt_expiration_hours: u64,

    /// Refresh token lifetime in hours.
    pub jwt_refresh_expiration_hours: u64,

    /// Routes that bypass verification (exact or trailing `*` prefix).
    pub public_routes: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            jwt_secret: String::new(),
            jwt_expiration_hours: 24,
            jwt_refresh_expiration_hours: 24 * 7,
            public_routes: vec![
                "/health".to_string(),
                "/api/auth/*".to_string(),
            ],
        }
    }
}

impl AuthConfig {
    pub fn access_ttl(&self) -> Duration {
        Duration::from_secs(self.jwt_expiration_hours * 3600)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.jwt_refresh_expiration_hours * 3600)
    }
}

/// A single token bucket rule.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct RateLimitRule {
    /// Sustained rate; refill is `requests_per_minute / 60` tokens per second.
    pub requests_per_minute: u32,

    /// Bucket capacity.
    pub burst: u32,
}

impl RateLimitRule {
    pub const fn new(requests_per_minute: u32, burst: u32) -> Self {
        Self { requests_per_minute, burst }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Bucket shared by every request.
    pub global: RateLimitRule,

    /// Per authenticated caller.
    pub per_user: RateLimitRule,

    /// Per client IP for anonymous callers.
    pub anonymous: RateLimitRule,

    /// Client IPs that skip tiered checking entirely.
    pub whitelist_ips: Vec<String>,

    /// Buckets idle for longer than this are reclaimed.
    pub idle_ttl_secs: u64,

    /// Interval of the reclamation sweep.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            global: RateLimitRule::new(6000, 500),
            per_user: RateLimitRule::new(600, 50),
            anonymous: RateLimitRule::new(120, 20),
            whitelist_ips: Vec::new(),
            idle_ttl_secs: 3600,
            sweep_interval_secs: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,

    /// Exact origins or `*.domain` wildcard suffix patterns.
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    pub allow_credentials: bool,

    /// Preflight cache lifetime in seconds.
    pub max_age: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["http://localhost:3000".to_string()],
            allowed_methods: ["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allowed_headers: ["Authorization", "Content-Type", "X-Request-ID"]
                .iter()
                .map(|h| h.to_string())
                .collect(),
            exposed_headers: [
                "X-Request-ID",
                "X-RateLimit-Limit",
                "X-RateLimit-Remaining",
                "X-RateLimit-Reset",
            ]
            .iter()
            .map(|h| h.to_string())
            .collect(),
            allow_credentials: true,
            max_age: 86_400,
        }
    }
}

/// WebSocket hub configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebSocketConfig {
    pub enabled: bool,

    /// Upgrade path.
    pub path: String,

    /// Total active connections allowed.
    pub max_connections: usize,

    /// Simultaneous connections allowed per identified user.
    pub max_connections_per_user: usize,

    /// Liveness tick period in milliseconds.
    pub ping_period_ms: u64,

    /// A connection silent for longer than this is dropped.
    pub pong_wait_ms: u64,

    /// Deadline for a single outbound frame write.
    pub write_wait_ms: u64,

    /// Bounded outbound queue size per connection.
    pub send_queue_size: usize,

    /// Largest inbound message accepted, in bytes.
    pub max_message_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/ws".to_string(),
            max_connections: 10_000,
            max_connections_per_user: 5,
            ping_period_ms: 54_000,
            pong_wait_ms: 60_000,
            write_wait_ms: 10_000,
            send_queue_size: 256,
            max_message_size: 64 * 1024,
        }
    }
}

impl WebSocketConfig {
    pub fn ping_period(&self) -> Duration {
        Duration::from_millis(self.ping_period_ms)
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_millis(self.pong_wait_ms)
    }

    pub fn write_wait(&self) -> Duration {
        Duration::from_millis(self.write_wait_ms)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// "json" or "pretty".
    pub format: String,

    /// Emit one event per completed request.
    pub access_log: bool,

    /// Requests slower than this are logged at warn.
    pub slow_request_threshold_ms: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            access_log: true,
            slow_request_threshold_ms: 1000,
        }
    }
}

impl LoggingConfig {
    pub fn slow_request_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_request_threshold_ms)
    }
}

/// Aggregate health configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Probe backends when `/health` is requested.
    pub check_services: bool,

    /// Upper bound for a single backend probe in milliseconds.
    pub service_check_timeout_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_services: true,
            service_check_timeout_ms: 5000,
        }
    }
}

impl HealthConfig {
    pub fn service_check_timeout(&self) -> Duration {
        Duration::from_millis(self.service_check_timeout_ms)
    }
}

/// Upstream forwarding configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxySettings {
    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Headers set on every forwarded request.
    pub add_headers: BTreeMap<String, String>,

    /// Headers removed from every forwarded request.
    pub remove_headers: Vec<String>,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            add_headers: BTreeMap::new(),
            remove_headers: vec!["Cookie".to_string()],
        }
    }
}

impl ProxySettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
