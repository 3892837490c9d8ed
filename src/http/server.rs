//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the shared application state from configuration
//! - Create the Axum router: public routes, protected routes, fallbacks
//! - Wire the middleware chain in its fixed order
//! - Serve with graceful shutdown bounded by the grace period
//!
//! # Design Decisions
//! - Layers are added inner-first; the last `.layer` call is the outermost
//! - Auth is a `route_layer` on the protected sub-router only
//! - Every subsystem is owned by `AppState`; nothing is a process-wide singleton

use axum::{
    http::{HeaderName, HeaderValue},
    middleware::{from_fn, from_fn_with_state},
    routing::{any, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{limit::RequestBodyLimitLayer, set_header::SetResponseHeaderLayer};

use crate::auth::{self, auth_middleware, AuthGuard};
use crate::config::GatewayConfig;
use crate::http::handlers;
use crate::http::middleware::{
    access_log_middleware, cors_middleware, recovery_middleware, request_id_middleware,
};
use crate::proxy::ProxyEngine;
use crate::security::headers::SECURITY_HEADERS;
use crate::security::rate_limit::{rate_limit_middleware, RateLimitState, RateLimiter};
use crate::websocket::{ws_handler, Hub, HubHandle};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub proxy: Arc<ProxyEngine>,
    pub auth: Arc<AuthGuard>,
    pub rate_limiter: Arc<RateLimiter>,
    pub hub: HubHandle,
    pub started_at: Instant,
}

impl AppState {
    /// Build every subsystem. The returned [`Hub`] must be spawned by the caller.
    pub fn new(config: GatewayConfig) -> (Self, Hub) {
        let (hub, hub_handle) = Hub::new(config.websocket.clone());
        let state = Self {
            proxy: Arc::new(ProxyEngine::new(&config)),
            auth: Arc::new(AuthGuard::new(&config.auth)),
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limit.clone())),
            hub: hub_handle,
            started_at: Instant::now(),
            config: Arc::new(config),
        };
        (state, hub)
    }
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        Self {
            router: build_router(state.clone()),
            state,
        }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires, then give in-flight requests the grace
    /// period before returning.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let grace = self.state.config.server.shutdown_grace();
        let mut grace_start = shutdown.resubscribe();

        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server draining connections");
        });

        tokio::select! {
            result = async { server.await } => result?,
            _ = async {
                let _ = grace_start.recv().await;
                tokio::time::sleep(grace).await;
            } => {
                tracing::warn!(grace = ?grace, "Grace period elapsed, dropping remaining connections");
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the router with the full middleware chain.
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();

    let mut public = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/auth/login", post(auth::handlers::login))
        .route("/api/auth/register", post(auth::handlers::register))
        .route("/api/auth/refresh", post(auth::handlers::refresh));
    if config.websocket.enabled {
        public = public.route(&config.websocket.path, get(ws_handler));
    }

    let protected = Router::new()
        .route("/api/stats", get(handlers::stats))
        .route("/api/{*path}", any(handlers::proxy_handler))
        .route_layer(from_fn_with_state(state.auth.clone(), auth_middleware));

    let rate_limit = RateLimitState {
        limiter: state.rate_limiter.clone(),
        auth: state.auth.clone(),
    };

    let mut router = public
        .merge(protected)
        .fallback(handlers::not_found)
        .method_not_allowed_fallback(handlers::method_not_allowed)
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(config.server.max_body_size))
        .layer(from_fn_with_state(rate_limit, rate_limit_middleware))
        .layer(from_fn_with_state(
            Arc::new(config.logging.clone()),
            access_log_middleware,
        ))
        .layer(from_fn_with_state(Arc::new(config.cors.clone()), cors_middleware));

    for (name, value) in SECURITY_HEADERS {
        router = router.layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        ));
    }

    router
        .layer(from_fn(recovery_middleware))
        .layer(from_fn(request_id_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::IssuedToken;
    use crate::config::{RateLimitRule, ServiceConfig};
    use crate::http::context::Caller;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    const SECRET: &str = "router-test-secret";

    fn config() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.services = vec![ServiceConfig::new("pulse", "http://127.0.0.1:9")];
        config.routes = vec![crate::config::RouteConfig::new("/api/pulses", "pulse")];
        config.auth.enabled = true;
        config.auth.jwt_secret = SECRET.to_string();
        config.health.check_services = false;
        config.cors.allowed_origins = vec!["*.example.com".to_string()];
        config
    }

    fn router(config: GatewayConfig) -> (Router, AppState) {
        let (state, _hub) = AppState::new(config);
        (build_router(state.clone()), state)
    }

    fn token(state: &AppState) -> IssuedToken {
        state
            .auth
            .issue(&Caller {
                user_id: 42,
                username: "alice".into(),
                email: "alice@example.com".into(),
            })
            .unwrap()
    }

    async fn json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_is_public_with_security_headers() {
        let (app, _) = router(config());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-frame-options"], "DENY");
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
        assert!(response.headers().contains_key("x-request-id"));

        let body = json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "healthy");
    }

    #[tokio::test]
    async fn test_inbound_request_id_is_echoed() {
        let (app, _) = router(config());
        let response = app
            .oneshot(
                Request::get("/nowhere")
                    .header("x-request-id", "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["x-request-id"], "abc-123");
        let body = json(response).await;
        assert_eq!(body["request_id"], "abc-123");
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_protected_route_requires_token() {
        let (app, _) = router(config());
        let response = app
            .oneshot(Request::get("/api/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_stats_with_valid_token() {
        let (app, state) = router(config());
        let token = token(&state);
        let response = app
            .oneshot(
                Request::get("/api/stats")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token.token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["data"]["proxy"]["services"][0], "pulse");
        assert_eq!(body["data"]["websocket"]["total_connections"], 0);
    }

    #[tokio::test]
    async fn test_unknown_api_path_is_404() {
        let (app, state) = router(config());
        let token = token(&state);
        let response = app
            .oneshot(
                Request::get("/api/unknown")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token.token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json(response).await;
        assert_eq!(body["error"]["message"], "No service found for path");
    }

    #[tokio::test]
    async fn test_cors_preflight_short_circuits() {
        let (app, _) = router(config());
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/pulses")
                    .header(header::ORIGIN, "https://sub.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://sub.example.com"
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_cors_unknown_origin_gets_no_allow_origin() {
        let (app, _) = router(config());
        let response = app
            .oneshot(
                Request::get("/health")
                    .header(header::ORIGIN, "https://evil.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }

    #[tokio::test]
    async fn test_login_not_implemented() {
        let (app, _) = router(config());
        let response = app
            .oneshot(
                Request::post("/api/auth/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"username":"alice","password":"secret1"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_with_retry_after() {
        let mut config = config();
        config.rate_limit.enabled = true;
        config.rate_limit.whitelist_ips.clear();
        config.rate_limit.global = RateLimitRule::new(60, 2);
        let (app, _) = router(config);

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(Request::get("/health").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().contains_key("x-ratelimit-remaining"));
        }

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
        let body = json(response).await;
        assert_eq!(body["error"]["code"], "RATE_LIMIT_EXCEEDED");
    }

    #[tokio::test]
    async fn test_forwarded_loopback_does_not_bypass_rate_limit() {
        use axum::extract::ConnectInfo;

        let mut config = config();
        config.rate_limit.enabled = true;
        config.rate_limit.whitelist_ips = vec!["127.0.0.1".to_string()];
        config.rate_limit.global = RateLimitRule::new(60, 2);
        config.rate_limit.anonymous = RateLimitRule::new(60, 2);
        let (app, _) = router(config);
        let peer: SocketAddr = "203.0.113.5:40000".parse().unwrap();

        let mut statuses = Vec::new();
        for _ in 0..5 {
            let response = app
                .clone()
                .oneshot(
                    Request::get("/health")
                        .header("x-forwarded-for", "127.0.0.1")
                        .extension(ConnectInfo(peer))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            statuses.push(response.status());
        }

        assert_eq!(&statuses[..2], &[StatusCode::OK, StatusCode::OK]);
        assert!(statuses[2..].iter().all(|s| *s == StatusCode::TOO_MANY_REQUESTS));
    }

    #[tokio::test]
    async fn test_whitelisted_peer_skips_rate_limit() {
        use axum::extract::ConnectInfo;

        let mut config = config();
        config.rate_limit.enabled = true;
        config.rate_limit.whitelist_ips = vec!["10.0.0.2".to_string()];
        config.rate_limit.global = RateLimitRule::new(60, 1);
        let (app, _) = router(config);
        let peer: SocketAddr = "10.0.0.2:5000".parse().unwrap();

        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(
                    Request::get("/health")
                        .extension(ConnectInfo(peer))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(!response.headers().contains_key("x-ratelimit-limit"));
        }
    }

    #[tokio::test]
    async fn test_wrong_method_on_auth_route() {
        let (app, _) = router(config());
        let response = app
            .oneshot(Request::get("/api/auth/login").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
