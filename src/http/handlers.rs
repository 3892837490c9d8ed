//! Gateway-owned HTTP handlers: health, stats, proxy dispatch and fallbacks.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::GatewayError;
use crate::health::aggregate;
use crate::http::context::RequestContext;
use crate::http::server::AppState;
use crate::models::Envelope;
use crate::proxy::ProxyStats;
use crate::security::rate_limit::RateLimiterStats;
use crate::websocket::HubStats;

#[derive(Debug, Clone, Serialize)]
pub struct GatewayInfo {
    pub version: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayStats {
    pub gateway: GatewayInfo,
    pub proxy: ProxyStats,
    pub websocket: HubStats,
    pub rate_limit: RateLimiterStats,
}

/// `GET /health`: 200 when every probed service is healthy, 503 otherwise.
pub async fn health(State(state): State<AppState>, Extension(ctx): Extension<RequestContext>) -> Response {
    let services = if state.config.health.check_services {
        state
            .proxy
            .health_all(state.config.health.service_check_timeout())
            .await
    } else {
        BTreeMap::new()
    };

    let report = aggregate(services, state.started_at.elapsed(), state.hub.connection_count());
    let healthy = report.is_healthy();
    if !healthy {
        tracing::warn!(request_id = %ctx.request_id, "Gateway health check reports unhealthy services");
    }

    let mut envelope = Envelope::ok(report, ctx.request_id);
    envelope.success = healthy;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(envelope)).into_response()
}

/// `GET /api/stats`
pub async fn stats(State(state): State<AppState>, Extension(ctx): Extension<RequestContext>) -> Response {
    let stats = GatewayStats {
        gateway: GatewayInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: state.started_at.elapsed().as_secs(),
        },
        proxy: state.proxy.stats(),
        websocket: state.hub.stats(),
        rate_limit: state.rate_limiter.stats(),
    };
    Json(Envelope::ok(stats, ctx.request_id)).into_response()
}

/// Catch-all under `/api/`: route by prefix and forward.
pub async fn proxy_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    request: Request<Body>,
) -> Response {
    let Some(backend) = state.proxy.route(&ctx.path) else {
        tracing::debug!(request_id = %ctx.request_id, path = %ctx.path, "No route matched");
        return ctx
            .error(GatewayError::NotFound("No service found for path".to_string()))
            .into_response();
    };

    match state.proxy.forward(request, backend, &ctx).await {
        Ok(response) => response,
        Err(e) => ctx.error(e).into_response(),
    }
}

pub async fn not_found(request: Request<Body>) -> Response {
    let ctx = RequestContext::of(&request);
    ctx.error(GatewayError::NotFound("Resource not found".to_string()))
        .into_response()
}

pub async fn method_not_allowed(request: Request<Body>) -> Response {
    let ctx = RequestContext::of(&request);
    ctx.error(GatewayError::MethodNotAllowed).into_response()
}
