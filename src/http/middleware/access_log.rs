//! Access logging and request metrics.
//!
//! One event per request. Severity: error for 5xx, warn for 4xx or a request
//! slower than the configured threshold, info otherwise.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::Level;

use crate::config::LoggingConfig;
use crate::http::context::{Caller, RequestContext};
use crate::observability::metrics;

pub async fn access_log_middleware(
    State(config): State<Arc<LoggingConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ctx = RequestContext::of(&request);
    let response = next.run(request).await;

    let status = response.status();
    let elapsed = ctx.elapsed();
    let service = response
        .headers()
        .get("x-service-name")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("gateway");
    metrics::record_request(ctx.method.as_str(), status.as_u16(), service, elapsed);

    if !config.access_log {
        return response;
    }

    let caller = response.extensions().get::<Caller>();
    let user_id = caller.map_or(0, |c| c.user_id);
    let username = caller.map_or("", |c| c.username.as_str());
    let duration_ms = elapsed.as_millis() as u64;
    let slow = elapsed > config.slow_request_threshold();

    macro_rules! access_event {
        ($level:ident, $msg:literal) => {
            tracing::$level!(
                request_id = %ctx.request_id,
                method = %ctx.method,
                path = %ctx.path,
                status = status.as_u16(),
                duration_ms,
                slow,
                user_id,
                username,
                client_ip = %ctx.client_ip,
                user_agent = %ctx.user_agent,
                $msg
            )
        };
    }

    match severity(status, slow) {
        Level::ERROR => access_event!(error, "Request completed with server error"),
        Level::WARN if slow => access_event!(warn, "Slow request"),
        Level::WARN => access_event!(warn, "Request completed with client error"),
        _ => access_event!(info, "Request completed"),
    }

    response
}

fn severity(status: StatusCode, slow: bool) -> Level {
    if status.is_server_error() {
        Level::ERROR
    } else if status.is_client_error() || slow {
        Level::WARN
    } else {
        Level::INFO
    }
}
