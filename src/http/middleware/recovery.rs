//! Panic recovery.
//!
//! Wraps everything inside the request-id layer. A panic anywhere below is
//! logged once and turned into a generic 500 envelope.

use axum::{
    body::Body,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;

use crate::error::GatewayError;
use crate::http::context::RequestContext;

pub async fn recovery_middleware(request: Request<Body>, next: Next) -> Response {
    let ctx = RequestContext::of(&request);

    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            tracing::error!(
                request_id = %ctx.request_id,
                method = %ctx.method,
                path = %ctx.path,
                panic = %panic_message(panic.as_ref()),
                "Recovered from panic"
            );
            ctx.error(GatewayError::Internal("handler panicked".to_string()))
                .into_response()
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::middleware::request_id_middleware;
    use axum::{body::to_bytes, http::StatusCode, middleware::from_fn, routing::get, Router};
    use serde_json::Value;
    use tower::ServiceExt;

    async fn boom() -> &'static str {
        panic!("handler exploded")
    }

    fn app() -> Router {
        Router::new()
            .route("/boom", get(boom))
            .route("/fine", get(|| async { "ok" }))
            .layer(from_fn(recovery_middleware))
            .layer(from_fn(request_id_middleware))
    }

    #[tokio::test]
    async fn test_panic_becomes_500_envelope_with_request_id() {
        let response = app()
            .oneshot(
                Request::get("/boom")
                    .header("x-request-id", "rid-9")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()["x-request-id"], "rid-9");

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(body["request_id"], "rid-9");
    }

    #[tokio::test]
    async fn test_normal_response_passes_through() {
        let response = app()
            .oneshot(Request::get("/fine").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_panic_message_payloads() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u8), "unknown panic");
    }
}
