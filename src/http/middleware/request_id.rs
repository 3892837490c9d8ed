//! Request ID assignment.
//!
//! # Responsibilities
//! - Reuse the inbound `X-Request-ID`, or generate a UUID v4
//! - Create the [`RequestContext`] every later layer reads
//! - Echo the ID on the response
//!
//! # Design Decisions
//! - Outermost layer, so every response (errors included) carries the ID
//! - Oversized or non-visible-ASCII inbound IDs are replaced, not trusted

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::http::context::RequestContext;

pub const X_REQUEST_ID: &str = "x-request-id";

const MAX_REQUEST_ID_LEN: usize = 128;

pub async fn request_id_middleware(mut request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty() && id.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let ctx = RequestContext::from_request(&request, request_id);
    let header = HeaderValue::from_str(&ctx.request_id).ok();
    request.extensions_mut().insert(ctx);

    let mut response = next.run(request).await;
    if let Some(header) = header {
        response.headers_mut().insert(X_REQUEST_ID, header);
    }
    response
}
