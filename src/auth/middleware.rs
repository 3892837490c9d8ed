//! Bearer token enforcement for protected routes.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::auth::guard::{bearer_token, AuthError, AuthGuard};
use crate::error::GatewayError;
use crate::http::context::{Caller, RequestContext};

pub async fn auth_middleware(
    State(guard): State<Arc<AuthGuard>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if !guard.is_enabled() || guard.is_public(request.uri().path()) {
        return next.run(request).await;
    }

    let ctx = RequestContext::of(&request);

    // The rate limiter may already have verified the token.
    let caller = match request.extensions().get::<Caller>() {
        Some(caller) => caller.clone(),
        None => match authenticate(&guard, &request) {
            Ok(caller) => caller,
            Err(e) => {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    path = %ctx.path,
                    method = %ctx.method,
                    client_ip = %ctx.client_ip,
                    reason = %e,
                    "Authentication failed"
                );
                return ctx
                    .error(GatewayError::Unauthorized(e.to_string()))
                    .into_response();
            }
        },
    };

    tracing::debug!(request_id = %ctx.request_id, user_id = caller.user_id, "Request authenticated");

    set_identity_headers(request.headers_mut(), &caller);
    request.extensions_mut().insert(caller.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(caller);
    response
}

/// Identity headers for backends. Tokens minted by a refresh carry no
/// username, so `x-username` is omitted rather than sent empty.
fn set_identity_headers(headers: &mut HeaderMap, caller: &Caller) {
    headers.insert("x-user-id", HeaderValue::from(caller.user_id));
    headers.remove("x-username");
    if caller.username.is_empty() {
        return;
    }
    if let Ok(username) = HeaderValue::from_str(&caller.username) {
        headers.insert("x-username", username);
    }
}

fn authenticate(guard: &AuthGuard, request: &Request<Body>) -> Result<Caller, AuthError> {
    let token = bearer_token(request.headers())?;
    let claims = guard.verify(token)?;
    Ok(Caller::from(&claims))
}
