//! Request-scoped context.
//!
//! [`RequestContext`] is created once by the request-id middleware and stored
//! in the request extensions; every later layer reads it from there. The
//! authenticated [`Caller`] is a separate extension added by the auth layers,
//! and is copied onto the response so the access log can see it.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Method, Request},
};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::error::{ErrorResponse, GatewayError};
use crate::security::client_ip::resolve_client_ip;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub method: Method,
    pub path: String,
    pub client_ip: String,
    /// Socket peer address; unlike `client_ip` it cannot be set by the client.
    pub peer_ip: Option<String>,
    pub user_agent: String,
    pub started_at: Instant,
}

impl RequestContext {
    pub fn from_request(request: &Request<Body>, request_id: String) -> Self {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Self {
            request_id,
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            client_ip: resolve_client_ip(request.headers(), peer),
            peer_ip: peer.map(|addr| addr.ip().to_string()),
            user_agent: request
                .headers()
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string(),
            started_at: Instant::now(),
        }
    }

    /// The context stored by the request-id layer, or a fresh one if it is absent.
    pub fn of(request: &Request<Body>) -> Self {
        match request.extensions().get::<RequestContext>() {
            Some(ctx) => ctx.clone(),
            None => Self::from_request(request, uuid::Uuid::new_v4().to_string()),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Bind an error to this request.
    pub fn error(&self, error: GatewayError) -> ErrorResponse {
        error.with_request_id(self.request_id.clone())
    }
}

/// Identity of an authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: i64,
    pub username: String,
    pub email: String,
}
