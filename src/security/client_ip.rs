//! Client IP resolution.
//!
//! Precedence: first `X-Forwarded-For` entry, `X-Real-IP`, `X-Client-IP`,
//! then the socket peer address.

use axum::http::HeaderMap;
use std::net::SocketAddr;

const CANDIDATE_HEADERS: [&str; 3] = ["x-forwarded-for", "x-real-ip", "x-client-ip"];

pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    for name in CANDIDATE_HEADERS {
        let value = headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = value {
            return ip.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
