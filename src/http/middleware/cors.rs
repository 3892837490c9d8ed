//! CORS handling.
//!
//! # Responsibilities
//! - Match `Origin` against exact origins, `*`, or `*.domain` patterns
//! - Answer preflight `OPTIONS` requests directly
//!
//! # Design Decisions
//! - `Access-Control-Allow-Origin` is only set for matched origins, and never
//!   overwrites a value set by an earlier layer
//! - A `*.domain` pattern also admits the bare domain

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::config::CorsConfig;

pub async fn cors_middleware(
    State(cors): State<Arc<CorsConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !cors.enabled {
        return next.run(request).await;
    }

    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .filter(|origin| origin_allowed(&cors.allowed_origins, origin))
        .map(str::to_string);

    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(request).await
    };
    apply_headers(&cors, origin.as_deref(), response.headers_mut());
    response
}

pub fn origin_allowed(allowed: &[String], origin: &str) -> bool {
    let host = origin_host(origin);
    allowed.iter().any(|pattern| {
        if pattern == "*" || pattern == origin {
            return true;
        }
        match pattern.strip_prefix("*.") {
            Some(domain) => {
                host.eq_ignore_ascii_case(domain)
                    || host
                        .len()
                        .checked_sub(domain.len() + 1)
                        .map(|split| {
                            host.as_bytes()[split] == b'.'
                                && host[split + 1..].eq_ignore_ascii_case(domain)
                        })
                        .unwrap_or(false)
            }
            None => false,
        }
    })
}

/// `https://a.example.com:8443` → `a.example.com`
fn origin_host(origin: &str) -> &str {
    let rest = origin.split_once("://").map_or(origin, |(_, rest)| rest);
    let authority = rest.split('/').next().unwrap_or(rest);
    authority.split(':').next().unwrap_or(authority)
}

fn apply_headers(cors: &CorsConfig, origin: Option<&str>, headers: &mut HeaderMap) {
    if let Some(origin) = origin {
        if !headers.contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN) {
            if let Ok(value) = HeaderValue::from_str(origin) {
                headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
            }
        }
        headers.append(header::VARY, HeaderValue::from_static("Origin"));
    }

    let lists = [
        (header::ACCESS_CONTROL_ALLOW_METHODS, &cors.allowed_methods),
        (header::ACCESS_CONTROL_ALLOW_HEADERS, &cors.allowed_headers),
        (header::ACCESS_CONTROL_EXPOSE_HEADERS, &cors.exposed_headers),
    ];
    for (name, values) in lists {
        if values.is_empty() {
            continue;
        }
        if let Ok(value) = HeaderValue::from_str(&values.join(", ")) {
            headers.insert(name, value);
        }
    }

    if cors.allow_credentials {
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
    }
    if cors.max_age > 0 {
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from(cors.max_age));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_wildcard_subdomain() {
        let allowed = patterns(&["*.example.com"]);
        assert!(origin_allowed(&allowed, "https://sub.example.com"));
        assert!(origin_allowed(&allowed, "https://a.b.example.com:8443"));
        assert!(origin_allowed(&allowed, "https://example.com"));
        assert!(!origin_allowed(&allowed, "https://evil.com"));
        assert!(!origin_allowed(&allowed, "https://notexample.com"));
    }

    #[test]
    fn test_exact_and_any() {
        let allowed = patterns(&["http://localhost:3000"]);
        assert!(origin_allowed(&allowed, "http://localhost:3000"));
        assert!(!origin_allowed(&allowed, "http://localhost:3001"));
        assert!(origin_allowed(&patterns(&["*"]), "https://anything.io"));
        assert!(!origin_allowed(&[], "https://anything.io"));
    }

    #[test]
    fn test_existing_allow_origin_kept() {
        let cors = CorsConfig {
            enabled: true,
            ..CorsConfig::default()
        };
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("https://first.example.com"),
        );
        apply_headers(&cors, Some("https://second.example.com"), &mut headers);
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://first.example.com"
        );
    }
}
