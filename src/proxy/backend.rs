//! Backend service descriptors.
//!
//! # Responsibilities
//! - Hold the static description of one backend (name, base URL, deadline, retries)
//! - Build upstream URIs for forwarded requests and health probes
//!
//! # Design Decisions
//! - Immutable after startup; shared by reference, no locking
//! - The base URL's path is a prefix for every forwarded path

use axum::http::Uri;
use std::time::Duration;
use url::Url;

use crate::config::ServiceConfig;
use crate::resilience::RetryPolicy;

#[derive(Debug, Clone)]
pub struct Backend {
    pub name: String,
    pub base_url: Url,
    pub health_endpoint: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Backend {
    pub fn from_config(config: &ServiceConfig) -> Result<Self, url::ParseError> {
        Ok(Self {
            name: config.name.clone(),
            base_url: Url::parse(&config.url)?,
            health_endpoint: config.health_endpoint.clone(),
            timeout: config.timeout(),
            retry: RetryPolicy::new(config.retry_attempts),
        })
    }

    /// Configured base URL as written, without a trailing slash.
    pub fn url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// Upstream URI for `path_and_query` (e.g. `/api/news?page=2`).
    pub fn upstream_uri(&self, path_and_query: &str) -> Result<Uri, axum::http::uri::InvalidUri> {
        format!("{}{}", self.url(), path_and_query).parse()
    }

    pub fn health_uri(&self) -> Result<Uri, axum::http::uri::InvalidUri> {
        self.upstream_uri(&self.health_endpoint)
    }
}
