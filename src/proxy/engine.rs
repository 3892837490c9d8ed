//! Reverse proxy engine.
//!
//! # Responsibilities
//! - Resolve the backend for a request path
//! - Rewrite and forward the request, stream the response back
//! - Classify upstream failures into 503 / 504 / 502
//! - Fan out health probes to every backend
//!
//! # Design Decisions
//! - One pooled hyper client shared by forwarding and probing
//! - Response bodies are streamed frame by frame, never buffered
//! - The request body is buffered only when a retry is possible
//! - Raw transport errors are logged, never returned to the caller

use axum::{
    body::{Body, Bytes},
    http::{header, request::Parts, HeaderMap, HeaderValue, Request},
    response::Response,
};
use futures_util::future::join_all;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::error::Error as StdError;
use std::time::Duration;

use crate::config::{GatewayConfig, ProxySettings};
use crate::error::GatewayError;
use crate::health::probe::{probe_backend, ServiceHealth};
use crate::http::context::{Caller, RequestContext};
use crate::observability::metrics;
use crate::proxy::backend::Backend;
use crate::routing::ServiceRouter;
use crate::security::headers::{append_forwarded_for, apply_header_rules, strip_hop_by_hop};

pub type HttpClient = Client<HttpConnector, Body>;

/// How a forwarding failure is reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection refused or name resolution failed: 503.
    Unavailable,
    /// Deadline exceeded: 504.
    Timeout,
    /// Anything else: 502.
    BadGateway,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Unavailable => "unavailable",
            FailureKind::Timeout => "timeout",
            FailureKind::BadGateway => "bad_gateway",
        }
    }

    pub fn into_error(self, service: &str, detail: String) -> GatewayError {
        let service = service.to_string();
        match self {
            FailureKind::Unavailable => GatewayError::ServiceUnavailable { service, detail },
            FailureKind::Timeout => GatewayError::GatewayTimeout { service, detail },
            FailureKind::BadGateway => GatewayError::BadGateway { service, detail },
        }
    }
}

/// Classify a client error by walking its source chain.
pub fn classify(err: &hyper_util::client::legacy::Error) -> FailureKind {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            match io.kind() {
                std::io::ErrorKind::TimedOut => return FailureKind::Timeout,
                std::io::ErrorKind::ConnectionRefused => return FailureKind::Unavailable,
                _ => {}
            }
        }
        current = e.source();
    }

    if err.is_connect() {
        // DNS failures and other connect errors.
        FailureKind::Unavailable
    } else {
        FailureKind::BadGateway
    }
}

/// Typed proxy statistics.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyStats {
    pub services: Vec<String>,
    pub routes: usize,
}

enum Payload {
    Streaming(Option<Body>),
    Buffered(Bytes),
}

impl Payload {
    fn next_body(&mut self) -> Body {
        match self {
            Payload::Streaming(body) => body.take().unwrap_or_else(Body::empty),
            Payload::Buffered(bytes) => Body::from(bytes.clone()),
        }
    }
}

pub struct ProxyEngine {
    client: HttpClient,
    router: ServiceRouter,
    backends: HashMap<String, Backend>,
    settings: ProxySettings,
}

impl ProxyEngine {
    pub fn new(config: &GatewayConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.proxy.connect_timeout()));
        connector.set_nodelay(true);
        let client = Client::builder(TokioExecutor::new()).build(connector);

        let mut backends = HashMap::new();
        for service in &config.services {
            match Backend::from_config(service) {
                Ok(backend) => {
                    tracing::info!(service = %backend.name, url = %backend.url(), "Initialized reverse proxy for service");
                    backends.insert(backend.name.clone(), backend);
                }
                Err(e) => {
                    tracing::error!(service = %service.name, url = %service.url, error = %e, "Invalid service URL, skipping");
                }
            }
        }

        Self {
            client,
            router: ServiceRouter::from_config(&config.routes),
            backends,
            settings: config.proxy.clone(),
        }
    }

    /// Backend owning `path`, if a route matches and the service is configured.
    pub fn route(&self, path: &str) -> Option<&Backend> {
        self.router
            .route(path)
            .and_then(|service| self.backends.get(service))
    }

    pub fn backend(&self, name: &str) -> Option<&Backend> {
        self.backends.get(name)
    }

    pub fn stats(&self) -> ProxyStats {
        let mut services: Vec<String> = self.backends.keys().cloned().collect();
        services.sort();
        ProxyStats {
            services,
            routes: self.router.len(),
        }
    }

    /// Forward `request` to `backend` and relay the response.
    pub async fn forward(
        &self,
        request: Request<Body>,
        backend: &Backend,
        ctx: &RequestContext,
    ) -> Result<Response, GatewayError> {
        let (parts, body) = request.into_parts();
        let attempts = backend.retry.attempts_for(&parts.method);

        let mut payload = if attempts > 1 {
            let bytes = axum::body::to_bytes(body, usize::MAX)
                .await
                .map_err(|e| GatewayError::BadRequest(format!("Unreadable request body: {}", e)))?;
            Payload::Buffered(bytes)
        } else {
            Payload::Streaming(Some(body))
        };

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let uri = backend.upstream_uri(path_and_query).map_err(|e| {
            FailureKind::BadGateway.into_error(&backend.name, format!("invalid upstream URI: {}", e))
        })?;
        let headers = self.upstream_headers(&parts, ctx);

        tracing::debug!(
            request_id = %ctx.request_id,
            service = %backend.name,
            method = %parts.method,
            path = %ctx.path,
            "Proxying request to service"
        );

        let mut attempt = 0;
        loop {
            attempt += 1;

            let mut upstream = Request::builder()
                .method(parts.method.clone())
                .uri(uri.clone())
                .body(payload.next_body())
                .map_err(|e| GatewayError::Internal(e.to_string()))?;
            *upstream.headers_mut() = headers.clone();

            let result = tokio::time::timeout(backend.timeout, self.client.request(upstream)).await;
            let (kind, detail) = match result {
                Ok(Ok(response)) => return Ok(self.downstream_response(response, backend)),
                Ok(Err(e)) => {
                    let kind = classify(&e);
                    if e.is_connect() && attempt < attempts {
                        let delay = backend.retry.backoff(attempt);
                        tracing::info!(
                            request_id = %ctx.request_id,
                            service = %backend.name,
                            attempt,
                            delay = ?delay,
                            "Retrying after connection failure"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    (kind, error_chain(&e))
                }
                Err(_) => (
                    FailureKind::Timeout,
                    format!("no response within {:?}", backend.timeout),
                ),
            };

            tracing::error!(
                request_id = %ctx.request_id,
                service = %backend.name,
                method = %parts.method,
                path = %ctx.path,
                attempt,
                kind = kind.as_str(),
                error = %detail,
                "Proxy error occurred"
            );
            metrics::record_upstream_error(&backend.name, kind.as_str());
            return Err(kind.into_error(&backend.name, detail));
        }
    }

    fn upstream_headers(&self, parts: &Parts, ctx: &RequestContext) -> HeaderMap {
        let mut headers = parts.headers.clone();
        strip_hop_by_hop(&mut headers);

        // Let the client set Host from the upstream URI.
        if let Some(host) = headers.remove(header::HOST) {
            headers.insert("x-original-host", host);
        }

        // Identity headers are only trusted when the auth layer set them.
        if parts.extensions.get::<Caller>().is_none() {
            headers.remove("x-user-id");
            headers.remove("x-username");
        }

        apply_header_rules(&mut headers, &self.settings);

        headers.insert("x-gateway-request", HeaderValue::from_static("true"));
        if let Ok(ts) = HeaderValue::from_str(&chrono::Utc::now().to_rfc3339()) {
            headers.insert("x-gateway-timestamp", ts);
        }
        if let Ok(id) = HeaderValue::from_str(&ctx.request_id) {
            headers.insert("x-request-id", id);
        }
        append_forwarded_for(&mut headers, &ctx.client_ip);
        headers
    }

    fn downstream_response(
        &self,
        response: hyper::Response<hyper::body::Incoming>,
        backend: &Backend,
    ) -> Response {
        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        parts.headers.remove("x-internal-service");
        if let Ok(name) = HeaderValue::from_str(&backend.name) {
            parts.headers.insert("x-service-name", name);
        }
        parts
            .headers
            .insert("x-gateway-response", HeaderValue::from_static("true"));
        Response::from_parts(parts, Body::new(body))
    }

    /// Probe every backend concurrently. Each probe is bounded by
    /// `min(service timeout, cap)`.
    pub async fn health_all(&self, cap: Duration) -> BTreeMap<String, ServiceHealth> {
        let probes = self
            .backends
            .values()
            .map(|backend| probe_backend(&self.client, backend, backend.timeout.min(cap)));

        join_all(probes)
            .await
            .into_iter()
            .map(|health| (health.name.clone(), health))
            .collect()
    }
}

fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut current = err.source();
    while let Some(e) = current {
        message.push_str(": ");
        message.push_str(&e.to_string());
        current = e.source();
    }
    message
}
