//! Backend health probing and aggregation.
//!
//! # Responsibilities
//! - Probe one backend's health endpoint under a deadline
//! - Fold per-service results into the gateway health report
//!
//! # Design Decisions
//! - Only a 200 response counts as healthy; any other status is a failure
//! - A probe never errors; failures become an unhealthy `ServiceHealth`
//! - Nothing is cached, every report reflects fresh probes

use axum::{body::Body, http::{Request, StatusCode}};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::time;

use crate::models::{STATUS_HEALTHY, STATUS_UNHEALTHY};
use crate::observability::metrics;
use crate::proxy::{Backend, HttpClient};

/// Result of probing one backend.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub name: String,
    pub url: String,
    pub status: String,
    pub latency_ms: u64,
    pub last_check: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceHealth {
    pub fn is_healthy(&self) -> bool {
        self.status == STATUS_HEALTHY
    }
}

/// Aggregated health report served at `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayHealth {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub uptime_secs: u64,
    pub services: BTreeMap<String, ServiceHealth>,
    pub websocket_connections: usize,
}

impl GatewayHealth {
    pub fn is_healthy(&self) -> bool {
        self.status == STATUS_HEALTHY
    }
}

/// Build the report. The gateway is healthy iff every probed service is.
pub fn aggregate(
    services: BTreeMap<String, ServiceHealth>,
    uptime: Duration,
    websocket_connections: usize,
) -> GatewayHealth {
    let healthy = services.values().all(ServiceHealth::is_healthy);
    GatewayHealth {
        status: if healthy { STATUS_HEALTHY } else { STATUS_UNHEALTHY }.to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: uptime.as_secs(),
        services,
        websocket_connections,
    }
}

/// GET the backend's health endpoint, bounded by `deadline`.
pub async fn probe_backend(client: &HttpClient, backend: &Backend, deadline: Duration) -> ServiceHealth {
    let started = Instant::now();
    let outcome = probe_once(client, backend, deadline).await;
    let latency_ms = started.elapsed().as_millis() as u64;

    let healthy = outcome.is_ok();
    if let Err(reason) = &outcome {
        tracing::warn!(service = %backend.name, error = %reason, "Health check failed");
    }
    metrics::record_backend_health(&backend.name, healthy);

    ServiceHealth {
        name: backend.name.clone(),
        url: backend.url().to_string(),
        status: if healthy { STATUS_HEALTHY } else { STATUS_UNHEALTHY }.to_string(),
        latency_ms,
        last_check: Utc::now(),
        error: outcome.err(),
    }
}

async fn probe_once(client: &HttpClient, backend: &Backend, deadline: Duration) -> Result<(), String> {
    let uri = backend.health_uri().map_err(|e| format!("invalid health URI: {}", e))?;
    let request = Request::get(uri)
        .header("user-agent", "api-gateway-health-check")
        .body(Body::empty())
        .map_err(|e| e.to_string())?;

    match time::timeout(deadline, client.request(request)).await {
        Ok(Ok(response)) if response.status() == StatusCode::OK => Ok(()),
        Ok(Ok(response)) => Err(format!("Service returned status {}", response.status().as_u16())),
        Ok(Err(e)) => Err(format!("Service unreachable: {}", e)),
        Err(_) => Err(format!("Health check timed out after {:?}", deadline)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(name: &str, healthy: bool) -> ServiceHealth {
        ServiceHealth {
            name: name.to_string(),
            url: format!("http://{}:8080", name),
            status: if healthy { STATUS_HEALTHY } else { STATUS_UNHEALTHY }.to_string(),
            latency_ms: 1,
            last_check: Utc::now(),
            error: (!healthy).then(|| "Service returned status 500".to_string()),
        }
    }

    #[test]
    fn test_aggregate_all_healthy() {
        let mut services = BTreeMap::new();
        services.insert("a".to_string(), service("a", true));
        services.insert("b".to_string(), service("b", true));

        let report = aggregate(services, Duration::from_secs(42), 3);
        assert!(report.is_healthy());
        assert_eq!(report.uptime_secs, 42);
        assert_eq!(report.websocket_connections, 3);
    }

    #[test]
    fn test_one_unhealthy_service_fails_gateway() {
        let mut services = BTreeMap::new();
        services.insert("a".to_string(), service("a", true));
        services.insert("b".to_string(), service("b", false));

        let report = aggregate(services, Duration::ZERO, 0);
        assert_eq!(report.status, STATUS_UNHEALTHY);
    }

    #[test]
    fn test_no_services_is_healthy() {
        let report = aggregate(BTreeMap::new(), Duration::ZERO, 0);
        assert!(report.is_healthy());
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["services"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_error_field_omitted_when_healthy() {
        let json = serde_json::to_value(service("a", true)).unwrap();
        assert!(json.get("error").is_none());
        let json = serde_json::to_value(service("b", false)).unwrap();
        assert_eq!(json["error"], "Service returned status 500");
    }
}
