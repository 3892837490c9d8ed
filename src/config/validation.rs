//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing services)
//! - Validate value ranges (timeouts > 0, limits > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{GatewayConfig, RateLimitRule};

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("invalid socket address '{}'", config.server.bind_address),
        ));
    }

    let mut names = HashSet::new();
    for (i, service) in config.services.iter().enumerate() {
        let field = format!("services[{}]", i);
        if service.name.is_empty() {
            errors.push(ValidationError::new(&field, "name is required"));
        } else if !names.insert(service.name.as_str()) {
            errors.push(ValidationError::new(
                &field,
                format!("duplicate service name '{}'", service.name),
            ));
        }
        match Url::parse(&service.url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => errors.push(ValidationError::new(
                format!("{}.url", field),
                format!("unsupported scheme '{}'", url.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new(
                format!("{}.url", field),
                format!("invalid URL '{}': {}", service.url, e),
            )),
        }
        if service.timeout_ms == 0 {
            errors.push(ValidationError::new(format!("{}.timeout_ms", field), "must be positive"));
        }
    }

    for (i, route) in config.routes.iter().enumerate() {
        if !route.path_prefix.starts_with('/') {
            errors.push(ValidationError::new(
                format!("routes[{}].path_prefix", i),
                "must start with '/'",
            ));
        }
        if !names.contains(route.service.as_str()) {
            errors.push(ValidationError::new(
                format!("routes[{}].service", i),
                format!("unknown service '{}'", route.service),
            ));
        }
    }

    if config.auth.enabled && config.auth.jwt_secret.is_empty() {
        errors.push(ValidationError::new(
            "auth.jwt_secret",
            "required when auth is enabled",
        ));
    }
    if config.auth.jwt_expiration_hours == 0 {
        errors.push(ValidationError::new("auth.jwt_expiration_hours", "must be positive"));
    }
    if config.auth.jwt_refresh_expiration_hours == 0 {
        errors.push(ValidationError::new(
            "auth.jwt_refresh_expiration_hours",
            "must be positive",
        ));
    }

    if config.rate_limit.enabled {
        let rules = [
            ("rate_limit.global", config.rate_limit.global),
            ("rate_limit.per_user", config.rate_limit.per_user),
            ("rate_limit.anonymous", config.rate_limit.anonymous),
        ];
        for (field, rule) in rules {
            check_rule(field, rule, &mut errors);
        }
        if config.rate_limit.sweep_interval_secs == 0 {
            errors.push(ValidationError::new(
                "rate_limit.sweep_interval_secs",
                "must be positive",
            ));
        }
    }

    let ws = &config.websocket;
    if ws.enabled {
        if !ws.path.starts_with('/') {
            errors.push(ValidationError::new("websocket.path", "must start with '/'"));
        }
        if ws.max_connections == 0 || ws.max_connections_per_user == 0 {
            errors.push(ValidationError::new(
                "websocket.max_connections",
                "connection limits must be positive",
            ));
        }
        if ws.send_queue_size == 0 {
            errors.push(ValidationError::new("websocket.send_queue_size", "must be positive"));
        }
        if ws.ping_period_ms == 0 || ws.pong_wait_ms <= ws.ping_period_ms {
            errors.push(ValidationError::new(
                "websocket.pong_wait_ms",
                "must be greater than a positive ping_period_ms",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_rule(field: &str, rule: RateLimitRule, errors: &mut Vec<ValidationError>) {
    if rule.requests_per_minute == 0 || rule.burst == 0 {
        errors.push(ValidationError::new(
            field,
            "requests_per_minute and burst must be positive",
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{RouteConfig, ServiceConfig};

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = GatewayConfig::default();
        config.server.bind_address = "not-an-address".into();
        config.services.push(ServiceConfig::new("pulse", "ftp://pulse"));
        config.routes.push(RouteConfig::new("/api/x", "missing"));
        config.auth.enabled = true;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"server.bind_address"));
        assert!(fields.contains(&"services[0].url"));
        assert!(fields.contains(&"routes[0].service"));
        assert!(fields.contains(&"auth.jwt_secret"));
    }

    #[test]
    fn test_duplicate_service_names_rejected() {
        let mut config = GatewayConfig::default();
        config.services.push(ServiceConfig::new("pulse", "http://a:1"));
        config.services.push(ServiceConfig::new("pulse", "http://b:2"));

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("duplicate"));
    }

    #[test]
    fn test_pong_wait_must_exceed_ping_period() {
        let mut config = GatewayConfig::default();
        config.websocket.pong_wait_ms = config.websocket.ping_period_ms;
        assert!(validate_config(&config).is_err());
    }
}
