//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{default_routes, GatewayConfig, ServiceConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, apply environment overrides, and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: GatewayConfig = toml::from_str(&content)?;
    finalize(config, |key| std::env::var(key).ok())
}

/// Validate a configuration built without a file (defaults plus environment).
pub fn load_from_env() -> Result<GatewayConfig, ConfigError> {
    finalize(GatewayConfig::default(), |key| std::env::var(key).ok())
}

fn finalize<F>(mut config: GatewayConfig, env: F) -> Result<GatewayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    apply_env_overrides(&mut config, env);
    if config.routes.is_empty() {
        config.routes = default_routes()
            .into_iter()
            .filter(|r| config.service(&r.service).is_some())
            .collect();
    }
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Override selected values from the environment.
///
/// `env` is injected so overrides can be exercised without touching the
/// process environment.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    let host = env("APP_HOST");
    let port = env("APP_PORT").and_then(|p| p.parse::<u16>().ok());
    if host.is_some() || port.is_some() {
        let (current_host, current_port) = config
            .server
            .bind_address
            .rsplit_once(':')
            .map(|(h, p)| (h.to_string(), p.to_string()))
            .unwrap_or_else(|| ("0.0.0.0".to_string(), "8080".to_string()));
        let host = host.unwrap_or(current_host);
        let port = port.map(|p| p.to_string()).unwrap_or(current_port);
        config.server.bind_address = format!("{}:{}", host, port);
    }

    for (var, name) in [
        ("NEWS_PARSING_SERVICE_URL", "news-parsing"),
        ("NEWS_MANAGEMENT_SERVICE_URL", "news-management"),
        ("PULSE_SERVICE_URL", "pulse"),
    ] {
        if let Some(url) = env(var).filter(|v| !v.is_empty()) {
            match config.services.iter_mut().find(|s| s.name == name) {
                Some(service) => service.url = url,
                None => config.services.push(ServiceConfig::new(name, url)),
            }
        }
    }

    if let Some(secret) = env("JWT_SECRET").filter(|v| !v.is_empty()) {
        config.auth.jwt_secret = secret;
    }
    if let Some(v) = env("AUTH_ENABLED") {
        config.auth.enabled = v == "true";
    }
    if let Some(v) = env("RATE_LIMITING_ENABLED") {
        config.rate_limit.enabled = v == "true";
    }
    if let Some(v) = env("CORS_ENABLED") {
        config.cors.enabled = v == "true";
    }
    if let Some(v) = env("WEBSOCKET_ENABLED") {
        config.websocket.enabled = v == "true";
    }
    if let Some(level) = env("LOG_LEVEL").filter(|v| !v.is_empty()) {
        config.logging.level = level;
    }
    if let Some(format) = env("LOG_FORMAT").filter(|v| !v.is_empty()) {
        config.logging.format = format;
    }
}
