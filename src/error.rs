//! Gateway error taxonomy.
//!
//! Every synchronous failure the gateway produces is a [`GatewayError`]. It is
//! paired with the request id as an [`ErrorResponse`] at the boundary, which
//! renders the standard envelope. Internal detail strings are logged and never
//! serialized.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::{ApiError, Envelope};

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Request body failed a field rule; `code` is the field-specific error code.
    #[error("validation failed ({code}): {message}")]
    Validation { code: &'static str, message: String },

    #[error("bad request: {0}")]
    BadRequest(String),

    /// Carries the internal reason; callers only ever see a generic message.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("rate limit exceeded (tier {tier})")]
    RateLimited { tier: &'static str, retry_after_secs: u64 },

    #[error("too many connections: {0}")]
    TooManyConnections(String),

    #[error("bad gateway ({service}): {detail}")]
    BadGateway { service: String, detail: String },

    #[error("service unavailable ({service}): {detail}")]
    ServiceUnavailable { service: String, detail: String },

    #[error("gateway timeout ({service}): {detail}")]
    GatewayTimeout { service: String, detail: String },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Validation { .. } | GatewayError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::RateLimited { .. } | GatewayError::TooManyConnections(_) => {
                StatusCode::TOO_MANY_REQUESTS
            }
            GatewayError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::GatewayTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::Validation { code, .. } => *code,
            GatewayError::BadRequest(_) => "BAD_REQUEST",
            GatewayError::Unauthorized(_) => "UNAUTHORIZED",
            GatewayError::NotFound(_) => "NOT_FOUND",
            GatewayError::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            GatewayError::RateLimited { .. } | GatewayError::TooManyConnections(_) => {
                "RATE_LIMIT_EXCEEDED"
            }
            GatewayError::BadGateway { .. } => "BAD_GATEWAY",
            GatewayError::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            GatewayError::GatewayTimeout { .. } => "GATEWAY_TIMEOUT",
            GatewayError::Internal(_) => "INTERNAL_ERROR",
            GatewayError::NotImplemented(_) => "NOT_IMPLEMENTED",
        }
    }

    /// Message safe to show the caller.
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::Validation { message, .. } => message.clone(),
            GatewayError::BadRequest(msg) => msg.clone(),
            GatewayError::Unauthorized(_) => "Invalid or missing credentials".to_string(),
            GatewayError::NotFound(msg) => msg.clone(),
            GatewayError::MethodNotAllowed => "Method not allowed".to_string(),
            GatewayError::RateLimited { .. } => "Rate limit exceeded".to_string(),
            GatewayError::TooManyConnections(_) => "Too many connections".to_string(),
            GatewayError::BadGateway { .. } => "Upstream service error".to_string(),
            GatewayError::ServiceUnavailable { .. } => "Service temporarily unavailable".to_string(),
            GatewayError::GatewayTimeout { .. } => "Upstream service timed out".to_string(),
            GatewayError::Internal(_) => "Internal server error".to_string(),
            GatewayError::NotImplemented(msg) => msg.clone(),
        }
    }

    pub fn to_api_error(&self) -> ApiError {
        ApiError::new(self.error_code(), self.user_message())
    }

    /// Pair with the request id so the envelope can be rendered.
    pub fn with_request_id(self, request_id: impl Into<String>) -> ErrorResponse {
        ErrorResponse {
            error: self,
            request_id: request_id.into(),
        }
    }

    fn log(&self, request_id: &str) {
        let status = self.status_code().as_u16();
        let code = self.error_code();
        if self.status_code().is_server_error() {
            tracing::error!(request_id = %request_id, error = %self, error_code = code, status, "Request failed");
        } else if matches!(self, GatewayError::Unauthorized(_)) {
            tracing::warn!(request_id = %request_id, error = %self, error_code = code, "Authentication failed");
        } else {
            tracing::debug!(request_id = %request_id, error = %self, error_code = code, status, "Client error");
        }
    }
}

/// A [`GatewayError`] bound to the request it occurred in.
#[derive(Debug)]
pub struct ErrorResponse {
    pub error: GatewayError,
    pub request_id: String,
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        self.error.log(&self.request_id);

        let status = self.error.status_code();
        let envelope: Envelope<()> = Envelope::err(self.error.to_api_error(), self.request_id);
        let mut response = (status, Json(envelope)).into_response();

        if let GatewayError::RateLimited { retry_after_secs, .. } = self.error {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let unavailable = GatewayError::ServiceUnavailable {
            service: "pulse".into(),
            detail: "connection refused".into(),
        };
        let timeout = GatewayError::GatewayTimeout {
            service: "pulse".into(),
            detail: "deadline elapsed".into(),
        };
        assert_eq!(unavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            GatewayError::NotImplemented("x".into()).status_code(),
            StatusCode::NOT_IMPLEMENTED
        );
        let validation = GatewayError::Validation {
            code: "INVALID_EMAIL",
            message: "Email must be 5-100 characters long".into(),
        };
        assert_eq!(validation.error_code(), "INVALID_EMAIL");
    }

    #[test]
    fn test_internal_detail_not_exposed() {
        let err = GatewayError::BadGateway {
            service: "pulse".into(),
            detail: "connection reset by peer at 10.0.0.7".into(),
        };
        let api = err.to_api_error();
        assert_eq!(api.code, "BAD_GATEWAY");
        assert!(!api.message.contains("10.0.0.7"));

        let unauthorized = GatewayError::Unauthorized("signature mismatch".into());
        assert!(!unauthorized.user_message().contains("signature"));
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = GatewayError::RateLimited {
            tier: "global",
            retry_after_secs: 3,
        }
        .with_request_id("req-9")
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "3");
    }
}
