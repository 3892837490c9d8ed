//! `/api/auth/*` handlers.
//!
//! Credential storage lives outside the gateway, so login and register only
//! validate their input and answer 501. Refresh is fully served here.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{ErrorResponse, GatewayError};
use crate::http::context::RequestContext;
use crate::http::server::AppState;
use crate::models::Envelope;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: AuthUser,
}

fn check_len(value: &str, min: usize, max: usize, code: &'static str, field: &str) -> Result<(), GatewayError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(GatewayError::Validation {
            code,
            message: format!("{} must be {}-{} characters long", field, min, max),
        });
    }
    Ok(())
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), GatewayError> {
        check_len(&self.username, 3, 50, "INVALID_USERNAME", "Username")?;
        check_len(&self.password, 6, 100, "INVALID_PASSWORD", "Password")
    }
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), GatewayError> {
        check_len(&self.username, 3, 50, "INVALID_USERNAME", "Username")?;
        check_len(&self.email, 5, 100, "INVALID_EMAIL", "Email")?;
        check_len(&self.password, 6, 100, "INVALID_PASSWORD", "Password")
    }
}

impl RefreshRequest {
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.refresh_token.is_empty() {
            return Err(GatewayError::Validation {
                code: "MISSING_REFRESH_TOKEN",
                message: "Refresh token is required".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_json<T: DeserializeOwned>(ctx: &RequestContext, body: &Bytes) -> Result<T, ErrorResponse> {
    serde_json::from_slice(body)
        .map_err(|_| ctx.error(GatewayError::BadRequest("Invalid JSON".to_string())))
}

pub async fn login(
    Extension(ctx): Extension<RequestContext>,
    body: Bytes,
) -> Result<Response, ErrorResponse> {
    let request: LoginRequest = parse_json(&ctx, &body)?;
    request.validate().map_err(|e| ctx.error(e))?;

    Err(ctx.error(GatewayError::NotImplemented(
        "Authentication service not implemented".to_string(),
    )))
}

pub async fn register(
    Extension(ctx): Extension<RequestContext>,
    body: Bytes,
) -> Result<Response, ErrorResponse> {
    let request: RegisterRequest = parse_json(&ctx, &body)?;
    request.validate().map_err(|e| ctx.error(e))?;

    Err(ctx.error(GatewayError::NotImplemented(
        "Registration service not implemented".to_string(),
    )))
}

pub async fn refresh(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    body: Bytes,
) -> Result<Response, ErrorResponse> {
    let request: RefreshRequest = parse_json(&ctx, &body)?;
    request.validate().map_err(|e| ctx.error(e))?;

    let pair = state
        .auth
        .refresh(&request.refresh_token)
        .map_err(|e| ctx.error(GatewayError::Unauthorized(e.to_string())))?;

    tracing::info!(request_id = %ctx.request_id, user_id = pair.user_id, "Token refreshed");

    let response = AuthResponse {
        access_token: pair.access.token,
        refresh_token: pair.refresh.token,
        expires_at: pair.access.expires_at,
        user: AuthUser { id: pair.user_id },
    };
    Ok((StatusCode::OK, Json(Envelope::ok(response, ctx.request_id))).into_response())
}
