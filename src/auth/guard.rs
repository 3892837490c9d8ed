//! JWT verification and issuance.
//!
//! # Responsibilities
//! - Verify HMAC-signed access and refresh tokens
//! - Issue access/refresh token pairs
//! - Decide public-route bypass
//!
//! # Design Decisions
//! - Only the HS256/HS384/HS512 family is accepted
//! - Zero leeway; a token whose `exp` is not strictly in the future is rejected
//! - Rejection reasons are typed for logging; callers only ever see a generic 401
//! - No revocation store: a refresh token stays valid until its own expiry

use axum::http::{header, HeaderMap};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::auth::claims::{Claims, RefreshClaims, REFRESH_KIND};
use crate::config::AuthConfig;
use crate::http::context::Caller;
use crate::routing::{compile_pattern, Matcher};

/// Internal verification failure reasons.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("malformed authorization header")]
    MalformedHeader,

    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("token expired")]
    Expired,

    #[error("invalid claims: {0}")]
    InvalidClaims(&'static str),

    #[error("wrong token kind")]
    WrongTokenKind,

    #[error("token signing failed: {0}")]
    Signing(jsonwebtoken::errors::Error),
}

/// A signed token with its expiry.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Access and refresh tokens minted together.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub user_id: i64,
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

pub struct AuthGuard {
    enabled: bool,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: chrono::Duration,
    refresh_ttl: chrono::Duration,
    public_routes: Vec<Box<dyn Matcher>>,
}

impl AuthGuard {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let secret = config.jwt_secret.as_bytes();
        Self {
            enabled: config.enabled,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            access_ttl: chrono::Duration::hours(config.jwt_expiration_hours as i64),
            refresh_ttl: chrono::Duration::hours(config.jwt_refresh_expiration_hours as i64),
            public_routes: config
                .public_routes
                .iter()
                .map(|p| compile_pattern(p))
                .collect(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public_routes.iter().any(|m| m.matches(path))
    }

    /// Verify an access token.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let claims: Claims = self.decode_checked(token)?;
        check_expiry(claims.exp)?;
        if claims.user_id <= 0 {
            return Err(AuthError::InvalidClaims("user_id"));
        }
        Ok(claims)
    }

    /// Verify a refresh token and return the caller id it is bound to.
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        let claims: RefreshClaims = self.decode_checked(token)?;
        check_expiry(claims.exp)?;
        if claims.kind != REFRESH_KIND {
            return Err(AuthError::WrongTokenKind);
        }
        if claims.user_id <= 0 {
            return Err(AuthError::InvalidClaims("user_id"));
        }
        Ok(claims)
    }

    pub fn issue(&self, caller: &Caller) -> Result<IssuedToken, AuthError> {
        let now = Utc::now();
        let expires_at = now + self.access_ttl;
        let claims = Claims {
            user_id: caller.user_id,
            username: caller.username.clone(),
            email: caller.email.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        self.sign(&claims, expires_at)
    }

    pub fn issue_refresh(&self, user_id: i64) -> Result<IssuedToken, AuthError> {
        let now = Utc::now();
        let expires_at = now + self.refresh_ttl;
        let claims = RefreshClaims {
            user_id,
            kind: REFRESH_KIND.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        self.sign(&claims, expires_at)
    }

    /// Exchange a refresh token for a new pair bound to the same caller id.
    ///
    /// The refresh token carries no username or email, so the new access
    /// token has them empty; it still verifies, bound only to the id.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.verify_refresh(refresh_token)?;
        let caller = Caller {
            user_id: claims.user_id,
            username: String::new(),
            email: String::new(),
        };
        Ok(TokenPair {
            user_id: claims.user_id,
            access: self.issue(&caller)?,
            refresh: self.issue_refresh(claims.user_id)?,
        })
    }

    /// Resolve the caller from an `Authorization` header without rejecting.
    pub fn identify(&self, headers: &HeaderMap) -> Option<Caller> {
        if !self.enabled {
            return None;
        }
        let token = bearer_token(headers).ok()?;
        self.verify(token).ok().map(|claims| Caller::from(&claims))
    }

    fn decode_checked<T: DeserializeOwned>(&self, token: &str) -> Result<T, AuthError> {
        Ok(decode::<T>(token, &self.decoding, &self.validation)?.claims)
    }

    fn sign<T: serde::Serialize>(
        &self,
        claims: &T,
        expires_at: DateTime<Utc>,
    ) -> Result<IssuedToken, AuthError> {
        let token = encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(AuthError::Signing)?;
        Ok(IssuedToken { token, expires_at })
    }
}

fn check_expiry(exp: i64) -> Result<(), AuthError> {
    if exp <= Utc::now().timestamp() {
        return Err(AuthError::Expired);
    }
    Ok(())
}

/// Extract the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader)?;

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(AuthError::MalformedHeader),
    }
}
