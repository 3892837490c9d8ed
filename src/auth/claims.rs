//! Token claim sets.

use serde::{Deserialize, Serialize};

use crate::http::context::Caller;

/// Marker carried in the `type` claim of refresh tokens.
pub const REFRESH_KIND: &str = "refresh";

/// Claims of an access token. Every field is required; a token missing any of
/// them fails to decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

impl From<&Claims> for Caller {
    fn from(claims: &Claims) -> Self {
        Caller {
            user_id: claims.user_id,
            username: claims.username.clone(),
            email: claims.email.clone(),
        }
    }
}

/// Claims of a refresh token. Carries only the caller id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub user_id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub iat: i64,
    pub exp: i64,
}
