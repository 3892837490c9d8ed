//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! Authorization: Bearer <token>
//!     → guard.rs (signature, algorithm, claim set, expiry)
//!     → middleware.rs (public bypass, 401 on failure, attach Caller)
//!     → protected handler / proxy
//!
//! POST /api/auth/refresh
//!     → handlers.rs → guard.rs (verify refresh, mint new pair)
//! ```

pub mod claims;
pub mod guard;
pub mod handlers;
pub mod middleware;

pub use claims::{Claims, RefreshClaims};
pub use guard::{bearer_token, AuthError, AuthGuard, IssuedToken, TokenPair};
pub use middleware::auth_middleware;
