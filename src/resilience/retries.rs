//! Retry logic.
//!
//! # Responsibilities
//! - Determine if a request is retryable (idempotent methods only)
//! - Compute exponential backoff with jitter between attempts
//!
//! # Design Decisions
//! - Only connection failures are retried; the request never reached the backend
//! - Never retry POST/PATCH (non-idempotent)
//! - Jittered backoff prevents thundering herd

use axum::http::Method;
use rand::Rng;
use std::time::Duration;

const BASE_DELAY: Duration = Duration::from_millis(50);
const MAX_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: BASE_DELAY,
            max_delay: MAX_DELAY,
        }
    }

    /// Attempts allowed for `method`, counting the first.
    pub fn attempts_for(&self, method: &Method) -> u32 {
        if is_retryable_method(method) {
            1 + self.max_retries
        } else {
            1
        }
    }

    /// Delay before retry number `retry` (1-based): base * 2^(retry-1), capped,
    /// plus up to 10% jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(retry - 1);
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);

        let jitter_ms = delay.as_millis() as u64 / 10;
        let jitter = if jitter_ms > 0 {
            rand::thread_rng().gen_range(0..jitter_ms)
        } else {
            0
        };
        delay + Duration::from_millis(jitter)
    }
}

pub fn is_retryable_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::PUT | Method::DELETE
    )
}
