//! Hierarchical token-bucket rate limiting.
//!
//! # Responsibilities
//! - Global bucket consulted first for every request
//! - Per-user bucket for authenticated callers, per-IP bucket otherwise
//! - Whitelisted client IPs skip all tiers
//! - Reclaim idle buckets with a single periodic sweep
//!
//! # Design Decisions
//! - Admission control only: a request is admitted or rejected, never delayed
//! - Buckets are created lazily with a double-checked lookup under the write
//!   lock, so concurrent first access to a key yields exactly one bucket
//! - `X-RateLimit-Remaining` is a snapshot and may lag concurrent consumers

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time;

use crate::auth::AuthGuard;
use crate::config::{RateLimitConfig, RateLimitRule};
use crate::error::GatewayError;
use crate::http::context::RequestContext;
use crate::observability::metrics;

/// Outcome of a single bucket acquisition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Allowed { remaining: u32 },
    Denied { retry_after: Duration },
}

/// A token bucket with continuous refill.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    tokens: f64,
    last_refill: Instant,
    last_used: Instant,
}

impl TokenBucket {
    pub fn new(rule: RateLimitRule) -> Self {
        let now = Instant::now();
        Self {
            capacity: rule.burst as f64,
            refill_per_sec: rule.requests_per_minute as f64 / 60.0,
            tokens: rule.burst as f64,
            last_refill: now,
            last_used: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Consume one token if available. Never blocks.
    pub fn try_acquire(&mut self) -> Decision {
        let now = Instant::now();
        self.refill(now);
        self.last_used = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Decision::Allowed {
                remaining: self.tokens.floor() as u32,
            }
        } else {
            Decision::Denied {
                retry_after: self.time_until(1.0),
            }
        }
    }

    /// Time until the bucket holds `target` tokens.
    fn time_until(&self, target: f64) -> Duration {
        let missing = (target - self.tokens).max(0.0);
        if missing == 0.0 {
            return Duration::ZERO;
        }
        if self.refill_per_sec <= 0.0 {
            return Duration::from_secs(60);
        }
        Duration::from_secs_f64(missing / self.refill_per_sec)
    }

    pub fn time_until_full(&self) -> Duration {
        self.time_until(self.capacity)
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_used)
    }
}

/// Header values attached to admitted and rejected responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub limit: u32,
    pub remaining: u32,
    pub reset_unix: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitOutcome {
    /// Limiting disabled or the client is whitelisted.
    Skipped,
    Allowed(RateLimitInfo),
    Denied {
        tier: &'static str,
        retry_after_secs: u64,
        info: RateLimitInfo,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterStats {
    pub enabled: bool,
    pub active_buckets: usize,
    pub global_tokens: f64,
}

pub struct RateLimiter {
    config: RateLimitConfig,
    global: Mutex<TokenBucket>,
    buckets: RwLock<HashMap<String, Arc<Mutex<TokenBucket>>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            global: Mutex::new(TokenBucket::new(config.global)),
            buckets: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Whitelist lookup. Callers pass the socket peer address when they have
    /// one, since forwarding headers are client-controlled.
    pub fn is_whitelisted(&self, ip: &str) -> bool {
        self.config.whitelist_ips.iter().any(|allowed| allowed == ip)
    }

    /// Evaluate the tiers for one request. `user_id` is set for authenticated callers.
    pub fn check(&self, user_id: Option<i64>, client_ip: &str) -> RateLimitOutcome {
        if !self.config.enabled {
            return RateLimitOutcome::Skipped;
        }

        {
            let mut global = self.global.lock().expect("rate limiter mutex poisoned");
            if let Decision::Denied { retry_after } = global.try_acquire() {
                return RateLimitOutcome::Denied {
                    tier: "global",
                    retry_after_secs: retry_after_secs(retry_after),
                    info: info_for(&global, self.config.global, 0),
                };
            }
        }

        let (key, rule, tier) = match user_id {
            Some(id) if id > 0 => (format!("user:{}", id), self.config.per_user, "user"),
            _ => (format!("ip:{}", client_ip), self.config.anonymous, "ip"),
        };

        let bucket = self.bucket_for(&key, rule);
        let mut bucket = bucket.lock().expect("rate limiter mutex poisoned");
        match bucket.try_acquire() {
            Decision::Allowed { remaining } => {
                RateLimitOutcome::Allowed(info_for(&bucket, rule, remaining))
            }
            Decision::Denied { retry_after } => RateLimitOutcome::Denied {
                tier,
                retry_after_secs: retry_after_secs(retry_after),
                info: info_for(&bucket, rule, 0),
            },
        }
    }

    fn bucket_for(&self, key: &str, rule: RateLimitRule) -> Arc<Mutex<TokenBucket>> {
        {
            let buckets = self.buckets.read().expect("rate limiter lock poisoned");
            if let Some(bucket) = buckets.get(key) {
                return Arc::clone(bucket);
            }
        }

        let mut buckets = self.buckets.write().expect("rate limiter lock poisoned");
        // Another request may have created it between the two locks.
        Arc::clone(
            buckets
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(TokenBucket::new(rule)))),
        )
    }

    /// Remove buckets idle for longer than the configured TTL. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_older_than(self.config.idle_ttl())
    }

    fn sweep_older_than(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut buckets = self.buckets.write().expect("rate limiter lock poisoned");
        let before = buckets.len();
        buckets.retain(|_, bucket| {
            bucket
                .lock()
                .expect("rate limiter mutex poisoned")
                .idle_for(now)
                < ttl
        });
        let removed = before - buckets.len();
        metrics::set_rate_limit_buckets(buckets.len());
        removed
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.read().expect("rate limiter lock poisoned").len()
    }

    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            enabled: self.config.enabled,
            active_buckets: self.bucket_count(),
            global_tokens: self.global.lock().expect("rate limiter mutex poisoned").tokens(),
        }
    }

    /// Periodic reclamation loop; one task for the whole key-space.
    pub async fn run_sweeper(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            return;
        }

        let mut ticker = time::interval(self.config.sweep_interval());
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.sweep();
                    if removed > 0 {
                        tracing::debug!(removed, remaining = self.bucket_count(), "Reclaimed idle rate limit buckets");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Rate limit sweeper stopping");
                    break;
                }
            }
        }
    }
}

fn retry_after_secs(wait: Duration) -> u64 {
    wait.as_secs_f64().ceil().max(1.0) as u64
}

fn info_for(bucket: &TokenBucket, rule: RateLimitRule, remaining: u32) -> RateLimitInfo {
    let until_full = chrono::Duration::from_std(bucket.time_until_full())
        .unwrap_or_else(|_| chrono::Duration::zero());
    let reset = chrono::Utc::now() + until_full;
    RateLimitInfo {
        limit: rule.requests_per_minute,
        remaining,
        reset_unix: reset.timestamp(),
    }
}

fn set_limit_headers(headers: &mut HeaderMap, info: &RateLimitInfo) {
    headers.insert("x-ratelimit-limit", HeaderValue::from(info.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(info.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(info.reset_unix));
}

/// State for the rate limiting middleware.
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RateLimiter>,
    pub auth: Arc<AuthGuard>,
}

/// Middleware function for hierarchical rate limiting.
///
/// Runs ahead of the auth layer, so a valid bearer token is resolved here
/// to pick the per-user tier. The resolved caller is stashed in the request
/// extensions for the auth layer to reuse; an invalid token just means the
/// per-IP tier.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if !state.limiter.is_enabled() {
        return next.run(request).await;
    }

    let ctx = RequestContext::of(&request);
    if state.limiter.is_whitelisted(ctx.peer_ip.as_deref().unwrap_or(&ctx.client_ip)) {
        return next.run(request).await;
    }
    let caller = state.auth.identify(request.headers());

    match state.limiter.check(caller.as_ref().map(|c| c.user_id), &ctx.client_ip) {
        RateLimitOutcome::Skipped => next.run(request).await,
        RateLimitOutcome::Allowed(info) => {
            if let Some(caller) = caller {
                request.extensions_mut().insert(caller);
            }
            let mut response = next.run(request).await;
            set_limit_headers(response.headers_mut(), &info);
            response
        }
        RateLimitOutcome::Denied {
            tier,
            retry_after_secs,
            info,
        } => {
            tracing::warn!(
                request_id = %ctx.request_id,
                tier,
                client_ip = %ctx.client_ip,
                user_id = caller.as_ref().map(|c| c.user_id).unwrap_or(0),
                path = %ctx.path,
                method = %ctx.method,
                "Rate limit exceeded"
            );
            metrics::record_rate_limited(tier);

            let mut response = ctx
                .error(GatewayError::RateLimited {
                    tier,
                    retry_after_secs,
                })
                .into_response();
            set_limit_headers(response.headers_mut(), &info);
            response
        }
    }
}
