// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Murmur

//! Per-source abuse throttling.
//!
//! Every request is categorized by its target operation and charged against
//! a token bucket held per source address and category. Buckets start full
//! at their burst capacity and refill continuously at the category rate; a
//! request that finds no token is answered with `429` and a `Retry-After`
//! derived from the refill interval.
//!
//! The visitor map is guarded by one mutex held only for entry
//! lookup/creation; the consume decision runs on the bucket's own lock. A
//! periodic sweep evicts sources idle for more than 15 minutes, bounding
//! memory under traffic from many distinct addresses.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio_util::sync::CancellationToken;

use crate::error::ApiError;

/// How often the idle-visitor sweep runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Inactivity threshold after which a visitor entry is dropped.
const IDLE_EVICTION: Duration = Duration::from_secs(15 * 60);

/// Operation category a request is charged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Unlimited: health checks
    Exempt,
    /// Credential issuance: login, register, refresh
    Auth,
    /// Content-creating operations
    Write,
    /// Everything else
    Read,
}

/// Refill rate and burst capacity for a category.
#[derive(Debug, Clone, Copy)]
struct Quota {
    per_minute: u32,
    burst: u32,
}

impl Category {
    /// Classify a request by method and path.
    pub fn of(method: &Method, path: &str) -> Self {
        if path == "/health" {
            Category::Exempt
        } else if path.starts_with("/api/v1/auth/") {
            Category::Auth
        } else if method == Method::POST && path.starts_with("/api/v1/posts") {
            Category::Write
        } else {
            Category::Read
        }
    }

    fn quota(&self) -> Option<Quota> {
        match self {
            Category::Exempt => None,
            Category::Auth => Some(Quota {
                per_minute: 10,
                burst: 5,
            }),
            Category::Write => Some(Quota {
                per_minute: 30,
                burst: 10,
            }),
            Category::Read => Some(Quota {
                per_minute: 120,
                burst: 30,
            }),
        }
    }
}

/// Token bucket: starts at burst capacity, refills continuously, never
/// exceeds the burst and never goes negative.
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    rate_per_sec: f64,
    burst: f64,
}

impl TokenBucket {
    fn new(quota: Quota) -> Self {
        Self {
            tokens: quota.burst as f64,
            last_refill: Instant::now(),
            rate_per_sec: quota.per_minute as f64 / 60.0,
            burst: quota.burst as f64,
        }
    }

    fn allow(&mut self, now: Instant) -> bool {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate_per_sec).min(self.burst);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Seconds until one token refills, rounded up, at least 1.
    fn retry_after_secs(&self) -> u64 {
        (1.0 / self.rate_per_sec).ceil().max(1.0) as u64
    }
}

struct Visitor {
    last_seen: Instant,
    buckets: HashMap<Category, Arc<Mutex<TokenBucket>>>,
}

/// Per-source, per-category rate limiter.
pub struct RateLimiter {
    visitors: Mutex<HashMap<String, Visitor>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            visitors: Mutex::new(HashMap::new()),
        }
    }

    /// Charge one token for `source` in `category`.
    ///
    /// Returns `Err(retry_after_secs)` when the bucket is exhausted.
    pub fn check(&self, source: &str, category: Category) -> Result<(), u64> {
        let Some(quota) = category.quota() else {
            return Ok(());
        };

        // Lock scope: entry lookup/creation only.
        let bucket = {
            let mut visitors = self
                .visitors
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let visitor = visitors.entry(source.to_string()).or_insert_with(|| Visitor {
                last_seen: Instant::now(),
                buckets: HashMap::new(),
            });
            visitor.last_seen = Instant::now();
            visitor
                .buckets
                .entry(category)
                .or_insert_with(|| Arc::new(Mutex::new(TokenBucket::new(quota))))
                .clone()
        };

        let mut bucket = bucket.lock().unwrap_or_else(PoisonError::into_inner);
        if bucket.allow(Instant::now()) {
            Ok(())
        } else {
            Err(bucket.retry_after_secs())
        }
    }

    /// Drop every visitor idle for longer than `idle_for`. Returns the
    /// number evicted.
    pub fn evict_idle(&self, idle_for: Duration) -> usize {
        let mut visitors = self
            .visitors
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = visitors.len();
        visitors.retain(|_, visitor| visitor.last_seen.elapsed() <= idle_for);
        before - visitors.len()
    }

    /// Periodic idle-visitor sweep; runs until the token is cancelled.
    pub async fn run_sweeper(self: Arc<Self>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(SWEEP_INTERVAL) => {}
                _ = shutdown.cancelled() => {
                    tracing::info!("rate limiter sweep shutting down");
                    return;
                }
            }

            let evicted = self.evict_idle(IDLE_EVICTION);
            if evicted > 0 {
                tracing::debug!(evicted, "evicted idle rate-limit visitors");
            }
        }
    }

    /// Backdate a visitor's `last_seen`, as if it had been idle.
    #[cfg(test)]
    fn age_visitor(&self, source: &str, by: Duration) {
        let mut visitors = self
            .visitors
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(visitor) = visitors.get_mut(source) {
            if let Some(aged) = Instant::now().checked_sub(by) {
                visitor.last_seen = aged;
            }
        }
    }
}

/// Axum middleware enforcing the throttle in front of every route.
pub async fn throttle(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let category = Category::of(request.method(), request.uri().path());
    if category == Category::Exempt {
        return next.run(request).await;
    }

    let source = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    match limiter.check(&source, category) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            tracing::debug!(%source, ?category, retry_after, "request rate limited");
            ApiError::rate_limited(retry_after).into_response()
        }
    }
}
