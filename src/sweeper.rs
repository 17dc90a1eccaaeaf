// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Murmur

//! Background cleanup of expired refresh credentials.
//!
//! Runs hourly as a tokio task. This is storage hygiene, not a security
//! control: consumed credentials are deleted at redemption and expired ones
//! are rejected on lookup regardless of whether the sweep has run. A failed
//! sweep is logged and retried on the next cycle, never surfaced to callers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::storage::RefreshTokenStore;

/// Default sweep cadence: hourly.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Periodic expired-credential sweeper.
pub struct TokenSweeper {
    tokens: Arc<dyn RefreshTokenStore>,
    interval: Duration,
}

impl TokenSweeper {
    pub fn new(tokens: Arc<dyn RefreshTokenStore>) -> Self {
        Self {
            tokens,
            interval: SWEEP_INTERVAL,
        }
    }

    /// Override the cadence, e.g. for tests.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run the sweep loop until the cancellation token is triggered.
    ///
    /// Spawn as a background task:
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(interval_secs = self.interval.as_secs(), "token sweeper starting");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.cancelled() => {
                    tracing::info!("token sweeper shutting down");
                    return;
                }
            }

            self.sweep();
        }
    }

    /// Execute one sweep pass.
    fn sweep(&self) {
        match self.tokens.delete_expired(Utc::now()) {
            Ok(0) => tracing::debug!("token sweep found nothing to delete"),
            Ok(deleted) => tracing::info!(deleted, "token sweep removed expired credentials"),
            Err(e) => tracing::warn!(error = %e, "token sweep failed, will retry next cycle"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn sweep_removes_only_expired_records() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        store.store_token("u1", "expired-1", now - ChronoDuration::hours(2)).unwrap();
        store.store_token("u1", "expired-2", now - ChronoDuration::minutes(1)).unwrap();
        store.store_token("u1", "valid", now + ChronoDuration::days(6)).unwrap();

        let sweeper = TokenSweeper::new(store.clone());
        sweeper.sweep();

        assert!(store.get_by_hash("expired-1").unwrap().is_none());
        assert!(store.get_by_hash("expired-2").unwrap().is_none());
        assert!(store.get_by_hash("valid").unwrap().is_some());
    }

    #[tokio::test]
    async fn run_loop_sweeps_and_stops_on_cancellation() {
        let store = Arc::new(MemoryStore::new());
        store
            .store_token("u1", "expired", Utc::now() - ChronoDuration::hours(1))
            .unwrap();

        let shutdown = CancellationToken::new();
        let sweeper = TokenSweeper::new(store.clone()).with_interval(Duration::from_millis(10));
        let handle = tokio::spawn(sweeper.run(shutdown.clone()));

        // wait for at least one pass
        for _ in 0..100 {
            if store.get_by_hash("expired").unwrap().is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(store.get_by_hash("expired").unwrap().is_none());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper must stop promptly on cancellation")
            .unwrap();
    }
}
