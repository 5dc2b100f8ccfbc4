//! Fixed-window counting on top of a counter store.

use std::time::Duration;

use tracing::debug;

use crate::error::StoreResult;
use crate::store::{ttl_secs, CounterStore, KeyTtl};

/// Count and reset time after one windowed increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WindowHit {
    pub count: i64,
    pub reset_secs: u64,
}

/// Increment `key`, arming `window` only when this increment opened it.
///
/// A key found without any expiry (its opening EXPIRE was lost) is re-armed
/// so it cannot keep counting across windows.
pub(crate) async fn increment_windowed(
    store: &dyn CounterStore,
    key: &str,
    window: Duration,
) -> StoreResult<WindowHit> {
    let count = store.increment(key).await?;
    let window_secs = ttl_secs(window);

    if count == 1 {
        store.expire(key, window).await?;
        return Ok(WindowHit {
            count,
            reset_secs: window_secs,
        });
    }

    let reset_secs = match store.ttl(key).await? {
        KeyTtl::Remaining(secs) => secs,
        KeyTtl::NoExpiry => {
            debug!(key, "Counter without expiry, re-arming window");
            store.expire(key, window).await?;
            window_secs
        }
        KeyTtl::Missing => window_secs,
    };

    Ok(WindowHit { count, reset_secs })
}

/// Snapshot of a window after one hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    /// Requests counted in the current window, including this one
    pub count: i64,
    /// Maximum requests allowed in the window
    pub limit: u64,
    /// Seconds until the window resets
    pub reset_secs: u64,
}

impl WindowState {
    /// Whether this hit is within the limit.
    pub fn within_limit(&self) -> bool {
        self.count <= self.limit as i64
    }

    /// Requests left in the window.
    pub fn remaining(&self) -> u64 {
        (self.limit as i64).saturating_sub(self.count).max(0) as u64
    }
}

/// A fixed window of `limit` requests per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindowCounter {
    limit: u64,
    window: Duration,
}

impl FixedWindowCounter {
    /// Create a new counter.
    pub fn new(limit: u64, window: Duration) -> Self {
        Self { limit, window }
    }

    /// Get the limit for this counter.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Get the window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record one hit on `key` and report where the window stands.
    pub async fn hit(&self, store: &dyn CounterStore, key: &str) -> StoreResult<WindowState> {
        let hit = increment_windowed(store, key, self.window).await?;

        Ok(WindowState {
            count: hit.count,
            limit: self.limit,
            reset_secs: hit.reset_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_hit_within_limit() {
        let store = MemoryStore::new();
        let counter = FixedWindowCounter::new(10, Duration::from_secs(60));

        let state = counter.hit(&store, "k").await.unwrap();
        assert!(state.within_limit());
        assert_eq!(state.count, 1);
        assert_eq!(state.remaining(), 9);
        assert_eq!(state.reset_secs, 60);
    }

    #[tokio::test]
    async fn test_hit_exceeds_limit() {
        let store = MemoryStore::new();
        let counter = FixedWindowCounter::new(5, Duration::from_secs(60));

        for _ in 0..5 {
            assert!(counter.hit(&store, "k").await.unwrap().within_limit());
        }

        let state = counter.hit(&store, "k").await.unwrap();
        assert!(!state.within_limit());
        assert_eq!(state.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_counts_down_and_window_closes() {
        let store = MemoryStore::new();
        let counter = FixedWindowCounter::new(2, Duration::from_secs(60));

        counter.hit(&store, "k").await.unwrap();
        tokio::time::advance(Duration::from_secs(15)).await;

        let state = counter.hit(&store, "k").await.unwrap();
        assert_eq!(state.reset_secs, 45);

        tokio::time::advance(Duration::from_secs(45)).await;
        let state = counter.hit(&store, "k").await.unwrap();
        assert_eq!(state.count, 1);
        assert_eq!(state.reset_secs, 60);
    }

    #[tokio::test]
    async fn test_rearms_counter_without_expiry() {
        let store = MemoryStore::new();
        store.increment("k").await.unwrap();

        let counter = FixedWindowCounter::new(10, Duration::from_secs(60));
        let state = counter.hit(&store, "k").await.unwrap();

        assert_eq!(state.count, 2);
        assert_eq!(store.ttl("k").await.unwrap(), KeyTtl::Remaining(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_increment_windowed_arms_only_once() {
        let store = MemoryStore::new();
        increment_windowed(&store, "w", Duration::from_secs(3600))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(600)).await;
        let hit = increment_windowed(&store, "w", Duration::from_secs(3600))
            .await
            .unwrap();

        assert_eq!(hit.count, 2);
        assert_eq!(hit.reset_secs, 3000);
        assert_eq!(store.ttl("w").await.unwrap(), KeyTtl::Remaining(3000));
    }
}
