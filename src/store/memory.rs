//! Process-local counter store.
//!
//! Mirrors the Redis semantics the limiters rely on (INCR leaves the TTL
//! alone, expired keys read as missing) but is not shared between instances.
//! Uses `tokio::time::Instant` so paused-clock tests can drive expiry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

use super::{ttl_secs, CounterStore, KeyTtl};
use crate::error::StoreResult;

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: i64,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-memory counter store.
///
/// Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Entry>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired key. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    /// Periodically purge expired keys until the returned task is aborted.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let purged = store.purge_expired();
                if purged > 0 {
                    trace!(purged, remaining = store.len(), "Purged expired counters");
                }
            }
        })
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn increment(&self, key: &str) -> StoreResult<i64> {
        let now = Instant::now();
        let mut entry = self.entries.entry(key.to_string()).or_insert(Entry {
            value: 0,
            expires_at: None,
        });

        if !entry.is_live(now) {
            *entry = Entry {
                value: 0,
                expires_at: None,
            };
        }

        entry.value += 1;
        Ok(entry.value)
    }

    async fn ttl(&self, key: &str) -> StoreResult<KeyTtl> {
        let now = Instant::now();
        let ttl = match self.entries.get(key).map(|e| *e) {
            None => KeyTtl::Missing,
            Some(entry) if !entry.is_live(now) => KeyTtl::Missing,
            Some(Entry {
                expires_at: None, ..
            }) => KeyTtl::NoExpiry,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => {
                let left = at.saturating_duration_since(now);
                KeyTtl::Remaining(ttl_secs(left))
            }
        };
        Ok(ttl)
    }

    async fn set_with_expiry(&self, key: &str, value: i64, ttl: Duration) -> StoreResult<()> {
        let expires_at = Instant::now() + Duration::from_secs(ttl_secs(ttl));
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Some(expires_at),
            },
        );
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if entry.is_live(now) => {
                entry.expires_at = Some(now + Duration::from_secs(ttl_secs(ttl)));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
