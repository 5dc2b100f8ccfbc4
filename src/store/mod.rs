//! Counter store abstraction.
//!
//! Every piece of rate-limit state lives behind [`CounterStore`]: fixed-window
//! counters, the detector's request counters, warning counters and block flags.
//! The shared implementation is [`RedisStore`]; [`MemoryStore`] is the
//! process-local fallback used when no shared store is configured.

mod handle;
mod memory;
mod redis_store;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreResult;

pub use self::handle::StoreHandle;
pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

/// Remaining lifetime of a key, as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key exists and expires in this many seconds.
    Remaining(u64),
    /// Key exists with no expiry (raw `-1`).
    NoExpiry,
    /// Key does not exist (raw `-2`).
    Missing,
}

impl KeyTtl {
    /// Map a raw `TTL` reply, including the `-1`/`-2` sentinels.
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            -1 => KeyTtl::NoExpiry,
            r if r < 0 => KeyTtl::Missing,
            r => KeyTtl::Remaining(r as u64),
        }
    }

    /// Seconds remaining, if the key is live and expiring.
    pub fn remaining(&self) -> Option<u64> {
        match self {
            KeyTtl::Remaining(secs) if *secs > 0 => Some(*secs),
            _ => None,
        }
    }
}

/// Atomic key-value primitives required by limiters and the detector.
///
/// Each call is a single round trip. Implementations report failures as
/// errors; callers decide how to degrade.
#[async_trait]
pub trait CounterStore: Send + Sync + std::fmt::Debug {
    /// Atomically increment `key` and return the new value.
    ///
    /// Must not modify the key's TTL.
    async fn increment(&self, key: &str) -> StoreResult<i64>;

    /// Remaining lifetime of `key`.
    async fn ttl(&self, key: &str) -> StoreResult<KeyTtl>;

    /// Unconditionally set `key` to `value` with an expiry.
    async fn set_with_expiry(&self, key: &str, value: i64, ttl: Duration) -> StoreResult<()>;

    /// Arm an expiry on an existing key. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Short label for logs.
    fn backend(&self) -> &'static str;
}

/// Whole seconds for a store expiry, never less than one.
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}
