//! Redis-backed counter store.
//!
//! Commands go through a `redis::aio::ConnectionManager`, which multiplexes a
//! single connection and reconnects in the background. Every command is
//! bounded by the configured timeout and never retried inline; a slow store
//! costs at most one timeout per call.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, IntoConnectionInfo, RedisResult};
use tokio::time::timeout;
use tracing::{debug, info};

use super::{ttl_secs, CounterStore, KeyTtl};
use crate::error::{StoreError, StoreResult};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared counter store backed by Redis.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    timeout: Duration,
    closed: Arc<AtomicBool>,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("timeout", &self.timeout)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to Redis.
    ///
    /// # Arguments
    /// * `info` - Connection URL (e.g., "redis://127.0.0.1:6379/0") or a
    ///   prebuilt `ConnectionInfo`
    /// * `command_timeout` - Upper bound for every subsequent command
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the connection cannot be
    /// established within the connect timeout.
    pub async fn connect<T: IntoConnectionInfo>(
        info: T,
        command_timeout: Duration,
    ) -> StoreResult<Self> {
        let client = Client::open(info)?;
        let connection = match timeout(CONNECT_TIMEOUT, ConnectionManager::new(client)).await {
            Ok(result) => result?,
            Err(_) => return Err(StoreError::Timeout(CONNECT_TIMEOUT)),
        };

        info!(timeout_ms = command_timeout.as_millis() as u64, "Connected to Redis counter store");

        Ok(Self {
            connection,
            timeout: command_timeout,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Stop serving commands. Later calls fail with [`StoreError::Closed`].
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("Redis counter store closed");
        }
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn run<T, F>(&self, command: &'static str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }

        match timeout(self.timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                debug!(command, "Redis command timed out");
                Err(StoreError::Timeout(self.timeout))
            }
        }
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn increment(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.connection.clone();
        self.run("INCR", async move { conn.incr(key, 1_i64).await })
            .await
    }

    async fn ttl(&self, key: &str) -> StoreResult<KeyTtl> {
        let mut conn = self.connection.clone();
        let raw: i64 = self.run("TTL", async move { conn.ttl(key).await }).await?;
        Ok(KeyTtl::from_raw(raw))
    }

    async fn set_with_expiry(&self, key: &str, value: i64, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.connection.clone();
        let secs = ttl_secs(ttl);
        self.run("SET", async move { conn.set_ex(key, value, secs).await })
            .await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.connection.clone();
        let secs = ttl_secs(ttl) as i64;
        self.run("EXPIRE", async move { conn.expire(key, secs).await })
            .await
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
