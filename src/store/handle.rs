//! Process-wide counter store lifecycle.
//!
//! The handle is created once at startup and passed into limiter and detector
//! constructors. It decides between the shared Redis store and the
//! process-local fallback, and owns their shutdown.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::{CounterStore, MemoryStore, RedisStore};
use crate::config::StoreConfig;

/// Owner of the counter store connection.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    shared: Option<RedisStore>,
    local: MemoryStore,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl StoreHandle {
    /// Initialise the store from configuration.
    ///
    /// Never fails. Without a reachable shared store this degrades to
    /// process-local counting.
    pub async fn init(config: &StoreConfig) -> Self {
        if !config.enabled {
            info!("Shared counter store disabled, using process-local counters");
            return Self::local(config);
        }

        let Some(info) = config.connection_info() else {
            warn!("Shared counter store enabled but no host configured, using process-local counters");
            return Self::local(config);
        };

        match RedisStore::connect(info, config.timeout()).await {
            Ok(store) => Self::shared(store),
            Err(e) => {
                error!(
                    error = %e,
                    "Failed to connect to shared counter store, using process-local counters"
                );
                Self::local(config)
            }
        }
    }

    /// Handle over an already connected shared store.
    pub fn shared(store: RedisStore) -> Self {
        Self {
            inner: Arc::new(Inner {
                shared: Some(store),
                local: MemoryStore::new(),
                sweeper: Mutex::new(None),
            }),
        }
    }

    /// Handle with process-local counting only, and a sweeper for expired keys.
    pub fn local(config: &StoreConfig) -> Self {
        let local = MemoryStore::new();
        let sweeper = local.spawn_sweeper(config.sweep_interval());
        Self {
            inner: Arc::new(Inner {
                shared: None,
                local,
                sweeper: Mutex::new(Some(sweeper)),
            }),
        }
    }

    /// Handle over a caller-supplied local store, without a sweeper.
    pub fn from_memory(store: MemoryStore) -> Self {
        Self {
            inner: Arc::new(Inner {
                shared: None,
                local: store,
                sweeper: Mutex::new(None),
            }),
        }
    }

    /// Whether a shared store is in use.
    pub fn is_shared(&self) -> bool {
        self.inner.shared.is_some()
    }

    /// Store for fixed-window limiters: shared if available, else the local fallback.
    pub fn limiter_store(&self) -> Arc<dyn CounterStore> {
        match &self.inner.shared {
            Some(store) => Arc::new(store.clone()),
            None => Arc::new(self.inner.local.clone()),
        }
    }

    /// Store for the graduated detector. Only a shared store qualifies.
    pub fn detector_store(&self) -> Option<Arc<dyn CounterStore>> {
        self.inner
            .shared
            .as_ref()
            .map(|store| Arc::new(store.clone()) as Arc<dyn CounterStore>)
    }

    /// Close the shared store and stop the local sweeper.
    pub fn shutdown(&self) {
        if let Some(store) = &self.inner.shared {
            store.close();
        }
        if let Some(sweeper) = self.inner.sweeper.lock().take() {
            sweeper.abort();
        }
        info!(shared = self.is_shared(), "Counter store shut down");
    }
}
