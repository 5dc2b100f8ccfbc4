//! Fixed-window limiter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, trace, warn};

use super::backend::{Governor, Rejection, Verdict};
use super::identity::RequestContext;
use super::tiers::{KeyGenerator, TierConfig};
use super::window::FixedWindowCounter;
use crate::store::{CounterStore, StoreHandle};

/// Namespace prefix for every fixed-window counter.
const KEY_PREFIX: &str = "ratelimit";

/// Caps requests per key to `max` within a fixed window.
///
/// One instance per tier. State lives entirely in the counter store, so the
/// limiter itself is cheap to share across tasks.
pub struct FixedWindowLimiter {
    config: TierConfig,
    counter: FixedWindowCounter,
    store: Arc<dyn CounterStore>,
}

impl std::fmt::Debug for FixedWindowLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedWindowLimiter")
            .field("config", &self.config)
            .field("backend", &self.store.backend())
            .finish()
    }
}

impl FixedWindowLimiter {
    /// Create a limiter for `config` backed by `store`.
    pub fn new(config: TierConfig, store: Arc<dyn CounterStore>) -> Self {
        let counter = FixedWindowCounter::new(config.max, config.window);
        debug!(
            tier = %config.name,
            max = config.max,
            window_secs = config.window.as_secs(),
            backend = store.backend(),
            "Creating fixed-window limiter"
        );
        Self {
            config,
            counter,
            store,
        }
    }

    /// Create a limiter using the handle's limiter store.
    pub fn with_handle(config: TierConfig, handle: &StoreHandle) -> Self {
        Self::new(config, handle.limiter_store())
    }

    /// Build an ad-hoc limiter.
    pub fn dynamic(
        window: Duration,
        max: u64,
        key_generator: KeyGenerator,
        store: Arc<dyn CounterStore>,
    ) -> Self {
        Self::new(TierConfig::dynamic(window, max, key_generator), store)
    }

    /// The tier configuration.
    pub fn config(&self) -> &TierConfig {
        &self.config
    }

    /// Store key for a request under this tier.
    pub fn key_for(&self, ctx: &RequestContext) -> String {
        format!(
            "{}:{}:{}",
            KEY_PREFIX,
            self.config.name,
            self.config.key_generator.key(ctx)
        )
    }
}

#[async_trait]
impl Governor for FixedWindowLimiter {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn admit(&self, ctx: &RequestContext) -> Verdict {
        if self.config.skips(ctx.path()) {
            trace!(tier = %self.config.name, path = ctx.path(), "Path skipped by tier");
            return Verdict::Skip;
        }

        let key = self.key_for(ctx);

        let state = match self.counter.hit(self.store.as_ref(), &key).await {
            Ok(state) => state,
            Err(e) => {
                error!(
                    tier = %self.config.name,
                    backend = self.store.backend(),
                    error = %e,
                    "Counter store failure, allowing request without rate limiting"
                );
                return Verdict::allow();
            }
        };

        let headers = self.config.header_mode.render(
            state.limit,
            state.remaining(),
            state.reset_secs,
            self.config.window,
        );

        if state.within_limit() {
            trace!(
                tier = %self.config.name,
                key = %key,
                count = state.count,
                remaining = state.remaining(),
                "Rate limit check passed"
            );
            return Verdict::Allow { headers };
        }

        warn!(
            tier = %self.config.name,
            path = ctx.path(),
            count = state.count,
            limit = state.limit,
            reset_secs = state.reset_secs,
            "Rate limit exceeded"
        );

        Verdict::Reject(Rejection {
            message: self.config.message.clone(),
            retry_after_secs: Some(state.reset_secs),
            headers,
        })
    }
}
