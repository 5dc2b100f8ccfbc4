//! Graduated abuse detector.
//!
//! Tracks a per-minute request count for each identity and escalates through
//! the [`Ladder`]: warnings first, then short and long blocks. State per
//! identity lives in three independent store keys:
//!
//! - `requests:{identity}`: requests in the current 60s window
//! - `warning:{identity}`: warnings in the current hour
//! - `block:{identity}`: present while the identity is blocked
//!
//! A live block is checked before anything is counted. Store failures are
//! logged and the request is let through.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::backend::{Governor, Rejection, Verdict};
use super::identity::{Identity, RequestContext};
use super::ladder::{Action, Ladder};
use super::window::increment_windowed;
use crate::error::StoreResult;
use crate::store::{CounterStore, StoreHandle};

/// Response header carrying the warning count.
pub const WARNING_HEADER: &str = "X-Rate-Limit-Warning";

const REQUEST_WINDOW: Duration = Duration::from_secs(60);
const WARNING_WINDOW: Duration = Duration::from_secs(3600);

/// Escalating per-identity abuse detector.
pub struct GraduatedDetector {
    store: Option<Arc<dyn CounterStore>>,
    ladder: Ladder,
}

impl std::fmt::Debug for GraduatedDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraduatedDetector")
            .field("backend", &self.store.as_ref().map(|s| s.backend()))
            .field("ladder", &self.ladder)
            .finish()
    }
}

impl GraduatedDetector {
    /// Create a detector over `store` with the default ladder.
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store: Some(store),
            ladder: Ladder::default(),
        }
    }

    /// A detector that allows everything.
    pub fn disabled() -> Self {
        Self {
            store: None,
            ladder: Ladder::default(),
        }
    }

    /// Create a detector from the process store handle.
    ///
    /// Without a shared store the detector is disabled rather than enforcing
    /// per-process state that other instances cannot see.
    pub fn with_handle(handle: &StoreHandle) -> Self {
        match handle.detector_store() {
            Some(store) => Self::new(store),
            None => {
                warn!("No shared counter store, graduated abuse detection disabled");
                Self::disabled()
            }
        }
    }

    /// Replace the escalation ladder.
    pub fn with_ladder(mut self, ladder: Ladder) -> Self {
        self.ladder = ladder;
        self
    }

    /// Whether the detector enforces anything.
    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Run one request for `identity` through the state machine.
    async fn evaluate(
        &self,
        store: &dyn CounterStore,
        identity: &Identity,
    ) -> StoreResult<Verdict> {
        let block_key = format!("block:{}", identity);

        if let Some(ttl) = store.ttl(&block_key).await?.remaining() {
            let minutes = ttl.div_ceil(60);
            debug!(identity = %identity, ttl_secs = ttl, "Request from blocked identity");
            return Ok(Verdict::Reject(blocked(minutes, ttl)));
        }

        let requests_key = format!("requests:{}", identity);
        let count = increment_windowed(store, &requests_key, REQUEST_WINDOW)
            .await?
            .count;

        match self.ladder.classify(count) {
            None => Ok(Verdict::allow()),
            Some(Action::Block(duration)) => self.block(store, identity, &block_key, count, duration).await,
            Some(Action::Warn {
                max_warnings,
                block,
            }) => {
                let warning_key = format!("warning:{}", identity);
                let warnings = increment_windowed(store, &warning_key, WARNING_WINDOW)
                    .await?
                    .count;

                if warnings >= max_warnings {
                    return self.block(store, identity, &block_key, count, block).await;
                }

                info!(
                    identity = %identity,
                    count,
                    warnings,
                    "Excessive request rate, warning issued"
                );
                Ok(Verdict::Allow {
                    headers: vec![(
                        WARNING_HEADER,
                        format!("{}/{} warnings", warnings, max_warnings),
                    )],
                })
            }
        }
    }

    async fn block(
        &self,
        store: &dyn CounterStore,
        identity: &Identity,
        block_key: &str,
        count: i64,
        duration: Duration,
    ) -> StoreResult<Verdict> {
        store.set_with_expiry(block_key, 1, duration).await?;

        let secs = duration.as_secs();
        let blocked_until = chrono::Utc::now() + chrono::Duration::seconds(secs as i64);
        warn!(
            identity = %identity,
            count,
            block_secs = secs,
            blocked_until = %blocked_until.to_rfc3339(),
            "Identity temporarily blocked for excessive requests"
        );

        Ok(Verdict::Reject(blocked(secs.div_ceil(60), secs)))
    }
}

fn blocked(minutes: u64, retry_after_secs: u64) -> Rejection {
    let unit = if minutes == 1 { "minute" } else { "minutes" };
    Rejection {
        message: format!(
            "You have been temporarily blocked due to excessive requests. Please try again in {} {}.",
            minutes, unit
        ),
        retry_after_secs: Some(retry_after_secs),
        headers: Vec::new(),
    }
}

#[async_trait]
impl Governor for GraduatedDetector {
    fn name(&self) -> &str {
        "graduated"
    }

    async fn admit(&self, ctx: &RequestContext) -> Verdict {
        let Some(store) = self.store.as_deref() else {
            return Verdict::Skip;
        };

        let identity = ctx.identity();
        match self.evaluate(store, &identity).await {
            Ok(verdict) => verdict,
            Err(e) => {
                error!(
                    identity = %identity,
                    backend = store.backend(),
                    error = %e,
                    "Counter store failure in abuse detector, allowing request"
                );
                Verdict::allow()
            }
        }
    }
}
