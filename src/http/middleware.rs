//! Request interception: run governors in order, stop at the first rejection.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

use super::context::request_context;
use super::response::{apply_headers, rejection_response};
use crate::ratelimit::{Governor, HeaderPair, Rejection, RequestContext, Verdict};

/// Result of running a request past a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    /// Every governor allowed or skipped; attach these headers.
    Proceed(Vec<HeaderPair>),
    /// A governor rejected. `headers` holds what earlier governors set.
    Halt {
        headers: Vec<HeaderPair>,
        rejection: Rejection,
    },
}

/// Ordered governors applied to one group of routes.
#[derive(Clone, Default)]
pub struct GovernorChain {
    governors: Vec<Arc<dyn Governor>>,
    trust_proxy: bool,
}

impl GovernorChain {
    /// Empty chain that admits everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a governor.
    pub fn with(mut self, governor: Arc<dyn Governor>) -> Self {
        self.governors.push(governor);
        self
    }

    /// Take the client address from `X-Forwarded-For` / `X-Real-IP`.
    pub fn with_trust_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }

    /// Governor names in evaluation order.
    pub fn names(&self) -> Vec<&str> {
        self.governors.iter().map(|g| g.name()).collect()
    }

    /// Evaluate governors in order.
    pub async fn run(&self, ctx: &RequestContext) -> ChainOutcome {
        let mut headers = Vec::new();

        for governor in &self.governors {
            match governor.admit(ctx).await {
                Verdict::Skip => {}
                Verdict::Allow { headers: extra } => headers.extend(extra),
                Verdict::Reject(rejection) => {
                    debug!(
                        governor = governor.name(),
                        path = ctx.path(),
                        "Request halted"
                    );
                    return ChainOutcome::Halt { headers, rejection };
                }
            }
        }

        ChainOutcome::Proceed(headers)
    }
}

impl std::fmt::Debug for GovernorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GovernorChain")
            .field("governors", &self.names())
            .field("trust_proxy", &self.trust_proxy)
            .finish()
    }
}

/// Middleware for `axum::middleware::from_fn_with_state`.
pub async fn govern(State(chain): State<GovernorChain>, request: Request, next: Next) -> Response {
    let ctx = request_context(&request, chain.trust_proxy);

    match chain.run(&ctx).await {
        ChainOutcome::Proceed(headers) => {
            let mut response = next.run(request).await;
            apply_headers(response.headers_mut(), &headers);
            response
        }
        ChainOutcome::Halt { headers, rejection } => {
            let mut response = rejection_response(&rejection);
            // The rejecting governor's own headers take precedence.
            let earlier: Vec<_> = headers
                .into_iter()
                .filter(|(name, _)| {
                    !rejection
                        .headers
                        .iter()
                        .any(|(n, _)| n.eq_ignore_ascii_case(name))
                })
                .collect();
            apply_headers(response.headers_mut(), &earlier);
            response
        }
    }
}
