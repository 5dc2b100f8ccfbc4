//! Governor trait for abstracting fixed-window limiters and the abuse detector.

use async_trait::async_trait;

use super::identity::RequestContext;

/// A response header contributed by a governor.
pub type HeaderPair = (&'static str, String);

/// A deliberate 429, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Human-readable message for the JSON body
    pub message: String,
    /// Seconds until the client may retry
    pub retry_after_secs: Option<u64>,
    /// Extra headers for the rejection response
    pub headers: Vec<HeaderPair>,
}

/// Outcome of running a request past one governor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The governor does not apply to this request.
    Skip,
    /// Let the request through, attaching these headers to the response.
    Allow { headers: Vec<HeaderPair> },
    /// Terminate with 429.
    Reject(Rejection),
}

impl Verdict {
    /// Allow with no headers.
    pub fn allow() -> Self {
        Verdict::Allow {
            headers: Vec::new(),
        }
    }

    /// Whether the request must be terminated.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Verdict::Reject(_))
    }

    /// Headers to attach, whatever the outcome.
    pub fn headers(&self) -> &[HeaderPair] {
        match self {
            Verdict::Skip => &[],
            Verdict::Allow { headers } => headers,
            Verdict::Reject(rejection) => &rejection.headers,
        }
    }

    /// Value of the named header, if this verdict carries it.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers()
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Trait for anything that can admit or reject a request.
///
/// Implemented by `FixedWindowLimiter` and `GraduatedDetector` so the
/// interception layer can chain them without knowing which is which.
/// Implementations never fail: store problems are handled internally.
#[async_trait]
pub trait Governor: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Decide whether the request may proceed.
    async fn admit(&self, ctx: &RequestContext) -> Verdict;
}
