//! Rate limiting logic: fixed-window tiers and the graduated abuse detector.

mod backend;
mod detector;
mod governance;
mod identity;
mod ladder;
mod limiter;
mod tiers;
mod window;

pub use backend::{Governor, HeaderPair, Rejection, Verdict};
pub use detector::{GraduatedDetector, WARNING_HEADER};
pub use governance::Governance;
pub use identity::{Identity, Principal, RequestContext};
pub use ladder::{Action, Ladder, Rung};
pub use limiter::FixedWindowLimiter;
pub use tiers::{
    HeaderMode, KeyGenerator, SkipPredicate, TierConfig, TierOverride, TierOverrides,
    HEALTH_CHECK_PATHS,
};
pub use window::{FixedWindowCounter, WindowState};
