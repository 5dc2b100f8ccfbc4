//! The configured set of limiters and the detector for one process.

use std::sync::Arc;

use tracing::info;

use super::detector::GraduatedDetector;
use super::limiter::FixedWindowLimiter;
use super::tiers::{TierConfig, TierOverrides};
use crate::config::RateLimitingConfig;
use crate::error::Result;
use crate::store::StoreHandle;

/// Named tiers plus the graduated detector, built once at startup.
#[derive(Debug, Clone)]
pub struct Governance {
    /// Default API traffic
    pub standard: Arc<FixedWindowLimiter>,
    /// Login and credential endpoints
    pub auth: Arc<FixedWindowLimiter>,
    /// Unauthenticated public endpoints
    pub public: Arc<FixedWindowLimiter>,
    /// Privileged operations
    pub admin: Arc<FixedWindowLimiter>,
    /// Graduated abuse detector
    pub detector: Arc<GraduatedDetector>,
    handle: StoreHandle,
}

impl Governance {
    /// Build from configuration, loading tier overrides if a path is set.
    pub fn from_config(config: &RateLimitingConfig, handle: &StoreHandle) -> Result<Self> {
        let overrides = match &config.tiers_path {
            Some(path) => TierOverrides::from_file(path)?,
            None => TierOverrides::default(),
        };
        Ok(Self::build(config, &overrides, handle))
    }

    /// Build with explicit overrides.
    pub fn build(config: &RateLimitingConfig, overrides: &TierOverrides, handle: &StoreHandle) -> Self {
        let limiter = |tier: TierConfig| {
            let tier = overrides.resolve(tier).with_header_mode(config.header_mode);
            Arc::new(FixedWindowLimiter::with_handle(tier, handle))
        };

        let detector = if config.detector_enabled {
            GraduatedDetector::with_handle(handle)
        } else {
            info!("Graduated abuse detection disabled by configuration");
            GraduatedDetector::disabled()
        };

        let governance = Self {
            standard: limiter(TierConfig::standard()),
            auth: limiter(TierConfig::auth()),
            public: limiter(TierConfig::public()),
            admin: limiter(TierConfig::admin()),
            detector: Arc::new(detector),
            handle: handle.clone(),
        };

        info!(
            shared_store = handle.is_shared(),
            detector_enabled = governance.detector.is_enabled(),
            header_mode = ?config.header_mode,
            "Rate limiting tiers configured"
        );

        governance
    }

    /// Build an ad-hoc limiter on the same store.
    pub fn dynamic(&self, tier: TierConfig) -> Arc<FixedWindowLimiter> {
        Arc::new(FixedWindowLimiter::with_handle(tier, &self.handle))
    }

    /// The store handle the tiers were built on.
    pub fn store(&self) -> &StoreHandle {
        &self.handle
    }
}
