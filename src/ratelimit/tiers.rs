//! Tier configuration for fixed-window limiters.
//!
//! A tier is a window, a request cap, a key generator and an optional skip
//! predicate. Four tiers ship with fixed parameters (`standard`, `auth`,
//! `public`, `admin`); [`TierConfig::dynamic`] builds ad-hoc ones. Per-tier
//! overrides can be loaded from YAML at startup.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::backend::HeaderPair;
use super::identity::RequestContext;
use crate::error::{Result, TollgateError};

/// Paths the `standard` tier never counts.
pub const HEALTH_CHECK_PATHS: &[&str] = &["/health", "/api/health"];

/// Which rate-limit headers a tier attaches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderMode {
    /// `RateLimit-Policy`, `RateLimit-Limit`, `RateLimit-Remaining`, `RateLimit-Reset` (seconds)
    #[default]
    Standard,
    /// `X-RateLimit-Limit`, `X-RateLimit-Remaining`, `X-RateLimit-Reset` (epoch seconds)
    Legacy,
    /// Both sets
    Both,
    /// No rate-limit headers
    None,
}

impl HeaderMode {
    /// Render headers for a window with `limit` requests, `remaining` left,
    /// resetting in `reset_secs`.
    pub fn render(&self, limit: u64, remaining: u64, reset_secs: u64, window: Duration) -> Vec<HeaderPair> {
        let mut headers = Vec::new();

        if matches!(self, HeaderMode::Standard | HeaderMode::Both) {
            headers.push(("RateLimit-Policy", format!("{};w={}", limit, window.as_secs())));
            headers.push(("RateLimit-Limit", limit.to_string()));
            headers.push(("RateLimit-Remaining", remaining.to_string()));
            headers.push(("RateLimit-Reset", reset_secs.to_string()));
        }

        if matches!(self, HeaderMode::Legacy | HeaderMode::Both) {
            let reset_at = chrono::Utc::now().timestamp() + reset_secs as i64;
            headers.push(("X-RateLimit-Limit", limit.to_string()));
            headers.push(("X-RateLimit-Remaining", remaining.to_string()));
            headers.push(("X-RateLimit-Reset", reset_at.to_string()));
        }

        headers
    }
}

/// How a tier derives its partition key from a request.
#[derive(Clone, Default)]
pub enum KeyGenerator {
    /// `ip:{addr}`, ignoring any principal
    #[default]
    RemoteAddress,
    /// `user:{id}` when authenticated, else `ip:{addr}`
    Principal,
    /// Caller-supplied
    Custom(Arc<dyn Fn(&RequestContext) -> String + Send + Sync>),
}

impl KeyGenerator {
    /// Wrap a closure as a key generator.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&RequestContext) -> String + Send + Sync + 'static,
    {
        KeyGenerator::Custom(Arc::new(f))
    }

    /// Compute the key for a request.
    pub fn key(&self, ctx: &RequestContext) -> String {
        match self {
            KeyGenerator::RemoteAddress => ctx.address_identity().to_string(),
            KeyGenerator::Principal => ctx.identity().to_string(),
            KeyGenerator::Custom(f) => f(ctx),
        }
    }
}

impl fmt::Debug for KeyGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyGenerator::RemoteAddress => write!(f, "RemoteAddress"),
            KeyGenerator::Principal => write!(f, "Principal"),
            KeyGenerator::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Predicate over the request path; `true` bypasses the tier entirely.
#[derive(Clone)]
pub struct SkipPredicate(Arc<dyn Fn(&str) -> bool + Send + Sync>);

impl SkipPredicate {
    /// Wrap a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Skip requests whose path equals one of `paths`.
    pub fn paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let paths: Vec<String> = paths.into_iter().map(Into::into).collect();
        Self::new(move |path| paths.iter().any(|p| p == path))
    }

    /// Whether `path` should bypass the tier.
    pub fn matches(&self, path: &str) -> bool {
        (self.0)(path)
    }
}

impl fmt::Debug for SkipPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SkipPredicate(..)")
    }
}

/// Static configuration for one fixed-window tier.
#[derive(Debug, Clone)]
pub struct TierConfig {
    /// Tier name; also the counter namespace
    pub name: String,
    /// Window length
    pub window: Duration,
    /// Maximum requests per key per window
    pub max: u64,
    /// Message for the 429 body
    pub message: String,
    /// Partition key derivation
    pub key_generator: KeyGenerator,
    /// Paths that bypass this tier
    pub skip: Option<SkipPredicate>,
    /// Rate-limit header style
    pub header_mode: HeaderMode,
}

impl TierConfig {
    /// A tier with the given name, window and cap, keyed by remote address.
    pub fn new(name: impl Into<String>, window: Duration, max: u64) -> Self {
        Self {
            name: name.into(),
            window,
            max,
            message: "Too many requests, please try again later.".to_string(),
            key_generator: KeyGenerator::default(),
            skip: None,
            header_mode: HeaderMode::default(),
        }
    }

    /// Default API traffic: 60 per minute, health checks exempt.
    pub fn standard() -> Self {
        Self::new("standard", Duration::from_secs(60), 60)
            .with_message("Too many requests from this IP, please try again later.")
            .with_skip(SkipPredicate::paths(HEALTH_CHECK_PATHS.iter().copied()))
    }

    /// Login and credential endpoints: 10 per 15 minutes.
    pub fn auth() -> Self {
        Self::new("auth", Duration::from_secs(900), 10)
            .with_message("Too many authentication attempts, please try again after 15 minutes.")
    }

    /// Unauthenticated public endpoints: 30 per minute.
    pub fn public() -> Self {
        Self::new("public", Duration::from_secs(60), 30)
            .with_message("Too many requests to public endpoints, please try again later.")
    }

    /// Privileged operations: 120 per minute per principal.
    pub fn admin() -> Self {
        Self::new("admin", Duration::from_secs(60), 120)
            .with_message("Too many admin requests, please try again later.")
            .with_key_generator(KeyGenerator::Principal)
    }

    /// Ad-hoc tier.
    ///
    /// The namespace is derived from the window and cap, so two dynamic tiers
    /// with identical parameters share counters unless one is [`named`](Self::named).
    pub fn dynamic(window: Duration, max: u64, key_generator: KeyGenerator) -> Self {
        let name = format!("dynamic-{}s-{}", window.as_secs(), max);
        Self::new(name, window, max).with_key_generator(key_generator)
    }

    /// Rename the tier, which also moves its counter namespace.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the rejection message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Set the key generator.
    pub fn with_key_generator(mut self, key_generator: KeyGenerator) -> Self {
        self.key_generator = key_generator;
        self
    }

    /// Set the skip predicate.
    pub fn with_skip(mut self, skip: SkipPredicate) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Set the header mode.
    pub fn with_header_mode(mut self, header_mode: HeaderMode) -> Self {
        self.header_mode = header_mode;
        self
    }

    /// Whether `path` bypasses this tier.
    pub fn skips(&self, path: &str) -> bool {
        self.skip.as_ref().is_some_and(|s| s.matches(path))
    }

    /// Apply overrides loaded from configuration.
    pub fn apply(mut self, overrides: &TierOverride) -> Self {
        if let Some(secs) = overrides.window_secs {
            self.window = Duration::from_secs(secs);
        }
        if let Some(max) = overrides.max {
            self.max = max;
        }
        if let Some(ref message) = overrides.message {
            self.message = message.clone();
        }
        if let Some(ref paths) = overrides.skip_paths {
            self.skip = Some(SkipPredicate::paths(paths.clone()));
        }
        self
    }
}

/// Optional per-tier settings from the tiers file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierOverride {
    /// Window length in seconds
    #[serde(default)]
    pub window_secs: Option<u64>,
    /// Request cap
    #[serde(default)]
    pub max: Option<u64>,
    /// Rejection message
    #[serde(default)]
    pub message: Option<String>,
    /// Exact paths to skip; replaces the default predicate
    #[serde(default)]
    pub skip_paths: Option<Vec<String>>,
}

/// Tier overrides keyed by tier name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierOverrides {
    /// Map of tier name to override
    #[serde(default)]
    pub tiers: HashMap<String, TierOverride>,
}

impl TierOverrides {
    /// Load overrides from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading tier overrides");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load overrides from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| TollgateError::Config(format!("Failed to parse tier overrides: {}", e)))
    }

    /// Apply the override for `config.name`, if any.
    pub fn resolve(&self, config: TierConfig) -> TierConfig {
        match self.tiers.get(&config.name) {
            Some(o) => config.apply(o),
            None => config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::identity::Principal;
    use std::net::{IpAddr, Ipv4Addr};

    fn ctx() -> RequestContext {
        RequestContext::new("/api/listings")
            .with_remote_addr(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 9)))
            .with_principal(Principal::new("77"))
    }

    #[test]
    fn test_named_tier_parameters() {
        let standard = TierConfig::standard();
        assert_eq!((standard.window, standard.max), (Duration::from_secs(60), 60));

        let auth = TierConfig::auth();
        assert_eq!((auth.window, auth.max), (Duration::from_secs(900), 10));
        assert!(auth.skip.is_none());

        let public = TierConfig::public();
        assert_eq!((public.window, public.max), (Duration::from_secs(60), 30));

        let admin = TierConfig::admin();
        assert_eq!((admin.window, admin.max), (Duration::from_secs(60), 120));
    }

    #[test]
    fn test_standard_skips_health_checks_only() {
        let standard = TierConfig::standard();
        assert!(standard.skips("/health"));
        assert!(standard.skips("/api/health"));
        assert!(!standard.skips("/api/listings"));
        assert!(!standard.skips("/healthz"));
        assert!(!TierConfig::auth().skips("/health"));
    }

    #[test]
    fn test_key_generators() {
        let ctx = ctx();
        assert_eq!(KeyGenerator::RemoteAddress.key(&ctx), "ip:192.168.1.9");
        assert_eq!(KeyGenerator::Principal.key(&ctx), "user:77");

        let by_path = KeyGenerator::custom(|c| format!("path:{}", c.path()));
        assert_eq!(by_path.key(&ctx), "path:/api/listings");
    }

    #[test]
    fn test_dynamic_namespace() {
        let tier = TierConfig::dynamic(Duration::from_secs(30), 5, KeyGenerator::Principal);
        assert_eq!(tier.name, "dynamic-30s-5");
        assert_eq!(tier.max, 5);

        let renamed = tier.named("bookings-create");
        assert_eq!(renamed.name, "bookings-create");
    }

    #[test]
    fn test_standard_headers() {
        let headers = HeaderMode::Standard.render(60, 59, 60, Duration::from_secs(60));
        assert!(headers.contains(&("RateLimit-Limit", "60".to_string())));
        assert!(headers.contains(&("RateLimit-Remaining", "59".to_string())));
        assert!(headers.contains(&("RateLimit-Reset", "60".to_string())));
        assert!(headers.contains(&("RateLimit-Policy", "60;w=60".to_string())));
        assert!(!headers.iter().any(|(n, _)| n.starts_with("X-")));
    }

    #[test]
    fn test_legacy_headers_use_epoch_reset() {
        let now = chrono::Utc::now().timestamp();
        let headers = HeaderMode::Legacy.render(10, 3, 120, Duration::from_secs(900));

        let reset: i64 = headers
            .iter()
            .find(|(n, _)| *n == "X-RateLimit-Reset")
            .map(|(_, v)| v.parse().unwrap())
            .unwrap();
        assert!(reset >= now + 120);
        assert!(!headers.iter().any(|(n, _)| n.starts_with("RateLimit-")));
    }

    #[test]
    fn test_no_headers() {
        assert!(HeaderMode::None.render(1, 1, 1, Duration::from_secs(1)).is_empty());
        assert_eq!(HeaderMode::Both.render(1, 1, 1, Duration::from_secs(1)).len(), 7);
    }

    #[test]
    fn test_parse_overrides() {
        let yaml = r#"
tiers:
  auth:
    max: 5
    message: "Slow down on logins."
  standard:
    window_secs: 30
    skip_paths: ["/status"]
"#;
        let overrides = TierOverrides::from_yaml(yaml).unwrap();

        let auth = overrides.resolve(TierConfig::auth());
        assert_eq!(auth.max, 5);
        assert_eq!(auth.window, Duration::from_secs(900));
        assert_eq!(auth.message, "Slow down on logins.");

        let standard = overrides.resolve(TierConfig::standard());
        assert_eq!(standard.window, Duration::from_secs(30));
        assert!(standard.skips("/status"));
        assert!(!standard.skips("/health"));

        let public = overrides.resolve(TierConfig::public());
        assert_eq!(public.max, 30);
    }

    #[test]
    fn test_parse_overrides_invalid() {
        let result = TierOverrides::from_yaml("tiers: [1, 2");
        assert!(matches!(result, Err(TollgateError::Config(_))));
    }
}
