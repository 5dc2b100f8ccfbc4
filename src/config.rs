//! Configuration management for Tollgate.
//!
//! Values are layered: built-in defaults, then an optional config file, then
//! `TOLLGATE__`-prefixed environment variables
//! (e.g. `TOLLGATE__STORE__HOST=redis.internal`).

use config::{Config, Environment, File};
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::Result;
use crate::ratelimit::HeaderMode;

/// Main configuration for the Tollgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Counter store connection
    #[serde(default)]
    pub store: StoreConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Resolve client addresses from `X-Forwarded-For` / `X-Real-IP`.
    ///
    /// Only enable this behind a proxy that overwrites those headers.
    #[serde(default)]
    pub trust_proxy: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            trust_proxy: false,
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Connection parameters for the shared counter store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Use the shared store at all. When false every limiter counts in-process.
    #[serde(default)]
    pub enabled: bool,

    /// Store host
    #[serde(default)]
    pub host: Option<String>,

    /// Store port
    #[serde(default = "default_store_port")]
    pub port: u16,

    /// ACL username
    #[serde(default)]
    pub username: Option<String>,

    /// Password
    #[serde(default)]
    pub password: Option<String>,

    /// Connect over TLS
    #[serde(default)]
    pub tls: bool,

    /// Logical database index
    #[serde(default)]
    pub db: i64,

    /// Per-command timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// How often the in-process fallback drops expired keys
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: None,
            port: default_store_port(),
            username: None,
            password: None,
            tls: false,
            db: 0,
            timeout_ms: default_timeout_ms(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_store_port() -> u16 {
    6379
}

fn default_timeout_ms() -> u64 {
    250
}

fn default_sweep_interval() -> u64 {
    30
}

impl StoreConfig {
    /// Per-command timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Interval for the in-process sweeper.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// Connection parameters, or `None` when no host is configured.
    ///
    /// Credentials are passed as fields rather than embedded in a URL, so
    /// reserved characters in a password need no escaping.
    pub fn connection_info(&self) -> Option<ConnectionInfo> {
        let host = self.host.as_deref().map(str::trim).filter(|h| !h.is_empty())?;

        let addr = if self.tls {
            ConnectionAddr::TcpTls {
                host: host.to_string(),
                port: self.port,
                insecure: false,
                tls_params: None,
            }
        } else {
            ConnectionAddr::Tcp(host.to_string(), self.port)
        };

        Some(ConnectionInfo {
            addr,
            redis: RedisConnectionInfo {
                db: self.db,
                username: self.username.clone(),
                password: self.password.clone(),
                ..RedisConnectionInfo::default()
            },
        })
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Path to a YAML file with per-tier overrides
    #[serde(default)]
    pub tiers_path: Option<String>,

    /// Which rate-limit headers the fixed-window tiers emit
    #[serde(default)]
    pub header_mode: HeaderMode,

    /// Run the graduated abuse detector on API routes
    #[serde(default = "default_detector_enabled")]
    pub detector_enabled: bool,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            tiers_path: None,
            header_mode: HeaderMode::default(),
            detector_enabled: default_detector_enabled(),
        }
    }
}

fn default_detector_enabled() -> bool {
    true
}

/// Log output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TollgateConfig {
    /// Load configuration from an optional file plus the environment.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }

        let config = builder
            .add_source(Environment::with_prefix("TOLLGATE").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Load configuration from a file path, ignoring the environment.
    pub fn from_file(path: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = TollgateConfig::default();
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert!(!config.store.enabled);
        assert_eq!(config.store.timeout(), Duration::from_millis(250));
        assert!(config.rate_limiting.detector_enabled);
        assert_eq!(config.rate_limiting.header_mode, HeaderMode::Standard);
    }

    #[test]
    fn test_connection_info_requires_host() {
        let mut store = StoreConfig::default();
        assert!(store.connection_info().is_none());

        store.host = Some("  ".to_string());
        assert!(store.connection_info().is_none());
    }

    #[test]
    fn test_connection_info_with_credentials_and_tls() {
        let store = StoreConfig {
            enabled: true,
            host: Some("cache.internal".to_string()),
            port: 6380,
            username: Some("svc".to_string()),
            password: Some("secret".to_string()),
            tls: true,
            db: 2,
            ..StoreConfig::default()
        };

        let info = store.connection_info().unwrap();
        assert!(matches!(
            &info.addr,
            ConnectionAddr::TcpTls { host, port: 6380, insecure: false, .. } if host == "cache.internal"
        ));
        assert_eq!(info.redis.db, 2);
        assert_eq!(info.redis.username.as_deref(), Some("svc"));
        assert_eq!(info.redis.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_connection_info_keeps_reserved_characters() {
        let store = StoreConfig {
            host: Some("cache.internal".to_string()),
            username: Some("ops:team".to_string()),
            password: Some("p@ss/w0rd:%40".to_string()),
            ..StoreConfig::default()
        };

        let info = store.connection_info().unwrap();
        assert!(matches!(
            &info.addr,
            ConnectionAddr::Tcp(host, 6379) if host == "cache.internal"
        ));
        assert_eq!(info.redis.db, 0);
        assert_eq!(info.redis.username.as_deref(), Some("ops:team"));
        assert_eq!(info.redis.password.as_deref(), Some("p@ss/w0rd:%40"));

        // Building a client does not connect, but validates the parameters.
        assert!(redis::Client::open(info).is_ok());
    }

    fn yaml_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .prefix("tollgate-config-")
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    #[test]
    fn test_from_file_yaml() {
        let file = yaml_file(
            "server:\n  listen_addr: \"0.0.0.0:9000\"\nstore:\n  enabled: true\n  host: redis\nrate_limiting:\n  header_mode: legacy\n  detector_enabled: false\n",
        );

        let config = TollgateConfig::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.server.listen_addr.port(), 9000);
        assert!(config.store.enabled);
        assert_eq!(config.store.host.as_deref(), Some("redis"));
        assert_eq!(config.store.port, 6379);
        assert_eq!(config.rate_limiting.header_mode, HeaderMode::Legacy);
        assert!(!config.rate_limiting.detector_enabled);
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = yaml_file("store:\n  enabled: true\n  host: redis\n  port: 6380\n");

        std::env::set_var("TOLLGATE__STORE__HOST", "cache.from-env");
        let loaded = TollgateConfig::load(Some(file.path().to_str().unwrap()));
        std::env::remove_var("TOLLGATE__STORE__HOST");

        let config = loaded.unwrap();
        assert_eq!(config.store.host.as_deref(), Some("cache.from-env"));
        // Keys the environment does not set keep the file's values.
        assert!(config.store.enabled);
        assert_eq!(config.store.port, 6380);
        assert_eq!(config.server.listen_addr.port(), 8080);
    }
}
