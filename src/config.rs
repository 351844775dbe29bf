//! Configuration Module
//!
//! Handles loading cache and server configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Replicated cache configuration.
///
/// The key-value medium, broadcaster, connectivity monitor and clock are
/// injected through [`crate::CacheBuilder`]; everything tunable lives here.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Namespace prepended to every storage key
    pub prefix: String,
    /// Default TTL in seconds for entries set without an explicit TTL
    pub default_ttl: u64,
    /// Base URL of the backend authority, None = local-only
    pub backend_url: Option<String>,
    /// Interval between periodic sync passes
    pub sync_interval: Duration,
    /// Fixed delay between retries of a failed sync pass
    pub retry_delay: Duration,
    /// Additional attempts after the first failure of a sync pass
    pub max_retries: u32,
    /// Upper bound on a single backend request
    pub request_timeout: Duration,
    /// Interval of the expired-entry sweep, None = lazy expiry only
    pub sweep_interval: Option<Duration>,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_PREFIX` - Storage namespace (default: replica)
    /// - `CACHE_DEFAULT_TTL` - Default TTL in seconds (default: 3600)
    /// - `CACHE_BACKEND_URL` - Backend base URL (default: unset)
    /// - `CACHE_SYNC_INTERVAL_MS` - Periodic sync interval (default: 30000)
    /// - `CACHE_RETRY_DELAY_MS` - Delay between retries (default: 5000)
    /// - `CACHE_MAX_RETRIES` - Retries after the first failure (default: 3)
    /// - `CACHE_REQUEST_TIMEOUT_MS` - Backend request timeout (default: 10000)
    /// - `CACHE_SWEEP_INTERVAL_MS` - Expired-entry sweep interval (default: unset)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            prefix: env::var("CACHE_PREFIX").unwrap_or(defaults.prefix),
            default_ttl: parse_var("CACHE_DEFAULT_TTL").unwrap_or(defaults.default_ttl),
            backend_url: env::var("CACHE_BACKEND_URL")
                .ok()
                .filter(|url| !url.is_empty()),
            sync_interval: parse_var("CACHE_SYNC_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.sync_interval),
            retry_delay: parse_var("CACHE_RETRY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_delay),
            max_retries: parse_var("CACHE_MAX_RETRIES").unwrap_or(defaults.max_retries),
            request_timeout: parse_var("CACHE_REQUEST_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
            sweep_interval: parse_var("CACHE_SWEEP_INTERVAL_MS").map(Duration::from_millis),
        }
    }

    /// Default TTL expressed in milliseconds.
    pub fn default_ttl_ms(&self) -> u64 {
        self.default_ttl.saturating_mul(1000)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: "replica".to_string(),
            default_ttl: 3600,
            backend_url: None,
            sync_interval: Duration::from_secs(30),
            retry_delay: Duration::from_secs(5),
            max_retries: 3,
            request_timeout: Duration::from_secs(10),
            sweep_interval: None,
        }
    }
}

/// Reference authority server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP server port
    pub port: u16,
}

impl ServerConfig {
    /// Loads `SERVER_PORT` (default: 3000).
    pub fn from_env() -> Self {
        Self {
            port: parse_var("SERVER_PORT").unwrap_or(3000),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}
