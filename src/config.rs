//! Startup configuration
//!
//! Settings are read once from the environment and are immutable afterwards.
//!
//! # Environment Variables
//!
//! - `CACHE_TYPE`: `disabled`, `local` or `distributed` (default `local`).
//!   `no_cache`/`none`, `memory` and `redis` are accepted as aliases.
//! - `REDIS_URL`: distributed backend connection string
//! - `REDIS_PREFIX`: namespace for every distributed key (default `rm_proxy:`)
//! - `CACHE_TTL`: default TTL in seconds, `0` = never expire (default 3600)
//! - `MAX_CONCURRENCY`: upstream concurrency budget, > 0 (default 5)
//! - `REDIS_CONNECT_TIMEOUT_MS`: startup connect timeout (default 2000)
//! - `CACHE_SWEEP_INTERVAL`: local expiry sweep in seconds, `0` = off (default off)
//! - `CACHE_COALESCE_MISSES`: single-flight for same-key misses (default false)
//! - `LOG_LEVEL`: default log filter when `RUST_LOG` is unset (default `info`)

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::CacheError;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/0";
pub const DEFAULT_REDIS_PREFIX: &str = "rm_proxy:";
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Which cache backend the factory builds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendSelection {
    Disabled,
    #[default]
    Local,
    Distributed,
}

impl FromStr for BackendSelection {
    type Err = CacheError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "disabled" | "no_cache" | "none" => Ok(Self::Disabled),
            "local" | "memory" => Ok(Self::Local),
            "distributed" | "redis" => Ok(Self::Distributed),
            _ => Err(CacheError::config(format!(
                "unknown cache backend '{value}' (expected disabled, local or distributed)"
            ))),
        }
    }
}

impl fmt::Display for BackendSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("disabled"),
            Self::Local => f.write_str("local"),
            Self::Distributed => f.write_str("distributed"),
        }
    }
}

/// Settings consumed by the backend factory and the cache-aside wrapper
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub backend: BackendSelection,
    pub redis_url: String,
    pub redis_prefix: String,
    /// TTL used when a call does not override it; zero means no expiry
    pub default_ttl: Duration,
    pub connect_timeout: Duration,
    /// Periodic sweep of the local backend; `None` = lazy expiry only
    pub sweep_interval: Option<Duration>,
    /// Serialize concurrent misses on the same key
    pub coalesce_misses: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: BackendSelection::Local,
            redis_url: DEFAULT_REDIS_URL.to_string(),
            redis_prefix: DEFAULT_REDIS_PREFIX.to_string(),
            default_ttl: DEFAULT_TTL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            sweep_interval: None,
            coalesce_misses: false,
        }
    }
}

/// Process-wide configuration
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub cache: CacheSettings,
    /// Maximum number of upstream calls in flight at once
    pub max_concurrency: usize,
    pub log_level: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            cache: CacheSettings::default(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            log_level: "info".to_string(),
        }
    }
}

impl ProxyConfig {
    /// Read configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConfigurationInvalid` for an unknown backend, a
    /// non-positive concurrency budget or an unparseable value.
    pub fn from_env() -> Result<Self, CacheError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// See [`ProxyConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CacheError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let backend = match var("CACHE_TYPE") {
            Some(value) => value.parse()?,
            None => defaults.cache.backend,
        };

        let default_ttl = match var("CACHE_TTL") {
            Some(value) => Duration::from_secs(parse_number::<u64>("CACHE_TTL", &value)?),
            None => defaults.cache.default_ttl,
        };

        let connect_timeout = match var("REDIS_CONNECT_TIMEOUT_MS") {
            Some(value) => Duration::from_millis(parse_number::<u64>(
                "REDIS_CONNECT_TIMEOUT_MS",
                &value,
            )?),
            None => defaults.cache.connect_timeout,
        };

        let sweep_interval = match var("CACHE_SWEEP_INTERVAL") {
            Some(value) => {
                let secs = parse_number::<u64>("CACHE_SWEEP_INTERVAL", &value)?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            None => None,
        };

        let coalesce_misses = match var("CACHE_COALESCE_MISSES") {
            Some(value) => parse_bool("CACHE_COALESCE_MISSES", &value)?,
            None => defaults.cache.coalesce_misses,
        };

        let max_concurrency = match var("MAX_CONCURRENCY") {
            Some(value) => parse_number::<usize>("MAX_CONCURRENCY", &value)?,
            None => defaults.max_concurrency,
        };

        let config = Self {
            cache: CacheSettings {
                backend,
                redis_url: var("REDIS_URL").unwrap_or(defaults.cache.redis_url),
                redis_prefix: lookup("REDIS_PREFIX").unwrap_or(defaults.cache.redis_prefix),
                default_ttl,
                connect_timeout,
                sweep_interval,
                coalesce_misses,
            },
            max_concurrency,
            log_level: var("LOG_LEVEL")
                .map_or(defaults.log_level, |level| level.trim().to_ascii_lowercase()),
        };

        config.validate()?;

        info!(
            backend = %config.cache.backend,
            redis_url = %redact_url(&config.cache.redis_url),
            default_ttl_secs = config.cache.default_ttl.as_secs(),
            max_concurrency = config.max_concurrency,
            coalesce_misses = config.cache.coalesce_misses,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Check invariants that must hold before serving
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConfigurationInvalid` when the concurrency budget
    /// is zero or the distributed backend has no connection string.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.max_concurrency == 0 {
            return Err(CacheError::config(
                "MAX_CONCURRENCY must be a positive integer",
            ));
        }
        if self.cache.backend == BackendSelection::Distributed && self.cache.redis_url.is_empty()
        {
            return Err(CacheError::config(
                "REDIS_URL is required for the distributed backend",
            ));
        }
        Ok(())
    }
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T, CacheError> {
    value
        .trim()
        .parse()
        .map_err(|_| CacheError::config(format!("{name} must be a non-negative integer, got '{value}'")))
}

fn parse_bool(name: &str, value: &str) -> Result<bool, CacheError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(CacheError::config(format!(
            "{name} must be a boolean, got '{value}'"
        ))),
    }
}

/// Connection string with credentials stripped, for logs
#[must_use]
pub fn redact_url(url: &str) -> String {
    match (url.split_once("://"), url.rsplit_once('@')) {
        (Some((scheme, _)), Some((_, host))) => format!("{scheme}://{host}"),
        (None, Some((_, host))) => host.to_string(),
        _ => url.to_string(),
    }
}
