//! Cache Layer Builder
//!
//! Assembles a [`CacheLayer`] from a backend, a concurrency gate and the
//! cache-aside wrapper.
//!
//! # Example: From Configuration
//!
//! ```rust,no_run
//! use rm_proxy_cache::{CacheLayerBuilder, ProxyConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ProxyConfig::from_env()?;
//!     let layer = CacheLayerBuilder::from_config(&config).build().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Example: Custom Backend
//!
//! ```rust,ignore
//! use rm_proxy_cache::CacheLayerBuilder;
//! use std::sync::Arc;
//!
//! let layer = CacheLayerBuilder::new()
//!     .with_backend(Arc::new(MyStore::new()))
//!     .max_concurrency(8)
//!     .build()
//!     .await?;
//! ```

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::cache_aside::CacheAside;
use crate::config::{CacheSettings, DEFAULT_MAX_CONCURRENCY, ProxyConfig};
use crate::error::CacheError;
use crate::factory::create_cache;
use crate::gate::ConcurrencyGate;
use crate::traits::CacheBackend;
use crate::CacheLayer;

/// Builder for [`CacheLayer`]
///
/// # Default Behavior
///
/// Without [`with_backend`](Self::with_backend) the backend comes from
/// [`create_cache`] using the builder's [`CacheSettings`], which means a
/// [`LocalCache`](crate::backends::LocalCache) unless configured otherwise.
pub struct CacheLayerBuilder {
    backend: Option<Arc<dyn CacheBackend>>,
    settings: CacheSettings,
    max_concurrency: usize,
}

impl CacheLayerBuilder {
    /// Create a builder with default settings
    #[must_use]
    pub fn new() -> Self {
        Self {
            backend: None,
            settings: CacheSettings::default(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Start from loaded process configuration
    #[must_use]
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self {
            backend: None,
            settings: config.cache.clone(),
            max_concurrency: config.max_concurrency,
        }
    }

    /// Use an already constructed backend instead of the factory
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Replace the backend settings handed to the factory
    #[must_use]
    pub fn with_settings(mut self, settings: CacheSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn max_concurrency(mut self, capacity: usize) -> Self {
        self.max_concurrency = capacity;
        self
    }

    /// TTL applied when a call does not override it; zero means no expiry
    #[must_use]
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.settings.default_ttl = ttl;
        self
    }

    #[must_use]
    pub fn coalesce_misses(mut self, enabled: bool) -> Self {
        self.settings.coalesce_misses = enabled;
        self
    }

    /// Build the layer
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConfigurationInvalid` if the concurrency budget is
    /// zero. Backend connection problems never fail the build; see
    /// [`create_cache`].
    pub async fn build(self) -> Result<CacheLayer, CacheError> {
        let gate = Arc::new(ConcurrencyGate::new(self.max_concurrency)?);

        let backend = match self.backend {
            Some(backend) => {
                info!(backend = backend.name(), "Using custom cache backend");
                backend
            }
            None => create_cache(&self.settings).await,
        };

        let cache_aside = Arc::new(
            CacheAside::new(
                Arc::clone(&backend),
                Arc::clone(&gate),
                self.settings.default_ttl,
            )
            .coalesce_misses(self.settings.coalesce_misses),
        );

        info!(
            backend = backend.name(),
            max_concurrency = gate.capacity(),
            default_ttl_secs = self.settings.default_ttl.as_secs(),
            coalesce_misses = self.settings.coalesce_misses,
            "Cache layer built"
        );

        Ok(CacheLayer {
            cache_aside,
            gate,
            backend,
        })
    }
}

impl Default for CacheLayerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
