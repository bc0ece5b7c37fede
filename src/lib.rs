//! Resource-Management Proxy Cache
//!
//! Cache-aside orchestration for a rate-limited cloud resource-management API:
//! - **Pluggable backends**: disabled, in-process (local) or Redis (distributed)
//! - **Graceful fallback**: an unreachable Redis at startup degrades to the local cache
//! - **Global concurrency gate**: bounds upstream calls in flight, whatever their key
//! - **Cache-aside wrapper**: read, fetch on miss, store with TTL, never cache failures
//! - **Optional single-flight**: same-key misses coalesced behind one fetch
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use rm_proxy_cache::{CacheKey, CacheLayer, FetchError, ProxyConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ProxyConfig::from_env()?;
//!     rm_proxy_cache::telemetry::init_tracing(&config.log_level);
//!
//!     let layer = CacheLayer::from_config(&config).await?;
//!
//!     let key = CacheKey::from_parts("resource_groups", ["0000-sub"]);
//!     let groups: Vec<String> = layer
//!         .cache_aside()
//!         .execute(&key, None, false, || async {
//!             Ok::<_, FetchError>(vec!["rg-web".to_string()])
//!         })
//!         .await?;
//!
//!     let stats = layer.cache_aside().get_stats();
//!     tracing::info!("Hit rate: {:.2}%", stats.hit_rate);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Request → Backend.get ── hit ──────────────────────────────────────→ Return
//!                       └─ miss → Gate.acquire → Fetch → Backend.set → Return
//!                                                     └─ error (uncached) → Propagate
//! ```

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub mod backends;
pub mod builder;
pub mod cache_aside;
pub mod codecs;
pub mod config;
pub mod error;
pub mod factory;
pub mod gate;
pub mod key;
pub mod service;
pub mod telemetry;
pub mod traits;

pub use backends::{DisabledCache, LocalCache};

#[cfg(feature = "redis")]
pub use backends::RedisCache;

pub use builder::CacheLayerBuilder;
pub use cache_aside::{CacheAside, CacheAsideStats};
pub use codecs::JsonCodec;
pub use config::{BackendSelection, CacheSettings, ProxyConfig};
pub use error::{CacheError, FailureKind, FetchError};
pub use factory::create_cache;
pub use gate::{ConcurrencyGate, GatePermit};
pub use key::{CacheKey, TtlPolicy};
pub use service::{ResourceFetcher, ResourceKind, ResourceService};
pub use traits::{CacheBackend, CacheCodec};

// Re-export async_trait for implementors of the backend and fetcher traits
pub use async_trait::async_trait;

/// Process-wide cache state: one backend, one gate, one wrapper
///
/// Cloning is cheap and every clone shares the same state.
///
/// # Example
///
/// ```rust,no_run
/// use rm_proxy_cache::{CacheLayer, ProxyConfig};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let layer = CacheLayer::from_config(&ProxyConfig::default()).await?;
///
///     if layer.health_check().await {
///         println!("Cache layer healthy");
///     }
///
///     layer.shutdown();
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct CacheLayer {
    pub(crate) cache_aside: Arc<CacheAside>,
    pub(crate) gate: Arc<ConcurrencyGate>,
    pub(crate) backend: Arc<dyn CacheBackend>,
}

impl CacheLayer {
    /// Build the layer from loaded configuration
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConfigurationInvalid` if the configuration does
    /// not validate.
    pub async fn from_config(config: &ProxyConfig) -> Result<Self, CacheError> {
        config.validate()?;
        info!(backend = %config.cache.backend, "Initializing cache layer");
        CacheLayerBuilder::from_config(config).build().await
    }

    /// Read configuration from the environment and build the layer
    ///
    /// # Errors
    ///
    /// See [`ProxyConfig::from_env`].
    pub async fn from_env() -> Result<Self, CacheError> {
        let config = ProxyConfig::from_env()?;
        Self::from_config(&config).await
    }

    #[must_use]
    pub fn builder() -> CacheLayerBuilder {
        CacheLayerBuilder::new()
    }

    /// Round-trip a throwaway key through the backend
    ///
    /// A failure is logged, not fatal: the wrapper keeps serving from upstream.
    pub async fn health_check(&self) -> bool {
        let healthy = self.backend.health_check().await;
        if healthy {
            info!(backend = self.backend.name(), "Cache health check passed");
        } else {
            warn!(backend = self.backend.name(), "Cache health check failed, serving uncached");
        }
        healthy
    }

    /// The cache-aside wrapper (primary interface)
    #[must_use]
    pub fn cache_aside(&self) -> &Arc<CacheAside> {
        &self.cache_aside
    }

    #[must_use]
    pub fn gate(&self) -> &Arc<ConcurrencyGate> {
        &self.gate
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.cache_aside.default_ttl()
    }

    /// Stop admitting upstream calls
    ///
    /// Cache hits keep working; misses fail with `CacheError::GateClosed`.
    /// Fetches already in flight complete normally.
    pub fn shutdown(&self) {
        info!("Shutting down cache layer");
        self.gate.close();
    }
}
