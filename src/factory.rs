//! Cache Backend Factory
//!
//! Turns the configured [`BackendSelection`] into a ready backend. The choice
//! is made once at startup; a distributed backend that cannot be reached is
//! replaced by a local one so the proxy keeps serving.

use std::sync::Arc;
use tracing::{error, info};

use crate::backends::{DisabledCache, LocalCache};
use crate::config::{BackendSelection, CacheSettings};
use crate::traits::CacheBackend;

/// Build the backend selected by `settings`
///
/// Never fails: a distributed backend that cannot connect within
/// `settings.connect_timeout` is logged at `error!` and a [`LocalCache`] is
/// returned instead.
pub async fn create_cache(settings: &CacheSettings) -> Arc<dyn CacheBackend> {
    let backend: Arc<dyn CacheBackend> = match settings.backend {
        BackendSelection::Disabled => Arc::new(DisabledCache::new()),
        BackendSelection::Local => local(settings),
        BackendSelection::Distributed => distributed(settings).await,
    };

    info!(
        requested = %settings.backend,
        backend = backend.name(),
        "Cache backend ready"
    );
    backend
}

fn local(settings: &CacheSettings) -> Arc<dyn CacheBackend> {
    let cache = Arc::new(LocalCache::new());
    if let Some(interval) = settings.sweep_interval {
        // detached; the task ends once the cache is dropped
        let _sweeper = cache.spawn_sweeper(interval);
    }
    cache
}

#[cfg(feature = "redis")]
async fn distributed(settings: &CacheSettings) -> Arc<dyn CacheBackend> {
    use crate::backends::RedisCache;

    match RedisCache::connect(
        &settings.redis_url,
        &settings.redis_prefix,
        settings.connect_timeout,
    )
    .await
    {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            error!(
                redis_url = %crate::config::redact_url(&settings.redis_url),
                error = %e,
                "Failed to initialize Redis cache, falling back to local cache"
            );
            local(settings)
        }
    }
}

#[cfg(not(feature = "redis"))]
async fn distributed(settings: &CacheSettings) -> Arc<dyn CacheBackend> {
    error!("Distributed cache requested but the `redis` feature is disabled, falling back to local cache");
    local(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_disabled_selection() {
        let settings = CacheSettings {
            backend: BackendSelection::Disabled,
            ..CacheSettings::default()
        };
        let cache = create_cache(&settings).await;
        assert_eq!(cache.name(), "Disabled");

        cache.set("k", b"v").await.ok();
        assert_eq!(cache.get("k").await.ok().flatten(), None);
    }

    #[tokio::test]
    async fn test_local_selection() {
        let cache = create_cache(&CacheSettings::default()).await;
        assert_eq!(cache.name(), "Local");
        assert!(cache.health_check().await);
    }

    #[tokio::test]
    async fn test_unreachable_redis_falls_back_to_local() {
        let settings = CacheSettings {
            backend: BackendSelection::Distributed,
            redis_url: "redis://127.0.0.1:1/0".to_string(),
            connect_timeout: Duration::from_millis(200),
            ..CacheSettings::default()
        };

        let cache = create_cache(&settings).await;
        assert_eq!(cache.name(), "Local");

        cache
            .set_with_ttl("k", b"v", Duration::from_secs(60))
            .await
            .ok();
        assert_eq!(cache.get("k").await.ok().flatten(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn test_malformed_url_falls_back_to_local() {
        let settings = CacheSettings {
            backend: BackendSelection::Distributed,
            redis_url: "not a url".to_string(),
            ..CacheSettings::default()
        };
        assert_eq!(create_cache(&settings).await.name(), "Local");
    }
}
