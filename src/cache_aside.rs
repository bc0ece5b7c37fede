//! Cache-Aside Operation Wrapper
//!
//! Implements the read / fetch / store protocol every upstream operation goes
//! through:
//!
//! ```text
//! START → CACHE_CHECK → HIT  → RETURN
//!                     → MISS → ACQUIRE_SLOT → UPSTREAM_CALL → STORE → RELEASE_SLOT → RETURN
//!                                                          ↘ RELEASE_SLOT → PROPAGATE_ERROR
//! ```
//!
//! Cache hits never touch the concurrency gate. Backend trouble degrades to a
//! miss (reads) or to an uncached result (writes); only upstream failures reach
//! the caller, and they are never cached.

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::codecs::JsonCodec;
use crate::error::{CacheError, FailureKind};
use crate::gate::ConcurrencyGate;
use crate::key::{CacheKey, effective_ttl};
use crate::traits::{CacheBackend, CacheCodec};

/// RAII cleanup guard for in-flight key tracking
///
/// Removes the key's lock from the map on drop unless other callers are still
/// queued on it.
struct CleanupGuard<'a> {
    map: &'a DashMap<String, Arc<Mutex<()>>>,
    key: &'a str,
}

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        // one reference in the map, one held by the current owner
        self.map
            .remove_if(self.key, |_, lock| Arc::strong_count(lock) <= 2);
    }
}

/// Cache-aside wrapper shared by every resource fetch path
///
/// Owns no cache state: storage is delegated to the injected backend and
/// admission to the injected gate.
pub struct CacheAside<C: CacheCodec = JsonCodec> {
    backend: Arc<dyn CacheBackend>,
    gate: Arc<ConcurrencyGate>,
    codec: C,
    default_ttl: Duration,
    coalesce_misses: bool,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
    total_requests: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    forced_refreshes: AtomicU64,
    upstream_fetches: AtomicU64,
    upstream_failures: AtomicU64,
    backend_errors: AtomicU64,
    store_failures: AtomicU64,
    decode_failures: AtomicU64,
    coalesced: AtomicU64,
}

impl CacheAside<JsonCodec> {
    /// Create a wrapper using the JSON codec
    #[must_use]
    pub fn new(
        backend: Arc<dyn CacheBackend>,
        gate: Arc<ConcurrencyGate>,
        default_ttl: Duration,
    ) -> Self {
        Self::with_codec(backend, gate, default_ttl, JsonCodec)
    }
}

impl<C: CacheCodec> CacheAside<C> {
    #[must_use]
    pub fn with_codec(
        backend: Arc<dyn CacheBackend>,
        gate: Arc<ConcurrencyGate>,
        default_ttl: Duration,
        codec: C,
    ) -> Self {
        debug!(
            backend = backend.name(),
            codec = codec.name(),
            default_ttl_secs = default_ttl.as_secs(),
            "Initializing cache-aside wrapper"
        );

        Self {
            backend,
            gate,
            codec,
            default_ttl,
            coalesce_misses: false,
            in_flight: DashMap::new(),
            total_requests: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            forced_refreshes: AtomicU64::new(0),
            upstream_fetches: AtomicU64::new(0),
            upstream_failures: AtomicU64::new(0),
            backend_errors: AtomicU64::new(0),
            store_failures: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    /// Serialize concurrent misses on the same key so only one of them calls
    /// upstream; the others re-read the freshly stored entry.
    #[must_use]
    pub fn coalesce_misses(mut self, enabled: bool) -> Self {
        self.coalesce_misses = enabled;
        self
    }

    /// Run one cached upstream operation
    ///
    /// # Arguments
    ///
    /// * `key` - Cache key of the logical request
    /// * `ttl` - TTL override; `None` uses the default, `Some(Duration::ZERO)` never expires
    /// * `force_refresh` - Skip the cache read and always call upstream
    /// * `fetch` - The upstream call, invoked at most once
    ///
    /// # Errors
    ///
    /// Returns the error of `fetch` unchanged. Fails with
    /// `CacheError::GateClosed` (converted into `E`) if the gate was closed
    /// while the call needed a slot.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let key = CacheKey::from_parts("resource_groups", [subscription_id]);
    /// let groups: Vec<ResourceGroup> = cache
    ///     .execute(&key, None, refresh, || client.list_resource_groups(subscription_id))
    ///     .await?;
    /// ```
    pub async fn execute<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Option<Duration>,
        force_refresh: bool,
        fetch: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError> + FailureKind,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        if force_refresh {
            self.forced_refreshes.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Force refresh requested, bypassing cache read");
        } else if let Some(value) = self.read(key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Cache hit");
            return Ok(value);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }

        if !self.coalesce_misses {
            return self.fetch_and_store(key, ttl, fetch).await;
        }

        // Cache Stampede protection: one upstream call per key at a time
        let lock = self
            .in_flight
            .entry(key.as_str().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        // built before waiting so a cancelled waiter still cleans up;
        // dropped after the lock guard is released
        let _cleanup = CleanupGuard {
            map: &self.in_flight,
            key: key.as_str(),
        };
        let _guard = lock.lock().await;

        // Another caller may have stored the value while we waited
        if !force_refresh {
            if let Some(value) = self.read(key).await {
                self.coalesced.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Served by a concurrent fetch");
                return Ok(value);
            }
        }

        self.fetch_and_store(key, ttl, fetch).await
    }

    async fn fetch_and_store<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Option<Duration>,
        fetch: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError> + FailureKind,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.gate.acquire().await?;
        self.upstream_fetches.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, in_flight = self.gate.in_flight(), "Fetching from upstream");

        let value = match fetch().await {
            Ok(value) => value,
            Err(err) => {
                self.upstream_failures.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, kind = err.failure_kind(), "Upstream fetch failed, nothing cached");
                return Err(err);
            }
        };

        self.store(key, &value, ttl).await;
        permit.release();
        Ok(value)
    }

    async fn read<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let bytes = match self.backend.get(key.as_str()).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                self.backend_errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, backend = self.backend.name(), error = %err, "Cache read failed, treating as miss");
                return None;
            }
        };

        match self.codec.deserialize(&bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                self.decode_failures.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %err, "Cached entry could not be decoded, treating as miss");
                None
            }
        }
    }

    async fn store<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Option<Duration>) {
        let bytes = match self.codec.serialize(value) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.store_failures.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %err, "Fetched value could not be encoded, returning it uncached");
                return;
            }
        };

        let result = match effective_ttl(ttl, self.default_ttl) {
            Some(ttl) => self.backend.set_with_ttl(key.as_str(), &bytes, ttl).await,
            None => self.backend.set(key.as_str(), &bytes).await,
        };

        if let Err(err) = result {
            self.store_failures.fetch_add(1, Ordering::Relaxed);
            self.backend_errors.fetch_add(1, Ordering::Relaxed);
            warn!(key = %key, backend = self.backend.name(), error = %err, "Cache write failed, returning result uncached");
        }
    }

    /// Drop one key from the cache
    ///
    /// # Errors
    ///
    /// Returns the backend error if the key could not be removed.
    pub async fn invalidate(&self, key: &CacheKey) -> Result<(), CacheError> {
        debug!(key = %key, "Invalidating cache entry");
        self.backend.delete(key.as_str()).await
    }

    /// Drop every cached entry
    ///
    /// # Errors
    ///
    /// Returns the backend error if the cache could not be cleared.
    pub async fn clear(&self) -> Result<(), CacheError> {
        debug!(backend = self.backend.name(), "Clearing cache");
        self.backend.clear().await
    }

    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    #[must_use]
    pub fn gate(&self) -> &Arc<ConcurrencyGate> {
        &self.gate
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Get comprehensive statistics
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn get_stats(&self) -> CacheAsideStats {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let hits = self.hits.load(Ordering::Relaxed);

        CacheAsideStats {
            total_requests,
            hits,
            misses: self.misses.load(Ordering::Relaxed),
            forced_refreshes: self.forced_refreshes.load(Ordering::Relaxed),
            upstream_fetches: self.upstream_fetches.load(Ordering::Relaxed),
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
            backend_errors: self.backend_errors.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            hit_rate: if total_requests > 0 {
                (hits as f64 / total_requests as f64) * 100.0
            } else {
                0.0
            },
            in_flight_keys: self.in_flight.len(),
        }
    }
}

/// Cache-aside statistics
#[derive(Debug, Clone, Default)]
pub struct CacheAsideStats {
    pub total_requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub forced_refreshes: u64,
    pub upstream_fetches: u64,
    pub upstream_failures: u64,
    pub backend_errors: u64,
    pub store_failures: u64,
    /// Cached entries that no longer decode into the requested type
    pub decode_failures: u64,
    /// Misses answered by another caller's fetch (single-flight only)
    pub coalesced: u64,
    /// Percentage of requests answered from cache
    pub hit_rate: f64,
    pub in_flight_keys: usize,
}
