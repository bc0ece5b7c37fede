//! Local Cache - In-Process Backend
//!
//! A `HashMap` guarded by a `parking_lot::Mutex`, shared by every request in the
//! process. Entries carry their absolute expiry instant and are treated as
//! absent once it passes (lazy expiration). An optional sweeper reclaims the
//! memory of expired entries nobody reads again.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::CacheError;

/// Cache entry with expiration tracking
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: Vec<u8>, ttl: Option<Duration>) -> Self {
        Self {
            value,
            // an expiry past the clock's range never comes
            expires_at: ttl.and_then(|ttl| Instant::now().checked_add(ttl)),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

/// In-process cache with per-key TTL
///
/// **Features**:
/// - Per-key absolute expiry, checked at read time
/// - Lock held only around table access, never across an await
/// - Optional periodic sweep via [`LocalCache::spawn_sweeper`]
///
/// **Limitations**:
/// - Not shared across processes, lost on restart
/// - No size limit
///
/// **Example**:
/// ```rust
/// use rm_proxy_cache::backends::LocalCache;
/// use rm_proxy_cache::CacheBackend;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), rm_proxy_cache::CacheError> {
/// let cache = LocalCache::new();
/// cache.set_with_ttl("subscriptions", b"[]", Duration::from_secs(60)).await?;
/// assert_eq!(cache.get("subscriptions").await?, Some(b"[]".to_vec()));
/// # Ok(())
/// # }
/// ```
pub struct LocalCache {
    map: Mutex<HashMap<String, CacheEntry>>,
}

impl LocalCache {
    /// Create new local cache
    #[must_use]
    pub fn new() -> Self {
        info!("Initializing local cache (in-process table)");

        Self {
            map: Mutex::new(HashMap::new()),
        }
    }

    fn insert(&self, key: &str, value: &[u8], ttl: Option<Duration>) {
        let entry = CacheEntry::new(value.to_vec(), ttl);
        self.map.lock().insert(key.to_string(), entry);
    }

    /// Remove expired entries, returning how many were dropped
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut map = self.map.lock();
        let before = map.len();
        map.retain(|_, entry| !entry.is_expired(now));
        let removed = before - map.len();
        drop(map);

        if removed > 0 {
            debug!(count = removed, "[Local] Cleaned up expired entries");
        }
        removed
    }

    /// Run [`cleanup_expired`](Self::cleanup_expired) every `interval`.
    ///
    /// The task holds only a weak reference and exits once the cache is dropped.
    /// A zero interval starts nothing; the returned task finishes immediately.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        if interval.is_zero() {
            warn!("[Local] Zero sweep interval, expiry stays lazy");
            return tokio::spawn(async {});
        }

        let cache: Weak<Self> = Arc::downgrade(self);
        info!(interval_secs = interval.as_secs(), "[Local] Starting expiry sweeper");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match cache.upgrade() {
                    Some(cache) => {
                        cache.cleanup_expired();
                    }
                    None => break,
                }
            }
            debug!("[Local] Expiry sweeper stopped");
        })
    }

    /// Number of stored entries, including expired ones not yet reclaimed
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }
}

impl Default for LocalCache {
    fn default() -> Self {
        Self::new()
    }
}

// ===== Trait Implementations =====

use crate::traits::CacheBackend;
use async_trait::async_trait;

#[async_trait]
impl CacheBackend for LocalCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = Instant::now();
        let mut map = self.map.lock();

        let value = match map.get(key) {
            Some(entry) if entry.is_expired(now) => {
                map.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        };
        drop(map);

        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        self.insert(key, value, None);
        debug!(key = %key, "[Local] Cached key without expiry");
        Ok(())
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let ttl = (!ttl.is_zero()).then_some(ttl);
        self.insert(key, value, ttl);
        debug!(key = %key, ttl_ms = ?ttl.map(|t| t.as_millis()), "[Local] Cached key with TTL");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.map.lock().remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut map = self.map.lock();
        let count = map.len();
        map.clear();
        drop(map);
        debug!(count = count, "[Local] Cleared cache");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Local"
    }
}
