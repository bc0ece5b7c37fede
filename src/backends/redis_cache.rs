//! Redis Cache - Distributed Cache Backend
//!
//! Redis-based distributed cache shared by every proxy instance. TTLs are
//! enforced by Redis itself (`SET .. EX`); every key lives under a configured
//! namespace prefix so the store can be shared with unrelated data.

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::CacheError;

const BACKEND: &str = "Redis";

/// Redis distributed cache with `ConnectionManager` for automatic reconnection
///
/// - Distributed caching across instances
/// - Native key expiry
/// - Namespaced keys (`<prefix><key>`)
/// - `clear` only touches keys under the prefix
pub struct RedisCache {
    /// Redis connection manager - handles reconnection automatically
    conn_manager: ConnectionManager,
    prefix: String,
}

impl RedisCache {
    /// Connect to Redis and verify the connection with `PING`
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection string (e.g., `redis://localhost:6379/0`)
    /// * `prefix` - Namespace prepended to every key
    /// * `connect_timeout` - Upper bound for connecting and the initial `PING`
    ///
    /// # Errors
    ///
    /// Returns `CacheError::BackendUnavailable` if the client cannot be
    /// created, the connection fails, or it does not answer in time.
    pub async fn connect(
        redis_url: &str,
        prefix: &str,
        connect_timeout: Duration,
    ) -> Result<Self, CacheError> {
        let display_url = crate::config::redact_url(redis_url);
        info!(redis_url = %display_url, prefix = %prefix, "Initializing Redis cache with ConnectionManager");

        let client = Client::open(redis_url).map_err(|e| unavailable(&e))?;

        let connect = async {
            // Create ConnectionManager - handles reconnection automatically
            let conn_manager = ConnectionManager::new(client).await?;

            // Test connection
            let mut conn = conn_manager.clone();
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, redis::RedisError>(conn_manager)
        };

        let conn_manager = match tokio::time::timeout(connect_timeout, connect).await {
            Ok(Ok(conn_manager)) => conn_manager,
            Ok(Err(e)) => return Err(unavailable(&e)),
            Err(_) => {
                return Err(CacheError::BackendUnavailable {
                    backend: BACKEND,
                    reason: format!("no answer within {}ms", connect_timeout.as_millis()),
                });
            }
        };

        info!(redis_url = %display_url, "Redis cache connected successfully");

        Ok(Self {
            conn_manager,
            prefix: prefix.to_string(),
        })
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    /// Scan namespaced keys matching a glob pattern relative to the prefix
    ///
    /// Uses cursor-based `SCAN`, never `KEYS`. The prefix is matched
    /// literally; only `pattern` is interpreted as a glob.
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis command fails.
    pub async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.conn_manager.clone();
        let match_pattern = format!("{}{pattern}", escape_glob(&self.prefix));
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&match_pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| CacheError::operation(BACKEND, "scan", e))?;

            cursor = next;
            keys.extend(batch);

            // Cursor 0 means iteration is complete
            if cursor == 0 {
                break;
            }
        }

        debug!(pattern = %match_pattern, count = keys.len(), "[Redis] Scanned keys matching pattern");
        Ok(keys)
    }
}

/// Backslash-escape `SCAN MATCH` glob metacharacters
fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for ch in literal.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn unavailable(e: &redis::RedisError) -> CacheError {
    CacheError::BackendUnavailable {
        backend: BACKEND,
        reason: e.to_string(),
    }
}

// ===== Trait Implementations =====

use crate::traits::CacheBackend;
use async_trait::async_trait;

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.conn_manager.clone();

        let value: Option<Vec<u8>> = conn
            .get(self.namespaced(key))
            .await
            .map_err(|e| CacheError::operation(BACKEND, "get", e))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        let mut conn = self.conn_manager.clone();

        let _: () = conn
            .set(self.namespaced(key), value)
            .await
            .map_err(|e| CacheError::operation(BACKEND, "set", e))?;
        debug!(key = %key, "[Redis] Cached key without expiry");
        Ok(())
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        if ttl.is_zero() {
            return self.set(key, value).await;
        }

        // EX takes whole seconds; round up so entries never expire early
        let secs = ttl
            .as_secs()
            .saturating_add(u64::from(ttl.subsec_nanos() > 0));
        let mut conn = self.conn_manager.clone();

        let _: () = conn
            .set_ex(self.namespaced(key), value, secs)
            .await
            .map_err(|e| CacheError::operation(BACKEND, "set_with_ttl", e))?;
        debug!(key = %key, ttl_secs = secs, "[Redis] Cached key with TTL");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .del(self.namespaced(key))
            .await
            .map_err(|e| CacheError::operation(BACKEND, "delete", e))?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let keys = self.scan_keys("*").await?;
        if keys.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn_manager.clone();
        let count: usize = conn
            .del(&keys)
            .await
            .map_err(|e| CacheError::operation(BACKEND, "clear", e))?;
        debug!(count = count, prefix = %self.prefix, "[Redis] Cleared namespaced keys");
        Ok(())
    }

    fn name(&self) -> &'static str {
        BACKEND
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_glob_characters_are_literal() {
        assert_eq!(escape_glob("rm_proxy:"), "rm_proxy:");
        assert_eq!(escape_glob("app[12]:"), "app\\[12\\]:");
        assert_eq!(escape_glob("a*b?c\\"), "a\\*b\\?c\\\\");
    }
}
