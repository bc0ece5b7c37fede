//! Cache Backend Traits
//!
//! This module defines the two seams of the cache layer:
//!
//! - `CacheCodec`: turns serializable resource descriptions into bytes and back
//! - `CacheBackend`: the raw key/value store every backend implements
//!
//! A new backend only has to implement `CacheBackend` to become pluggable; the
//! cache-aside wrapper never looks past this trait.
//!
//! # Example: Custom Backend
//!
//! ```rust,ignore
//! use rm_proxy_cache::{CacheBackend, CacheError, async_trait};
//! use std::time::Duration;
//!
//! struct MyStore {
//!     // Your implementation
//! }
//!
//! #[async_trait]
//! impl CacheBackend for MyStore {
//!     async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> { todo!() }
//!     async fn set(&self, key: &str, value: &[u8]) -> Result<(), CacheError> { todo!() }
//!     async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> { todo!() }
//!     async fn delete(&self, key: &str) -> Result<(), CacheError> { todo!() }
//!     async fn clear(&self) -> Result<(), CacheError> { todo!() }
//! }
//! ```

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::time::Duration;

use crate::error::CacheError;

/// Trait for cache value serialization/deserialization
///
/// Implementations must be `Send + Sync + Debug` so a codec can be shared by
/// every concurrent request going through the wrapper.
pub trait CacheCodec: Send + Sync + Debug {
    /// Serialize a value to bytes
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Codec` if the value cannot be represented.
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CacheError>;

    /// Deserialize bytes to a value
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Codec` if the bytes do not decode into `T`.
    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CacheError>;

    /// Name of the codec, for logging
    fn name(&self) -> &'static str;
}

/// Core cache backend trait
///
/// # Contract
///
/// - `get` returns `Ok(None)` for a key that was never written, was deleted,
///   or whose TTL has elapsed. A missing key is never an error.
/// - `set` stores without expiration and replaces any previous TTL.
/// - `set_with_ttl` stores with an expiration; `Duration::ZERO` means no
///   expiration, exactly like `set`.
/// - `delete` is a no-op for absent keys.
/// - `clear` removes every key owned by this backend.
///
/// `Err` is reserved for the backend being unable to answer at all (for
/// example a dropped network connection).
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: one instance serves every request in
/// the process.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get value from cache by key
    ///
    /// # Returns
    ///
    /// * `Ok(Some(value))` - Value present and not expired
    /// * `Ok(None)` - Key absent or expired
    /// * `Err(e)` - Backend could not be queried
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store value without expiration
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), CacheError>;

    /// Store value with time-to-live
    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration)
    -> Result<(), CacheError>;

    /// Remove value from cache
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Remove all values from cache
    async fn clear(&self) -> Result<(), CacheError>;

    /// Check if cache backend is healthy
    ///
    /// The default implementation round-trips a short-lived throwaway key.
    async fn health_check(&self) -> bool {
        let check_key = format!("health_check:{}", uuid::Uuid::new_v4());
        let check_value = b"health_check_value";

        match self
            .set_with_ttl(&check_key, check_value, Duration::from_secs(10))
            .await
        {
            Ok(()) => match self.get(&check_key).await {
                Ok(Some(retrieved)) => {
                    let _ = self.delete(&check_key).await;
                    retrieved == check_value
                }
                _ => false,
            },
            Err(_) => false,
        }
    }

    /// Get the name of this cache backend, for logging
    fn name(&self) -> &'static str {
        "unknown"
    }
}
