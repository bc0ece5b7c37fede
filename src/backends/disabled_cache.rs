//! Disabled Cache - No-op Backend
//!
//! Satisfies the backend contract without retaining anything, so caching can
//! be switched off without touching call sites.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::CacheError;
use crate::traits::CacheBackend;

/// Backend that never stores anything; every `get` is a miss
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledCache;

impl DisabledCache {
    #[must_use]
    pub fn new() -> Self {
        info!("Initializing disabled cache (caching turned off)");
        Self
    }
}

#[async_trait]
impl CacheBackend for DisabledCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        debug!(key = %key, "[Disabled] get always misses");
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &[u8]) -> Result<(), CacheError> {
        Ok(())
    }

    async fn set_with_ttl(
        &self,
        _key: &str,
        _value: &[u8],
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        Ok(())
    }

    // nothing to round-trip
    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "Disabled"
    }
}
