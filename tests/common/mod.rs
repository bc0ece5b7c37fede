//! Common utilities for integration tests
//!
//! This module provides shared test infrastructure including:
//! - Cache layer setup with local, disabled or Redis backends
//! - Test resource payloads
//! - Instrumented fetchers that record concurrency

#![allow(dead_code)]

use rm_proxy_cache::{
    BackendSelection, CacheLayer, CacheLayerBuilder, CacheSettings, FetchError,
    ResourceFetcher, async_trait,
};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Get Redis URL from environment or use default
pub fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/0".to_string())
}

/// Create a test key name unique to this run
pub fn test_key(name: &str) -> String {
    format!("test_{}_{}", name, rand::random::<u32>())
}

/// Layer on a fresh local cache with the given concurrency budget
pub async fn local_layer(max_concurrency: usize) -> CacheLayer {
    CacheLayerBuilder::new()
        .max_concurrency(max_concurrency)
        .build()
        .await
        .unwrap_or_else(|e| panic!("Failed to build cache layer: {e}"))
}

/// Layer on the live Redis at [`redis_url`], namespaced per test run
pub async fn redis_layer(max_concurrency: usize) -> CacheLayer {
    let settings = CacheSettings {
        backend: BackendSelection::Distributed,
        redis_url: redis_url(),
        redis_prefix: format!("{}:", test_key("rm_proxy")),
        ..CacheSettings::default()
    };
    CacheLayerBuilder::new()
        .with_settings(settings)
        .max_concurrency(max_concurrency)
        .build()
        .await
        .unwrap_or_else(|e| panic!("Failed to build cache layer: {e}"))
}

/// Tracks how many fetches run at once and the highest value observed
#[derive(Debug, Default)]
pub struct ConcurrencyTracker {
    current: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl ConcurrencyTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mark one fetch as running for `hold`
    pub async fn run(&self, hold: Duration) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(hold).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Fetcher returning canned payloads after a delay, recording concurrency
pub struct SlowFetcher {
    pub tracker: Arc<ConcurrencyTracker>,
    pub hold: Duration,
}

#[async_trait]
impl ResourceFetcher for SlowFetcher {
    async fn fetch(&self, identity: &[String]) -> Result<Value, FetchError> {
        self.tracker.run(self.hold).await;
        Ok(test_data::resource_list(identity))
    }
}

/// Fetcher that always reports throttling
pub struct ThrottledFetcher;

#[async_trait]
impl ResourceFetcher for ThrottledFetcher {
    async fn fetch(&self, _identity: &[String]) -> Result<Value, FetchError> {
        Err(FetchError::Throttled {
            retry_after: Some(Duration::from_secs(30)),
        })
    }
}

/// Generate test data of various types
pub mod test_data {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct VirtualMachine {
        pub id: String,
        pub name: String,
        pub location: String,
        pub vm_size: String,
    }

    impl VirtualMachine {
        pub fn new(subscription: &str, resource_group: &str, name: &str) -> Self {
            Self {
                id: format!(
                    "/subscriptions/{subscription}/resourceGroups/{resource_group}/providers/Microsoft.Compute/virtualMachines/{name}"
                ),
                name: name.to_string(),
                location: "westeurope".to_string(),
                vm_size: "Standard_B2s".to_string(),
            }
        }
    }

    /// JSON list echoing the identity it was requested with
    pub fn resource_list(identity: &[String]) -> serde_json::Value {
        serde_json::json!({
            "identity": identity,
            "value": [
                { "name": "item-1" },
                { "name": "item-2" }
            ]
        })
    }
}

/// Wait for a condition with timeout
pub async fn wait_for<F>(mut condition: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    let start = tokio::time::Instant::now();
    let timeout = Duration::from_millis(timeout_ms);

    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation() {
        let key1 = test_key("vm");
        let key2 = test_key("vm");
        assert_ne!(key1, key2, "Keys should be unique");
        assert!(key1.starts_with("test_vm_"));
    }
}
