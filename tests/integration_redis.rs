//! Integration tests against a live Redis
//!
//! Run with `REDIS_URL=redis://127.0.0.1:6379/0 cargo test -- --ignored`

#![cfg(feature = "redis")]

mod common;

use common::*;
use rm_proxy_cache::{CacheBackend, CacheKey, FetchError, RedisCache};
use std::time::Duration;

async fn connect(prefix: &str) -> RedisCache {
    RedisCache::connect(&redis_url(), prefix, Duration::from_secs(2))
        .await
        .unwrap_or_else(|e| panic!("Redis not reachable: {e}"))
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn test_redis_contract() {
    let cache = connect(&format!("{}:", test_key("contract"))).await;

    assert_eq!(cache.get("absent").await.ok().flatten(), None);

    cache.set("k", b"v1").await.ok();
    assert_eq!(cache.get("k").await.ok().flatten(), Some(b"v1".to_vec()));

    cache.delete("k").await.ok();
    assert_eq!(cache.get("k").await.ok().flatten(), None);
    assert!(cache.health_check().await);
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn test_redis_ttl_expiry() {
    let cache = connect(&format!("{}:", test_key("ttl"))).await;

    cache
        .set_with_ttl("short", b"v", Duration::from_millis(1500))
        .await
        .ok();
    assert!(cache.get("short").await.ok().flatten().is_some());

    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(cache.get("short").await.ok().flatten(), None);
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn test_redis_clear_is_namespaced() {
    let mine = connect(&format!("{}:", test_key("mine"))).await;
    let other = connect(&format!("{}:", test_key("other"))).await;

    mine.set("a", b"1").await.ok();
    mine.set("b", b"2").await.ok();
    other.set("a", b"keep").await.ok();

    mine.clear().await.ok();
    assert_eq!(mine.get("a").await.ok().flatten(), None);
    assert_eq!(mine.get("b").await.ok().flatten(), None);
    assert_eq!(other.get("a").await.ok().flatten(), Some(b"keep".to_vec()));

    other.clear().await.ok();
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn test_redis_clear_treats_prefix_literally() {
    let tenant = test_key("tenant");
    let bracketed = connect(&format!("{tenant}[12]:")).await;
    let one = connect(&format!("{tenant}1:")).await;

    bracketed.set("a", b"mine").await.ok();
    one.set("a", b"keep").await.ok();

    bracketed.clear().await.ok();
    assert_eq!(bracketed.get("a").await.ok().flatten(), None);
    assert_eq!(one.get("a").await.ok().flatten(), Some(b"keep".to_vec()));

    one.clear().await.ok();
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn test_layer_on_redis() {
    let layer = redis_layer(2).await;
    assert_eq!(layer.backend_name(), "Redis");

    let key = CacheKey::from_parts("resource_groups", ["sub-redis"]);
    let mut calls = 0;
    for _ in 0..2 {
        let groups: Vec<String> = layer
            .cache_aside()
            .execute(&key, None, false, || {
                calls += 1;
                async { Ok::<_, FetchError>(vec!["rg-1".to_string()]) }
            })
            .await
            .unwrap_or_else(|e| panic!("Fetch failed: {e}"));
        assert_eq!(groups, vec!["rg-1".to_string()]);
    }
    assert_eq!(calls, 1);

    layer.cache_aside().clear().await.ok();
}
