//! Cache-Aside Demo
//!
//! Serves a few resource lookups through the cache layer against a simulated,
//! slow management API and prints what came from cache and what went upstream.
//!
//! Run with: cargo run --example cache_aside_demo
//! Try `CACHE_TYPE=redis`, `MAX_CONCURRENCY=2` or `CACHE_COALESCE_MISSES=true`.

use rm_proxy_cache::{
    CacheLayer, FetchError, ProxyConfig, ResourceFetcher, ResourceKind, ResourceService,
    async_trait, telemetry,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pretends to be the management API: every call takes 300ms
struct SimulatedApi;

#[async_trait]
impl ResourceFetcher for SimulatedApi {
    async fn fetch(&self, identity: &[String]) -> Result<Value, FetchError> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        match identity {
            [] => Ok(json!([{ "subscriptionId": "0000-demo", "displayName": "Demo" }])),
            [subscription] => Ok(json!([
                { "name": "rg-web", "subscription": subscription },
                { "name": "rg-data", "subscription": subscription }
            ])),
            [subscription, group] => Ok(json!([
                { "name": format!("{group}-vm-01"), "subscription": subscription },
                { "name": format!("{group}-vm-02"), "subscription": subscription }
            ])),
            _ => Err(FetchError::NotFound(identity.join("/"))),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ProxyConfig::from_env()?;
    telemetry::init_tracing(&config.log_level);

    println!("=== Resource-Management Proxy Cache Demo ===\n");

    let layer = CacheLayer::from_config(&config).await?;
    let api: Arc<dyn ResourceFetcher> = Arc::new(SimulatedApi);
    let service = ResourceService::builder(layer.clone())
        .with_fetcher(ResourceKind::Subscriptions, Arc::clone(&api))
        .with_fetcher(ResourceKind::ResourceGroups, Arc::clone(&api))
        .with_fetcher(ResourceKind::VirtualMachines, api)
        .build();

    println!("Backend: {}, concurrency budget: {}\n", layer.backend_name(), layer.gate().capacity());

    for round in 1..=2 {
        let start = Instant::now();
        let subscriptions = service.subscriptions(false).await?;
        println!("[round {round}] subscriptions in {:?}: {subscriptions}", start.elapsed());
    }

    println!("\nScenario: 6 concurrent VM listings across 3 resource groups\n");
    let start = Instant::now();
    let mut handles = vec![];
    for i in 0..6 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            let group = format!("rg-{}", i % 3);
            service.virtual_machines("0000-demo", &group, false).await
        }));
    }
    for handle in handles {
        handle.await??;
    }
    println!("All listings done in {:?}", start.elapsed());

    let start = Instant::now();
    service.resource_groups("0000-demo", true).await?;
    println!("Forced refresh of resource groups in {:?}", start.elapsed());

    let stats = layer.cache_aside().get_stats();
    println!("\n=== Statistics ===");
    println!("Requests:         {}", stats.total_requests);
    println!("Hits:             {}", stats.hits);
    println!("Misses:           {}", stats.misses);
    println!("Forced refreshes: {}", stats.forced_refreshes);
    println!("Upstream fetches: {}", stats.upstream_fetches);
    println!("Coalesced:        {}", stats.coalesced);
    println!("Hit rate:         {:.2}%", stats.hit_rate);

    service.clear_cache().await?;
    layer.shutdown();
    Ok(())
}
