//! Resource Service
//!
//! Composes independent per-resource fetchers with the cache-aside wrapper.
//! Each [`ResourceKind`] maps to one upstream operation; its identity
//! components (subscription id, resource group name, ...) become the cache key.
//!
//! ```rust,ignore
//! let service = ResourceService::builder(layer)
//!     .with_fetcher(ResourceKind::Subscriptions, Arc::new(SubscriptionClient::new(creds)))
//!     .with_fetcher(ResourceKind::ResourceGroups, Arc::new(ResourceGroupClient::new(creds)))
//!     .with_ttl(ResourceKind::Subscriptions, TtlPolicy::Custom(Duration::from_secs(86_400)))
//!     .build();
//!
//! let groups = service.resource_groups("0000-sub", false).await?;
//! ```

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::CacheLayer;
use crate::error::{CacheError, FetchError};
use crate::key::{CacheKey, TtlPolicy};

/// Upstream resource operations served through the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Subscriptions,
    ResourceGroups,
    VirtualMachines,
    VirtualMachineDetails,
    NetworkInterfaces,
    SecurityRules,
    RouteTables,
    AadGroups,
}

impl ResourceKind {
    pub const ALL: [Self; 8] = [
        Self::Subscriptions,
        Self::ResourceGroups,
        Self::VirtualMachines,
        Self::VirtualMachineDetails,
        Self::NetworkInterfaces,
        Self::SecurityRules,
        Self::RouteTables,
        Self::AadGroups,
    ];

    /// Operation name, the first cache key segment
    #[must_use]
    pub fn operation(self) -> &'static str {
        match self {
            Self::Subscriptions => "subscriptions",
            Self::ResourceGroups => "resource_groups",
            Self::VirtualMachines => "virtual_machines",
            Self::VirtualMachineDetails => "vm_details",
            Self::NetworkInterfaces => "network_interfaces",
            Self::SecurityRules => "nsg_rules",
            Self::RouteTables => "route_tables",
            Self::AadGroups => "aad_groups",
        }
    }

    /// Number of identity components the operation expects
    ///
    /// - subscriptions: none
    /// - resource groups, route tables: subscription id
    /// - virtual machines: subscription id, resource group
    /// - vm details, network interfaces: subscription id, resource group, vm name
    /// - security rules: subscription id, network security group id
    /// - AAD groups: principal id
    #[must_use]
    pub fn arity(self) -> usize {
        match self {
            Self::Subscriptions => 0,
            Self::ResourceGroups | Self::RouteTables | Self::AadGroups => 1,
            Self::VirtualMachines | Self::SecurityRules => 2,
            Self::VirtualMachineDetails | Self::NetworkInterfaces => 3,
        }
    }

    /// Cache key for one request of this kind
    #[must_use]
    pub fn cache_key(self, identity: &[String]) -> CacheKey {
        CacheKey::from_parts(self.operation(), identity)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operation())
    }
}

/// One upstream resource operation
///
/// Implementations talk to the management API and nothing else: no caching,
/// no concurrency control. Timeouts and retries are theirs to decide.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Fetch the resource description for `identity`
    ///
    /// `identity` always has exactly [`ResourceKind::arity`] components.
    async fn fetch(&self, identity: &[String]) -> Result<Value, FetchError>;
}

/// Cached access to every registered resource operation
#[derive(Clone)]
pub struct ResourceService {
    layer: CacheLayer,
    fetchers: HashMap<ResourceKind, Arc<dyn ResourceFetcher>>,
    ttls: HashMap<ResourceKind, TtlPolicy>,
}

impl ResourceService {
    #[must_use]
    pub fn builder(layer: CacheLayer) -> ResourceServiceBuilder {
        ResourceServiceBuilder {
            layer,
            fetchers: HashMap::new(),
            ttls: HashMap::new(),
        }
    }

    /// Get a resource description, from cache when possible
    ///
    /// # Errors
    ///
    /// - `FetchError::Unsupported` if no fetcher is registered for `kind`
    /// - `FetchError::NotFound` if `identity` has the wrong number of components
    /// - any error returned by the fetcher, unchanged
    pub async fn get(
        &self,
        kind: ResourceKind,
        identity: &[String],
        refresh: bool,
    ) -> Result<Value, FetchError> {
        let fetcher = self
            .fetchers
            .get(&kind)
            .ok_or(FetchError::Unsupported(kind))?;

        if identity.len() != kind.arity() {
            return Err(FetchError::NotFound(format!(
                "{kind} expects {} identity components, got {}",
                kind.arity(),
                identity.len()
            )));
        }

        let key = kind.cache_key(identity);
        let ttl = self
            .ttls
            .get(&kind)
            .copied()
            .unwrap_or_default()
            .as_override();

        debug!(kind = %kind, key = %key, refresh = refresh, "Resource lookup");

        self.layer
            .cache_aside()
            .execute(&key, ttl, refresh, || fetcher.fetch(identity))
            .await
    }

    /// [`get`](Self::get) decoded into a concrete type
    ///
    /// # Errors
    ///
    /// As [`get`](Self::get); a value that does not match `T` is reported as
    /// `FetchError::Unavailable(CacheError::Codec)`.
    pub async fn get_typed<T: DeserializeOwned>(
        &self,
        kind: ResourceKind,
        identity: &[String],
        refresh: bool,
    ) -> Result<T, FetchError> {
        let value = self.get(kind, identity, refresh).await?;
        serde_json::from_value(value)
            .map_err(|e| FetchError::Unavailable(CacheError::Codec(e.to_string())))
    }

    /// # Errors
    ///
    /// See [`get`](Self::get).
    pub async fn subscriptions(&self, refresh: bool) -> Result<Value, FetchError> {
        self.get(ResourceKind::Subscriptions, &[], refresh).await
    }

    /// # Errors
    ///
    /// See [`get`](Self::get).
    pub async fn resource_groups(
        &self,
        subscription_id: &str,
        refresh: bool,
    ) -> Result<Value, FetchError> {
        self.get(
            ResourceKind::ResourceGroups,
            &[subscription_id.to_string()],
            refresh,
        )
        .await
    }

    /// # Errors
    ///
    /// See [`get`](Self::get).
    pub async fn virtual_machines(
        &self,
        subscription_id: &str,
        resource_group: &str,
        refresh: bool,
    ) -> Result<Value, FetchError> {
        self.get(
            ResourceKind::VirtualMachines,
            &[subscription_id.to_string(), resource_group.to_string()],
            refresh,
        )
        .await
    }

    /// # Errors
    ///
    /// See [`get`](Self::get).
    pub async fn vm_details(
        &self,
        subscription_id: &str,
        resource_group: &str,
        vm_name: &str,
        refresh: bool,
    ) -> Result<Value, FetchError> {
        self.get(
            ResourceKind::VirtualMachineDetails,
            &[
                subscription_id.to_string(),
                resource_group.to_string(),
                vm_name.to_string(),
            ],
            refresh,
        )
        .await
    }

    /// Drop the cached entry of one request
    ///
    /// # Errors
    ///
    /// Returns the backend error if the entry could not be removed.
    pub async fn invalidate(
        &self,
        kind: ResourceKind,
        identity: &[String],
    ) -> Result<(), CacheError> {
        self.layer
            .cache_aside()
            .invalidate(&kind.cache_key(identity))
            .await
    }

    /// Drop every cached resource
    ///
    /// # Errors
    ///
    /// Returns the backend error if the cache could not be cleared.
    pub async fn clear_cache(&self) -> Result<(), CacheError> {
        self.layer.cache_aside().clear().await
    }

    /// Kinds with a registered fetcher
    pub fn supported(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        ResourceKind::ALL
            .into_iter()
            .filter(|kind| self.fetchers.contains_key(kind))
    }

    #[must_use]
    pub fn layer(&self) -> &CacheLayer {
        &self.layer
    }
}

/// Builder for [`ResourceService`]
pub struct ResourceServiceBuilder {
    layer: CacheLayer,
    fetchers: HashMap<ResourceKind, Arc<dyn ResourceFetcher>>,
    ttls: HashMap<ResourceKind, TtlPolicy>,
}

impl ResourceServiceBuilder {
    /// Register the fetcher for `kind`, replacing any earlier one
    #[must_use]
    pub fn with_fetcher(mut self, kind: ResourceKind, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        self.fetchers.insert(kind, fetcher);
        self
    }

    /// TTL for every entry of `kind`
    #[must_use]
    pub fn with_ttl(mut self, kind: ResourceKind, ttl: TtlPolicy) -> Self {
        self.ttls.insert(kind, ttl);
        self
    }

    #[must_use]
    pub fn build(self) -> ResourceService {
        debug!(fetchers = self.fetchers.len(), "Resource service built");
        ResourceService {
            layer: self.layer,
            fetchers: self.fetchers,
            ttls: self.ttls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CacheLayerBuilder;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ResourceFetcher for CountingFetcher {
        async fn fetch(&self, identity: &[String]) -> Result<Value, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({ "identity": identity }))
        }
    }

    async fn service_with(fetcher: Arc<CountingFetcher>) -> ResourceService {
        let layer = CacheLayerBuilder::new()
            .build()
            .await
            .unwrap_or_else(|e| panic!("build failed: {e}"));
        ResourceService::builder(layer)
            .with_fetcher(ResourceKind::ResourceGroups, fetcher.clone())
            .with_fetcher(ResourceKind::VirtualMachineDetails, fetcher)
            .build()
    }

    #[test]
    fn test_keys_differ_by_kind_and_identity() {
        let id = vec!["sub".to_string()];
        assert_ne!(
            ResourceKind::ResourceGroups.cache_key(&id),
            ResourceKind::RouteTables.cache_key(&id)
        );
        assert_ne!(
            ResourceKind::ResourceGroups.cache_key(&id),
            ResourceKind::ResourceGroups.cache_key(&["other".to_string()])
        );
    }

    #[tokio::test]
    async fn test_second_lookup_is_cached() {
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
        });
        let service = service_with(fetcher.clone()).await;

        let first = service.resource_groups("sub-1", false).await.ok();
        let second = service.resource_groups("sub-1", false).await.ok();

        assert_eq!(first, second);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        service.resource_groups("sub-1", true).await.ok();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unregistered_kind_is_unsupported() {
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
        });
        let service = service_with(fetcher).await;

        let result = service.subscriptions(false).await;
        assert!(matches!(
            result,
            Err(FetchError::Unsupported(ResourceKind::Subscriptions))
        ));
    }

    #[tokio::test]
    async fn test_wrong_arity_never_fetches() {
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
        });
        let service = service_with(fetcher.clone()).await;

        let result = service
            .get(ResourceKind::VirtualMachineDetails, &["sub".to_string()], false)
            .await;
        assert!(matches!(result, Err(FetchError::NotFound(_))));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
        });
        let service = service_with(fetcher.clone()).await;
        let identity = ["sub".to_string(), "rg".to_string(), "vm".to_string()];

        service.vm_details("sub", "rg", "vm", false).await.ok();
        service
            .invalidate(ResourceKind::VirtualMachineDetails, &identity)
            .await
            .ok();
        service.vm_details("sub", "rg", "vm", false).await.ok();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_get_typed() {
        #[derive(serde::Deserialize)]
        struct Echo {
            identity: Vec<String>,
        }

        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
        });
        let service = service_with(fetcher).await;

        let echo: Option<Echo> = service
            .get_typed(ResourceKind::ResourceGroups, &["sub-9".to_string()], false)
            .await
            .ok();
        assert_eq!(echo.map(|e| e.identity), Some(vec!["sub-9".to_string()]));

        let wrong: Result<u32, FetchError> = service
            .get_typed(ResourceKind::ResourceGroups, &["sub-9".to_string()], false)
            .await;
        assert!(matches!(
            wrong,
            Err(FetchError::Unavailable(CacheError::Codec(_)))
        ));
    }
}
