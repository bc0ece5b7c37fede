//! Cache keys and TTL policy
//!
//! Every cached upstream operation is addressed by a [`CacheKey`] built from the
//! operation name followed by the ordered identity components of the resource,
//! e.g. `virtual_machines:<subscription>:<resource group>`.

use std::fmt;
use std::time::Duration;

const SEPARATOR: char = ':';

/// Deterministic key for one logical upstream request
///
/// Components are percent-escaped so that a `:` inside a resource name can not
/// shift segment boundaries, and empty components keep their position. Two
/// requests differing in any component therefore never share a key.
///
/// ```
/// use rm_proxy_cache::CacheKey;
///
/// let key = CacheKey::new("resource_groups").component("sub-1");
/// assert_eq!(key.as_str(), "resource_groups:sub-1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Start a key for the given operation discriminator
    #[must_use]
    pub fn new(operation: &str) -> Self {
        let mut key = String::with_capacity(operation.len() + 32);
        push_escaped(&mut key, operation);
        Self(key)
    }

    /// Append one identity component
    #[must_use]
    pub fn component(mut self, component: impl AsRef<str>) -> Self {
        self.0.push(SEPARATOR);
        push_escaped(&mut self.0, component.as_ref());
        self
    }

    /// Build a key from an operation and its ordered components
    #[must_use]
    pub fn from_parts<I, S>(operation: &str, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        components
            .into_iter()
            .fold(Self::new(operation), |key, part| key.component(part))
    }

    /// Wrap an already-built key verbatim
    #[must_use]
    pub fn raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn push_escaped(out: &mut String, part: &str) {
    for ch in part.chars() {
        match ch {
            '%' => out.push_str("%25"),
            SEPARATOR => out.push_str("%3A"),
            other => out.push(other),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

/// TTL choice for a class of cached operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TtlPolicy {
    /// Use the configured default TTL
    #[default]
    Default,
    /// Entry-specific TTL
    Custom(Duration),
    /// Never expire; only `delete`/`clear` remove the entry
    NoExpiry,
}

impl TtlPolicy {
    /// TTL override to hand to the cache-aside wrapper (`None` = default)
    #[must_use]
    pub fn as_override(self) -> Option<Duration> {
        match self {
            Self::Default => None,
            Self::Custom(ttl) => Some(ttl),
            Self::NoExpiry => Some(Duration::ZERO),
        }
    }
}

/// Resolve the TTL an entry is actually written with.
///
/// Returns `None` when the entry must not expire.
#[must_use]
pub fn effective_ttl(ttl_override: Option<Duration>, default_ttl: Duration) -> Option<Duration> {
    let ttl = ttl_override.unwrap_or(default_ttl);
    (!ttl.is_zero()).then_some(ttl)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_requests_share_key() {
        let a = CacheKey::from_parts("virtual_machines", ["sub-1", "rg-web"]);
        let b = CacheKey::new("virtual_machines")
            .component("sub-1")
            .component("rg-web");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "virtual_machines:sub-1:rg-web");
    }

    #[test]
    fn test_separator_inside_component_does_not_collide() {
        let split = CacheKey::from_parts("op", ["a", "b"]);
        let joined = CacheKey::from_parts("op", ["a:b"]);
        assert_ne!(split, joined);
        assert_eq!(joined.as_str(), "op:a%3Ab");
    }

    #[test]
    fn test_empty_components_keep_position() {
        let with_empty = CacheKey::from_parts("op", ["a", ""]);
        let without = CacheKey::from_parts("op", ["a"]);
        assert_ne!(with_empty, without);
    }

    #[test]
    fn test_operation_discriminates() {
        let a = CacheKey::from_parts("resource_groups", ["sub-1"]);
        let b = CacheKey::from_parts("route_tables", ["sub-1"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_escape_is_unambiguous() {
        let literal = CacheKey::from_parts("op", ["%3A"]);
        let colon = CacheKey::from_parts("op", [":"]);
        assert_ne!(literal, colon);
    }

    #[test]
    fn test_raw_key_is_kept_verbatim() {
        let raw = CacheKey::raw("op:a%3Ab:c");
        assert_eq!(raw.as_str(), "op:a%3Ab:c");
        assert_eq!(raw, CacheKey::from_parts("op", ["a:b", "c"]));
        assert_ne!(CacheKey::raw("op:a:b"), CacheKey::from_parts("op", ["a:b"]));
        assert_eq!(String::from(CacheKey::raw("legacy:key")), "legacy:key");
    }

    #[test]
    fn test_effective_ttl() {
        let default = Duration::from_secs(3600);
        assert_eq!(effective_ttl(None, default), Some(default));
        assert_eq!(
            effective_ttl(Some(Duration::from_secs(5)), default),
            Some(Duration::from_secs(5))
        );
        assert_eq!(effective_ttl(Some(Duration::ZERO), default), None);
        assert_eq!(effective_ttl(None, Duration::ZERO), None);
    }

    #[test]
    fn test_ttl_policy_override() {
        assert_eq!(TtlPolicy::Default.as_override(), None);
        assert_eq!(TtlPolicy::NoExpiry.as_override(), Some(Duration::ZERO));
        assert_eq!(
            TtlPolicy::Custom(Duration::from_secs(60)).as_override(),
            Some(Duration::from_secs(60))
        );
    }
}
