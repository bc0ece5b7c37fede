//! Error types
//!
//! `CacheError` covers everything the cache layer itself can fail with. Only
//! `ConfigurationInvalid` (at startup) and `GateClosed` (at shutdown) ever reach
//! callers; the other variants are absorbed by the factory or the cache-aside
//! wrapper and show up as extra latency at most.
//!
//! `FetchError` is the upstream failure type handed to resource fetchers. It is
//! propagated to callers unchanged and never cached.

use std::time::Duration;

use crate::service::ResourceKind;

/// Boxed error carried by backend failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the cache layer
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The distributed backend could not be reached while starting up
    #[error("{backend} backend unavailable: {reason}")]
    BackendUnavailable {
        backend: &'static str,
        reason: String,
    },

    /// A single backend operation failed at runtime
    #[error("{backend} {operation} failed: {source}")]
    BackendOperationFailed {
        backend: &'static str,
        operation: &'static str,
        #[source]
        source: BoxError,
    },

    /// A value could not be encoded for, or decoded from, the backend
    #[error("codec error: {0}")]
    Codec(String),

    /// Startup configuration was rejected
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    /// The concurrency gate was closed and no longer admits upstream calls
    #[error("concurrency gate closed")]
    GateClosed,
}

impl CacheError {
    /// Wrap a backend error for the named operation.
    pub fn operation(
        backend: &'static str,
        operation: &'static str,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::BackendOperationFailed {
            backend,
            operation,
            source: source.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::ConfigurationInvalid(message.into())
    }
}

/// Failures reported by resource fetchers
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("upstream throttled the request")]
    Throttled { retry_after: Option<Duration> },

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("upstream rejected the credentials")]
    Unauthorized,

    #[error("upstream call timed out")]
    Timeout,

    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("no fetcher registered for {0}")]
    Unsupported(ResourceKind),

    #[error(transparent)]
    Unavailable(#[from] CacheError),
}

/// Coarse category of a failure, safe to log.
///
/// Upstream errors can carry raw response bodies; only this category is
/// written to the log by the cache-aside wrapper.
pub trait FailureKind {
    fn failure_kind(&self) -> &'static str;
}

impl FailureKind for FetchError {
    fn failure_kind(&self) -> &'static str {
        match self {
            Self::Throttled { .. } => "throttled",
            Self::NotFound(_) => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::Timeout => "timeout",
            Self::Upstream { .. } => "upstream",
            Self::Unsupported(_) => "unsupported",
            Self::Unavailable(_) => "unavailable",
        }
    }
}

impl FailureKind for CacheError {
    fn failure_kind(&self) -> &'static str {
        match self {
            Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::BackendOperationFailed { .. } => "backend_operation_failed",
            Self::Codec(_) => "codec",
            Self::ConfigurationInvalid(_) => "configuration_invalid",
            Self::GateClosed => "gate_closed",
        }
    }
}

impl FailureKind for anyhow::Error {
    fn failure_kind(&self) -> &'static str {
        match self.downcast_ref::<FetchError>() {
            Some(fetch) => fetch.failure_kind(),
            None => "upstream",
        }
    }
}
