//! Cache Backend Implementations
//!
//! # Available Backends
//!
//! - **`DisabledCache`** - Stores nothing; every read misses
//! - **`LocalCache`** - In-process table with per-key TTL (default)
//! - **`RedisCache`** - Distributed cache with native expiry (feature: `redis`)
//!
//! # Usage
//!
//! ```rust,no_run
//! use rm_proxy_cache::backends::{LocalCache, RedisCache};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), rm_proxy_cache::CacheError> {
//! let local = LocalCache::new();
//! let redis = RedisCache::connect("redis://localhost:6379/0", "rm_proxy:", Duration::from_secs(2)).await?;
//! # Ok(())
//! # }
//! ```
//!
//! Most callers never construct a backend directly; see [`crate::factory::create_cache`].

pub mod disabled_cache;
pub mod local_cache;

#[cfg(feature = "redis")]
pub mod redis_cache;

pub use disabled_cache::DisabledCache;
pub use local_cache::LocalCache;

#[cfg(feature = "redis")]
pub use redis_cache::RedisCache;
