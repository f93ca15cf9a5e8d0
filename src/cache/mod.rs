//! Cache layer
//!
//! In-process caching for rendered output that is expensive to rebuild and
//! cheap to invalidate: the RSS document and public page lookups. Writers
//! drop the affected keys after every change.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

pub use memory::MemoryCache;

/// Cache layer trait
///
/// The generic methods keep this trait off `dyn`; services hold a concrete
/// `Arc<MemoryCache>`.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete all values matching a glob pattern
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// Keys shared between the services that fill and drop them
pub mod keys {
    pub const FEED: &str = "feed:rss";
    pub const PAGE_PATTERN: &str = "page:*";

    pub fn page(code: &str) -> String {
        format!("page:{}", code)
    }
}

/// Create the cache described by `config`
pub fn create_cache(config: &CacheConfig) -> Arc<MemoryCache> {
    let ttl = Duration::from_secs(config.ttl_seconds);
    Arc::new(MemoryCache::with_capacity_and_ttl(10_000, ttl))
}
