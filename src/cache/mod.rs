//! Cache layer
//!
//! Process-local cache (moka) for the public read surface. Keys are
//! namespaced (`news:*`) so a write can drop a whole namespace at once.
//!
//! ```rust,ignore
//! let cache = create_cache(&config.cache);
//! cache.set(&keys::news_slug("launch"), &news, cache.default_ttl()).await?;
//! cache.delete_pattern(keys::NEWS_PATTERN).await?;
//! ```

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
/// The generic methods make this trait unusable as `dyn CacheLayer`; share
/// the concrete cache through [`SharedCache`] instead.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete all values whose key matches a glob pattern
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

pub type SharedCache = Arc<MemoryCache>;

/// Create the cache from configuration
pub fn create_cache(config: &CacheConfig) -> SharedCache {
    Arc::new(MemoryCache::with_capacity_and_ttl(
        config.max_capacity,
        Duration::from_secs(config.ttl_seconds),
    ))
}

/// Cache key builders
pub mod keys {
    /// Matches every news entry
    pub const NEWS_PATTERN: &str = "news:*";

    pub fn news_list(page: u32, per_page: u32, locale: Option<&str>) -> String {
        format!("news:list:{}:{}:{}", page, per_page, locale.unwrap_or("all"))
    }

    pub fn news_slug(slug: &str) -> String {
        format!("news:slug:{}", slug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_cache_from_config() {
        let config = CacheConfig {
            ttl_seconds: 1800,
            max_capacity: 10,
        };
        let cache = create_cache(&config);
        assert_eq!(cache.default_ttl(), Duration::from_secs(1800));

        cache.set("key", &"value".to_string(), cache.default_ttl()).await.unwrap();
        let result: Option<String> = cache.get("key").await.unwrap();
        assert_eq!(result, Some("value".to_string()));
    }

    #[test]
    fn test_news_keys_fall_under_pattern() {
        assert!(MemoryCache::pattern_matches(keys::NEWS_PATTERN, &keys::news_list(1, 10, None)));
        assert!(MemoryCache::pattern_matches(keys::NEWS_PATTERN, &keys::news_slug("launch")));
        assert_eq!(keys::news_list(2, 5, Some("en")), "news:list:2:5:en");
    }
}
