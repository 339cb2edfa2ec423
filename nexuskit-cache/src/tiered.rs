//! Two-level cache: a fast local L1 in front of a (typically larger, slower)
//! L2. Each level has its own eviction policy.

use crate::error::CacheResult;
use crate::traits::CacheStore;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TieredCacheConfig {
    pub enable_l1: bool,
    pub enable_l2: bool,
    pub write_through: bool,
    pub promote_to_l1: bool,
    pub l1_ttl_fraction: f64,
}

impl Default for TieredCacheConfig {
    fn default() -> Self {
        Self {
            enable_l1: true,
            enable_l2: true,
            write_through: true,
            promote_to_l1: true,
            l1_ttl_fraction: 0.25,
        }
    }
}

pub struct TieredCache<L1, L2>
where
    L1: CacheStore,
    L2: CacheStore,
{
    l1: Arc<L1>,
    l2: Arc<L2>,
    config: TieredCacheConfig,
}

impl<L1, L2> TieredCache<L1, L2>
where
    L1: CacheStore,
    L2: CacheStore,
{
    pub fn new(l1: Arc<L1>, l2: Arc<L2>) -> Self {
        Self::with_config(l1, l2, TieredCacheConfig::default())
    }

    pub fn with_config(l1: Arc<L1>, l2: Arc<L2>, config: TieredCacheConfig) -> Self {
        Self { l1, l2, config }
    }

    pub async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        if self.config.enable_l1 {
            if let Some(value) = self.l1.get(key).await? {
                return Ok(Some(value));
            }
        }

        if self.config.enable_l2 {
            if let Some(value) = self.l2.get(key).await? {
                if self.config.enable_l1 && self.config.promote_to_l1 {
                    let _ = self.l1.set(key, value.clone(), None).await;
                }
                return Ok(Some(value));
            }
        }

        Ok(None)
    }

    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        if self.config.enable_l2 {
            self.l2.set(key, value.clone(), ttl).await?;
        }
        if self.config.enable_l1 && (self.config.write_through || !self.config.enable_l2) {
            let l1_ttl = ttl.map(|d| Duration::from_secs_f64(d.as_secs_f64() * self.config.l1_ttl_fraction));
            self.l1.set(key, value, l1_ttl).await?;
        }
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        if self.config.enable_l1 {
            self.l1.delete(key).await?;
        }
        if self.config.enable_l2 {
            self.l2.delete(key).await?;
        }
        Ok(())
    }

    pub async fn clear(&self) -> CacheResult<()> {
        if self.config.enable_l1 {
            self.l1.clear().await?;
        }
        if self.config.enable_l2 {
            self.l2.clear().await?;
        }
        Ok(())
    }
}

impl<L1, L2> Clone for TieredCache<L1, L2>
where
    L1: CacheStore,
    L2: CacheStore,
{
    fn clone(&self) -> Self {
        Self {
            l1: self.l1.clone(),
            l2: self.l2.clone(),
            config: self.config.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eviction::{EvictingCache, EvictionPolicy};

    #[tokio::test]
    async fn test_promotion_from_l2() {
        let l1 = Arc::new(EvictingCache::new(EvictionPolicy::Lru, 100));
        let l2 = Arc::new(EvictingCache::new(EvictionPolicy::Lru, 100));
        let cache = TieredCache::new(l1.clone(), l2.clone());

        l2.set("key", b"value".to_vec(), None).await.unwrap();
        let value = cache.get("key").await.unwrap();
        assert_eq!(value, Some(b"value".to_vec()));
        assert!(l1.get("key").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_set_writes_through() {
        let l1 = Arc::new(EvictingCache::new(EvictionPolicy::Lru, 100));
        let l2 = Arc::new(EvictingCache::new(EvictionPolicy::Lru, 100));
        let cache = TieredCache::new(l1.clone(), l2.clone());

        cache.set("k", b"v".to_vec(), None).await.unwrap();
        assert!(l1.get("k").await.unwrap().is_some());
        assert!(l2.get("k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_clears_both_tiers() {
        let l1 = Arc::new(EvictingCache::new(EvictionPolicy::Lru, 100));
        let l2 = Arc::new(EvictingCache::new(EvictionPolicy::Lru, 100));
        let cache = TieredCache::new(l1, l2);

        cache.set("k", b"v".to_vec(), None).await.unwrap();
        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }
}
