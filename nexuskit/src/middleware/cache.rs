//! Cache middleware: fingerprints the outgoing request and short-circuits
//! with a cached response when the two-level store holds one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use nexuskit_cache::{fingerprint_hex, CacheStore, TieredCache, TieredCacheConfig};

use crate::error::{NexusError, Result};
use crate::middleware::{Middleware, MiddlewareContext};

/// Marker stashed in the context metadata when `handle_outgoing` serves a
/// cached response, so the runtime knows to short-circuit the actual send.
pub const CACHE_HIT_METADATA_KEY: &str = "nexuskit.cache_hit";

pub struct CacheMiddleware<L1: CacheStore, L2: CacheStore> {
    cache: TieredCache<L1, L2>,
    ttl: Option<Duration>,
    salt: Option<Vec<u8>>,
}

impl<L1: CacheStore, L2: CacheStore> CacheMiddleware<L1, L2> {
    pub fn new(
        l1: Arc<L1>,
        l2: Arc<L2>,
        config: TieredCacheConfig,
        ttl: Option<Duration>,
        salt: Option<Vec<u8>>,
    ) -> Self {
        Self {
            cache: TieredCache::with_config(l1, l2, config),
            ttl,
            salt,
        }
    }

    fn key_for(&self, bytes: &[u8]) -> String {
        fingerprint_hex(bytes, self.salt.as_deref())
    }
}

#[async_trait]
impl<L1: CacheStore, L2: CacheStore> Middleware for CacheMiddleware<L1, L2> {
    fn name(&self) -> &str {
        "cache"
    }

    fn priority(&self) -> i32 {
        100 // runs last outgoing (closest to the caller), first incoming
    }

    async fn handle_outgoing(&self, bytes: Bytes, ctx: &mut MiddlewareContext) -> Result<Bytes> {
        let key = self.key_for(&bytes);
        match self.cache.get(&key).await {
            Ok(Some(cached)) => {
                ctx.metadata.insert(CACHE_HIT_METADATA_KEY.to_string(), key);
                Ok(Bytes::from(cached))
            }
            Ok(None) => {
                ctx.metadata.insert("nexuskit.cache_key".to_string(), key);
                Ok(bytes)
            }
            Err(e) => Err(NexusError::MiddlewareError {
                name: "cache".to_string(),
                underlying: e.to_string(),
            }),
        }
    }

    async fn handle_incoming(&self, bytes: Bytes, ctx: &mut MiddlewareContext) -> Result<Bytes> {
        if let Some(key) = ctx.metadata.get("nexuskit.cache_key").cloned() {
            let _ = self.cache.set(&key, bytes.to_vec(), self.ttl).await;
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Endpoint;
    use crate::middleware::Direction;
    use nexuskit_cache::{EvictingCache, EvictionPolicy};

    fn middleware() -> CacheMiddleware<EvictingCache, EvictingCache> {
        let l1 = Arc::new(EvictingCache::new(EvictionPolicy::Lru, 100));
        let l2 = Arc::new(EvictingCache::new(EvictionPolicy::Lru, 100));
        CacheMiddleware::new(l1, l2, TieredCacheConfig::default(), None, None)
    }

    #[tokio::test]
    async fn test_miss_then_populate_then_hit() {
        let mw = middleware();
        let mut ctx = MiddlewareContext::new("c", Endpoint::tcp("h", 1), Direction::Outgoing);

        let request = Bytes::from_static(b"request-payload");
        let passthrough = mw.handle_outgoing(request.clone(), &mut ctx).await.unwrap();
        assert_eq!(passthrough, request);
        assert!(!ctx.metadata.contains_key(CACHE_HIT_METADATA_KEY));

        let response = Bytes::from_static(b"response-payload");
        mw.handle_incoming(response.clone(), &mut ctx).await.unwrap();

        let mut ctx2 = MiddlewareContext::new("c", Endpoint::tcp("h", 1), Direction::Outgoing);
        let served = mw.handle_outgoing(request, &mut ctx2).await.unwrap();
        assert_eq!(served, response);
        assert!(ctx2.metadata.contains_key(CACHE_HIT_METADATA_KEY));
    }
}
