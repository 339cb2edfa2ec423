//! Per-level eviction strategies: least-recently-used, least-frequently-used,
//! first-in-first-out, TTL-only expiry, and a byte-size budget.

use crate::error::CacheResult;
use crate::traits::CacheStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Evict the entry that hasn't been read in the longest time.
    Lru,
    /// Evict the entry with the fewest reads.
    Lfu,
    /// Evict the oldest-inserted entry regardless of access pattern.
    Fifo,
    /// Never evict on capacity pressure; rely solely on TTL expiry.
    Ttl,
    /// Evict largest-first once the store's total byte size exceeds a budget.
    SizeBased { max_bytes: usize },
}

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
    inserted_at: Instant,
    last_accessed: Instant,
    access_count: u64,
}

/// Bounded in-memory cache applying one [`EvictionPolicy`] once `max_entries`
/// (or, for `SizeBased`, a byte budget) is exceeded.
pub struct EvictingCache {
    data: Arc<RwLock<HashMap<String, Entry>>>,
    policy: EvictionPolicy,
    max_entries: usize,
}

impl EvictingCache {
    pub fn new(policy: EvictionPolicy, max_entries: usize) -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            policy,
            max_entries,
        }
    }

    async fn evict_if_needed(&self, data: &mut HashMap<String, Entry>) {
        match self.policy {
            EvictionPolicy::SizeBased { max_bytes } => {
                let mut total: usize = data.values().map(|e| e.value.len()).sum();
                while total > max_bytes && !data.is_empty() {
                    if let Some(key) = data
                        .iter()
                        .max_by_key(|(_, e)| e.value.len())
                        .map(|(k, _)| k.clone())
                    {
                        if let Some(removed) = data.remove(&key) {
                            total -= removed.value.len();
                        }
                    } else {
                        break;
                    }
                }
            }
            EvictionPolicy::Ttl => {}
            _ if data.len() > self.max_entries => {
                let victim = match self.policy {
                    EvictionPolicy::Lru => data
                        .iter()
                        .min_by_key(|(_, e)| e.last_accessed)
                        .map(|(k, _)| k.clone()),
                    EvictionPolicy::Lfu => data
                        .iter()
                        .min_by_key(|(_, e)| e.access_count)
                        .map(|(k, _)| k.clone()),
                    EvictionPolicy::Fifo => data
                        .iter()
                        .min_by_key(|(_, e)| e.inserted_at)
                        .map(|(k, _)| k.clone()),
                    _ => None,
                };
                if let Some(key) = victim {
                    data.remove(&key);
                }
            }
            _ => {}
        }
    }
}

#[async_trait]
impl CacheStore for EvictingCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut data = self.data.write().await;
        let now = Instant::now();
        let expired = data
            .get(key)
            .and_then(|e| e.expires_at)
            .map(|exp| exp <= now)
            .unwrap_or(false);
        if expired {
            data.remove(key);
            return Ok(None);
        }
        if let Some(entry) = data.get_mut(key) {
            entry.last_accessed = now;
            entry.access_count += 1;
            Ok(Some(entry.value.clone()))
        } else {
            Ok(None)
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        let mut data = self.data.write().await;
        let now = Instant::now();
        data.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: ttl.map(|d| now + d),
                inserted_at: now,
                last_accessed: now,
                access_count: 0,
            },
        );
        self.evict_if_needed(&mut data).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.data.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> CacheResult<()> {
        self.data.write().await.clear();
        Ok(())
    }

    async fn len(&self) -> usize {
        self.data.read().await.len()
    }
}
