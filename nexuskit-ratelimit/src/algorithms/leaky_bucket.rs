//! Leaky bucket: requests fill a bucket that drains at a constant
//! `leak_rate`; a request is denied once the bucket would overflow
//! `capacity`. Smooths bursts into a steady outflow, the mirror image of
//! the token bucket's burst-then-refill model.

use super::RateLimitAlgorithm;
use dashmap::DashMap;
use std::time::Instant;

#[derive(Debug, Clone)]
struct BucketState {
    level: f64,
    last_leak: Instant,
}

pub struct LeakyBucket {
    capacity: u64,
    leak_rate: f64,
    buckets: DashMap<String, BucketState>,
}

impl LeakyBucket {
    /// Panics if `capacity` is 0 or `leak_rate` is not positive.
    pub fn new(capacity: u64, leak_rate: f64) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");
        assert!(leak_rate > 0.0, "leak_rate must be greater than 0");
        Self {
            capacity,
            leak_rate,
            buckets: DashMap::new(),
        }
    }

    fn leak(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_leak).as_secs_f64();
        state.level = (state.level - elapsed * self.leak_rate).max(0.0);
        state.last_leak = now;
    }
}

impl RateLimitAlgorithm for LeakyBucket {
    fn try_acquire(&self, key: &str, cost: u64) -> (bool, u64) {
        let mut entry = self.buckets.entry(key.to_string()).or_insert_with(|| BucketState {
            level: 0.0,
            last_leak: Instant::now(),
        });
        self.leak(&mut entry);

        let cost = cost as f64;
        if entry.level + cost <= self.capacity as f64 {
            entry.level += cost;
            (true, (self.capacity as f64 - entry.level) as u64)
        } else {
            (false, (self.capacity as f64 - entry.level).max(0.0) as u64)
        }
    }

    fn reset(&self, key: &str) {
        self.buckets.remove(key);
    }

    fn remaining(&self, key: &str) -> u64 {
        self.buckets
            .get(key)
            .map(|s| (self.capacity as f64 - s.level).max(0.0) as u64)
            .unwrap_or(self.capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fills_and_denies() {
        let bucket = LeakyBucket::new(3, 1.0);
        assert!(bucket.try_acquire("k", 1).0);
        assert!(bucket.try_acquire("k", 1).0);
        assert!(bucket.try_acquire("k", 1).0);
        assert!(!bucket.try_acquire("k", 1).0);
    }

    #[test]
    fn test_remaining_starts_at_capacity() {
        let bucket = LeakyBucket::new(5, 2.0);
        assert_eq!(bucket.remaining("k"), 5);
    }
}
