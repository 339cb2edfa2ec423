//! Token bucket: tokens accrue at `refill_rate` per second up to `capacity`;
//! each request spends tokens equal to its cost.

use super::RateLimitAlgorithm;
use dashmap::DashMap;
use std::time::Instant;

#[derive(Debug, Clone)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

pub struct TokenBucket {
    capacity: u64,
    refill_rate: f64,
    buckets: DashMap<String, BucketState>,
}

impl TokenBucket {
    /// Panics if `capacity` is 0 or `refill_rate` is not positive.
    pub fn new(capacity: u64, refill_rate: f64) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");
        assert!(refill_rate > 0.0, "refill_rate must be greater than 0");
        Self {
            capacity,
            refill_rate,
            buckets: DashMap::new(),
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity as f64);
        state.last_refill = now;
    }
}

impl RateLimitAlgorithm for TokenBucket {
    fn try_acquire(&self, key: &str, cost: u64) -> (bool, u64) {
        let mut entry = self.buckets.entry(key.to_string()).or_insert_with(|| BucketState {
            tokens: self.capacity as f64,
            last_refill: Instant::now(),
        });
        self.refill(&mut entry);

        let cost = cost as f64;
        if entry.tokens >= cost {
            entry.tokens -= cost;
            (true, entry.tokens as u64)
        } else {
            (false, entry.tokens as u64)
        }
    }

    fn reset(&self, key: &str) {
        self.buckets.insert(
            key.to_string(),
            BucketState {
                tokens: self.capacity as f64,
                last_refill: Instant::now(),
            },
        );
    }

    fn remaining(&self, key: &str) -> u64 {
        self.buckets.get(key).map(|s| s.tokens as u64).unwrap_or(self.capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_capacity() {
        let bucket = TokenBucket::new(10, 1.0);
        assert_eq!(bucket.remaining("k"), 10);
    }

    #[test]
    fn test_consume_and_deny() {
        let bucket = TokenBucket::new(3, 1.0);
        assert!(bucket.try_acquire("k", 1).0);
        assert!(bucket.try_acquire("k", 1).0);
        assert!(bucket.try_acquire("k", 1).0);
        assert!(!bucket.try_acquire("k", 1).0);
    }

    #[test]
    fn test_cost_greater_than_one() {
        let bucket = TokenBucket::new(10, 1.0);
        let (allowed, remaining) = bucket.try_acquire("k", 4);
        assert!(allowed);
        assert_eq!(remaining, 6);
        assert!(!bucket.try_acquire("k", 100).0);
    }

    #[test]
    fn test_reset() {
        let bucket = TokenBucket::new(2, 1.0);
        bucket.try_acquire("k", 2);
        assert!(!bucket.try_acquire("k", 1).0);
        bucket.reset("k");
        assert_eq!(bucket.remaining("k"), 2);
    }
}
