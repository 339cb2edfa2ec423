//! Concurrent limiter: caps requests in flight rather than requests per
//! time window. A caller must release what it acquires; this crate's
//! `try_acquire` only reserves slots, the middleware layer is responsible
//! for releasing them once a request completes.

use super::RateLimitAlgorithm;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct Concurrent {
    max_in_flight: u64,
    in_flight: DashMap<String, AtomicU64>,
}

impl Concurrent {
    pub fn new(max_in_flight: u64) -> Self {
        assert!(max_in_flight > 0, "max_in_flight must be greater than 0");
        Self {
            max_in_flight,
            in_flight: DashMap::new(),
        }
    }

    /// Release `cost` previously-acquired slots for `key`.
    pub fn release(&self, key: &str, cost: u64) {
        if let Some(counter) = self.in_flight.get(key) {
            counter.fetch_sub(cost.min(counter.load(Ordering::SeqCst)), Ordering::SeqCst);
        }
    }
}

impl RateLimitAlgorithm for Concurrent {
    fn try_acquire(&self, key: &str, cost: u64) -> (bool, u64) {
        let counter = self
            .in_flight
            .entry(key.to_string())
            .or_insert_with(|| AtomicU64::new(0));
        let current = counter.load(Ordering::SeqCst);
        if current + cost <= self.max_in_flight {
            counter.fetch_add(cost, Ordering::SeqCst);
            (true, self.max_in_flight - current - cost)
        } else {
            (false, self.max_in_flight.saturating_sub(current))
        }
    }

    fn reset(&self, key: &str) {
        self.in_flight.remove(key);
    }

    fn remaining(&self, key: &str) -> u64 {
        self.in_flight
            .get(key)
            .map(|c| self.max_in_flight.saturating_sub(c.load(Ordering::SeqCst)))
            .unwrap_or(self.max_in_flight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_release() {
        let limiter = Concurrent::new(2);
        assert!(limiter.try_acquire("k", 1).0);
        assert!(limiter.try_acquire("k", 1).0);
        assert!(!limiter.try_acquire("k", 1).0);
        limiter.release("k", 1);
        assert!(limiter.try_acquire("k", 1).0);
    }
}
