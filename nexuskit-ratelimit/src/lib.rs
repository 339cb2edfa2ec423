//! Non-blocking rate limiting for NexusKit's middleware pipeline.
//!
//! Every algorithm exposes `try_acquire(key, cost)`, returning immediately
//! with an allow/deny decision and the remaining budget — there is no
//! blocking or queueing variant, matching a connection runtime that must
//! never stall a send on rate-limit bookkeeping.

pub mod algorithms;
mod error;

pub use algorithms::{Algorithm, Concurrent, FixedWindow, LeakyBucket, RateLimitAlgorithm, SlidingWindow, TokenBucket};
pub use error::RateLimitError;

pub type Result<T> = std::result::Result<T, RateLimitError>;

/// Attempts to spend `cost` units of `key`'s budget and translates a denial
/// into a typed [`RateLimitError::Exceeded`] carrying the key, cost, and
/// remaining budget, instead of the bare `(bool, u64)` [`RateLimitAlgorithm::try_acquire`] returns.
pub fn try_acquire_checked(algorithm: &dyn RateLimitAlgorithm, key: &str, cost: u64) -> Result<u64> {
    let (allowed, remaining) = algorithm.try_acquire(key, cost);
    if allowed {
        Ok(remaining)
    } else {
        nexuskit_log::warn!("rate limit exceeded for key '{}': {} requested, {} remaining", key, cost, remaining);
        Err(RateLimitError::Exceeded { key: key.to_string(), cost, remaining })
    }
}

/// Builds the configured [`RateLimitAlgorithm`] implementation for an
/// [`Algorithm`] descriptor.
pub fn build(algorithm: &Algorithm) -> Box<dyn RateLimitAlgorithm> {
    match algorithm {
        Algorithm::TokenBucket { capacity, refill_rate } => {
            Box::new(TokenBucket::new(*capacity, *refill_rate))
        }
        Algorithm::LeakyBucket { capacity, leak_rate } => {
            Box::new(LeakyBucket::new(*capacity, *leak_rate))
        }
        Algorithm::FixedWindow { max_requests, window } => {
            Box::new(FixedWindow::new(*max_requests, *window))
        }
        Algorithm::SlidingWindow { max_requests, window } => {
            Box::new(SlidingWindow::new(*max_requests, *window))
        }
        Algorithm::Concurrent { max_in_flight } => Box::new(Concurrent::new(*max_in_flight)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_acquire_checked_ok_on_allow() {
        let algo = build(&Algorithm::TokenBucket { capacity: 2, refill_rate: 1.0 });
        assert_eq!(try_acquire_checked(algo.as_ref(), "k", 1).unwrap(), 1);
    }

    #[test]
    fn test_try_acquire_checked_exceeded_on_deny() {
        let algo = build(&Algorithm::TokenBucket { capacity: 1, refill_rate: 0.0001 });
        try_acquire_checked(algo.as_ref(), "k", 1).unwrap();
        let err = try_acquire_checked(algo.as_ref(), "k", 1).unwrap_err();
        assert!(matches!(err, RateLimitError::Exceeded { .. }));
    }
}
