//! Rate limiting algorithms.
//!
//! - **Token bucket**: smooth limiting with burst capacity.
//! - **Leaky bucket**: smooths bursts into a constant outflow rate.
//! - **Fixed window**: simple counter reset on a wall-clock boundary.
//! - **Sliding window**: weighted blend of the current and previous window.
//! - **Concurrent**: caps requests in flight rather than requests per time.

mod concurrent;
mod fixed_window;
mod leaky_bucket;
mod sliding_window;
mod token_bucket;

pub use concurrent::Concurrent;
pub use fixed_window::FixedWindow;
pub use leaky_bucket::LeakyBucket;
pub use sliding_window::SlidingWindow;
pub use token_bucket::TokenBucket;

use std::time::Duration;

/// Rate limiting algorithm descriptor, used to construct a concrete limiter
/// via [`crate::build`].
#[derive(Debug, Clone)]
pub enum Algorithm {
    TokenBucket { capacity: u64, refill_rate: f64 },
    LeakyBucket { capacity: u64, leak_rate: f64 },
    FixedWindow { max_requests: u64, window: Duration },
    SlidingWindow { max_requests: u64, window: Duration },
    Concurrent { max_in_flight: u64 },
}

impl Algorithm {
    pub fn token_bucket_default() -> Self {
        Self::TokenBucket {
            capacity: 100,
            refill_rate: 10.0,
        }
    }

    pub fn leaky_bucket_default() -> Self {
        Self::LeakyBucket {
            capacity: 100,
            leak_rate: 10.0,
        }
    }

    pub fn fixed_window_default() -> Self {
        Self::FixedWindow {
            max_requests: 100,
            window: Duration::from_secs(60),
        }
    }

    pub fn sliding_window_default() -> Self {
        Self::SlidingWindow {
            max_requests: 100,
            window: Duration::from_secs(60),
        }
    }

    pub fn limit(&self) -> u64 {
        match self {
            Algorithm::TokenBucket { capacity, .. } => *capacity,
            Algorithm::LeakyBucket { capacity, .. } => *capacity,
            Algorithm::FixedWindow { max_requests, .. } => *max_requests,
            Algorithm::SlidingWindow { max_requests, .. } => *max_requests,
            Algorithm::Concurrent { max_in_flight } => *max_in_flight,
        }
    }
}

/// Non-blocking rate limiting decision surface shared by every algorithm.
pub trait RateLimitAlgorithm: Send + Sync {
    /// Attempt to spend `cost` units of budget for `key`. Returns `(allowed,
    /// remaining)`; `remaining` is best-effort and may be 0 on denial.
    fn try_acquire(&self, key: &str, cost: u64) -> (bool, u64);

    fn reset(&self, key: &str);

    fn remaining(&self, key: &str) -> u64;
}
