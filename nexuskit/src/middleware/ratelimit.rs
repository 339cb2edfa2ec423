//! Rate limit middleware: a wrapper over `nexuskit_ratelimit`'s non-blocking
//! `try_acquire`. A denied acquisition is retried against the same algorithm
//! for up to a configurable `max_wait` before failing the outgoing path with
//! `RateLimitExceeded`; the default `max_wait` of zero preserves the
//! immediate-failure behavior.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use nexuskit_ratelimit::{Algorithm, RateLimitAlgorithm};
use tokio::time::Instant;

use crate::error::{NexusError, Result};
use crate::middleware::{Middleware, MiddlewareContext};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);

pub struct RateLimitMiddleware {
    algorithm: Box<dyn RateLimitAlgorithm>,
    key_metadata: Option<String>,
    max_wait: Duration,
    poll_interval: Duration,
}

impl RateLimitMiddleware {
    pub fn new(descriptor: &Algorithm) -> Self {
        Self {
            algorithm: nexuskit_ratelimit::build(descriptor),
            key_metadata: None,
            max_wait: Duration::ZERO,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Derive the rate-limit bucket key from a metadata field (e.g. a user
    /// id) instead of the connection id.
    pub fn keyed_by_metadata(mut self, field: impl Into<String>) -> Self {
        self.key_metadata = Some(field.into());
        self
    }

    /// Instead of failing on the first denial, poll the algorithm at
    /// `poll_interval` until it allows the request or `max_wait` elapses.
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Overrides the default poll interval used while waiting for budget to
    /// free up. Has no effect unless [`max_wait`](Self::max_wait) is set.
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn key_for(&self, ctx: &MiddlewareContext) -> String {
        match &self.key_metadata {
            Some(field) => ctx.metadata.get(field).cloned().unwrap_or_else(|| ctx.connection_id.clone()),
            None => ctx.connection_id.clone(),
        }
    }
}

impl std::fmt::Debug for RateLimitMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitMiddleware").finish_non_exhaustive()
    }
}

#[async_trait]
impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &str {
        "rate_limit"
    }

    fn priority(&self) -> i32 {
        -50
    }

    async fn handle_outgoing(&self, bytes: Bytes, ctx: &mut MiddlewareContext) -> Result<Bytes> {
        let key = self.key_for(ctx);
        let deadline = Instant::now() + self.max_wait;
        loop {
            match nexuskit_ratelimit::try_acquire_checked(self.algorithm.as_ref(), &key, 1) {
                Ok(_remaining) => return Ok(bytes),
                Err(_exceeded) if Instant::now() < deadline => {
                    tokio::time::sleep(self.poll_interval.min(self.max_wait)).await;
                }
                Err(_exceeded) => return Err(NexusError::RateLimitExceeded),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Endpoint;
    use crate::middleware::Direction;

    #[tokio::test]
    async fn test_denies_once_capacity_exhausted() {
        let mw = RateLimitMiddleware::new(&Algorithm::TokenBucket {
            capacity: 2,
            refill_rate: 0.0001,
        });
        let mut ctx = MiddlewareContext::new("c", Endpoint::tcp("h", 1), Direction::Outgoing);
        assert!(mw.handle_outgoing(Bytes::from_static(b"1"), &mut ctx).await.is_ok());
        assert!(mw.handle_outgoing(Bytes::from_static(b"2"), &mut ctx).await.is_ok());
        let err = mw.handle_outgoing(Bytes::from_static(b"3"), &mut ctx).await.unwrap_err();
        assert!(matches!(err, NexusError::RateLimitExceeded));
    }

    #[tokio::test]
    async fn test_keyed_by_metadata_isolates_buckets() {
        let mw = RateLimitMiddleware::new(&Algorithm::TokenBucket {
            capacity: 1,
            refill_rate: 0.0001,
        })
        .keyed_by_metadata("user_id");
        let mut ctx_a = MiddlewareContext::new("c", Endpoint::tcp("h", 1), Direction::Outgoing);
        ctx_a.metadata.insert("user_id".to_string(), "alice".to_string());
        let mut ctx_b = MiddlewareContext::new("c", Endpoint::tcp("h", 1), Direction::Outgoing);
        ctx_b.metadata.insert("user_id".to_string(), "bob".to_string());

        assert!(mw.handle_outgoing(Bytes::from_static(b"1"), &mut ctx_a).await.is_ok());
        assert!(mw.handle_outgoing(Bytes::from_static(b"1"), &mut ctx_b).await.is_ok());
    }

    #[tokio::test]
    async fn test_max_wait_retries_until_budget_frees_up() {
        let mw = RateLimitMiddleware::new(&Algorithm::TokenBucket {
            capacity: 1,
            refill_rate: 50.0,
        })
        .max_wait(Duration::from_millis(200))
        .poll_interval(Duration::from_millis(10));
        let mut ctx = MiddlewareContext::new("c", Endpoint::tcp("h", 1), Direction::Outgoing);
        assert!(mw.handle_outgoing(Bytes::from_static(b"1"), &mut ctx).await.is_ok());
        // Denied on the first attempt, but the bucket refills fast enough to
        // succeed before max_wait elapses.
        assert!(mw.handle_outgoing(Bytes::from_static(b"2"), &mut ctx).await.is_ok());
    }

    #[tokio::test]
    async fn test_max_wait_still_fails_once_exhausted() {
        let mw = RateLimitMiddleware::new(&Algorithm::TokenBucket {
            capacity: 1,
            refill_rate: 0.0001,
        })
        .max_wait(Duration::from_millis(30))
        .poll_interval(Duration::from_millis(10));
        let mut ctx = MiddlewareContext::new("c", Endpoint::tcp("h", 1), Direction::Outgoing);
        assert!(mw.handle_outgoing(Bytes::from_static(b"1"), &mut ctx).await.is_ok());
        let err = mw.handle_outgoing(Bytes::from_static(b"2"), &mut ctx).await.unwrap_err();
        assert!(matches!(err, NexusError::RateLimitExceeded));
    }
}
