//! Reconnection strategies and the attempt-tracking controller that drives
//! the connection runtime's retry loop after a network-error disconnect.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::error::NexusError;

/// Decides whether and when to retry after a connection loss.
pub trait ReconnectStrategy: Send + Sync {
    fn should_reconnect(&self, error: &NexusError) -> bool;
    /// `attempt` is 1-indexed. `None` terminates reconnection.
    fn next_delay(&self, attempt: u32, last_error: &NexusError) -> Option<Duration>;
}

/// Delay doubles (times `factor`) each attempt, capped at `max`, with
/// optional up-to-50% jitter to avoid thundering-herd reconnects.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub factor: f64,
    pub max: Duration,
    pub jitter: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(250),
            factor: 2.0,
            max: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl ReconnectStrategy for ExponentialBackoff {
    fn should_reconnect(&self, error: &NexusError) -> bool {
        error.is_retryable()
    }

    fn next_delay(&self, attempt: u32, _last_error: &NexusError) -> Option<Duration> {
        let power = attempt.saturating_sub(1) as i32;
        let scaled = self.base.as_millis() as f64 * self.factor.powi(power);
        let mut delay = Duration::from_millis(scaled as u64).min(self.max);
        if self.jitter && !delay.is_zero() {
            let bound = (delay.as_millis() as u64 / 2).max(1);
            let jitter_ms = rand::random::<u64>() % bound;
            delay = (delay + Duration::from_millis(jitter_ms)).min(self.max);
        }
        Some(delay)
    }
}

/// Delay grows by a fixed `step` per attempt, capped at `max`.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    pub step: Duration,
    pub max: Duration,
}

impl ReconnectStrategy for LinearBackoff {
    fn should_reconnect(&self, error: &NexusError) -> bool {
        error.is_retryable()
    }

    fn next_delay(&self, attempt: u32, _last_error: &NexusError) -> Option<Duration> {
        Some(self.step.saturating_mul(attempt).min(self.max))
    }
}

/// Caller-supplied decision logic, for policies the built-in strategies
/// don't express (per-endpoint budgets, external circuit breakers, etc).
#[derive(Clone)]
pub struct CustomStrategy {
    pub should_reconnect: Arc<dyn Fn(&NexusError) -> bool + Send + Sync>,
    pub next_delay: Arc<dyn Fn(u32, &NexusError) -> Option<Duration> + Send + Sync>,
}

impl ReconnectStrategy for CustomStrategy {
    fn should_reconnect(&self, error: &NexusError) -> bool {
        (self.should_reconnect)(error)
    }

    fn next_delay(&self, attempt: u32, last_error: &NexusError) -> Option<Duration> {
        (self.next_delay)(attempt, last_error)
    }
}

/// The outcome of evaluating a disconnect against the configured strategy.
#[derive(Debug, Clone, Copy)]
pub enum ReconnectDecision {
    Reconnect { delay: Duration, attempt: u32 },
    GiveUp,
}

/// Wraps a [`ReconnectStrategy`] with the attempt counter the strategy's
/// `next_delay` needs. One controller per connection; `reset()` on every
/// fully `Connected` transition.
pub struct ReconnectController {
    strategy: Arc<dyn ReconnectStrategy>,
    attempt: AtomicU32,
}

impl ReconnectController {
    pub fn new(strategy: Arc<dyn ReconnectStrategy>) -> Self {
        Self { strategy, attempt: AtomicU32::new(0) }
    }

    /// Resets the attempt counter, called once the connection reaches
    /// `Connected` again.
    pub fn reset(&self) {
        self.attempt.store(0, Ordering::SeqCst);
    }

    pub fn attempt(&self) -> u32 {
        self.attempt.load(Ordering::SeqCst)
    }

    /// Evaluates whether to reconnect after `error`, incrementing the
    /// attempt counter when a retry is granted.
    pub fn decide(&self, error: &NexusError) -> ReconnectDecision {
        if !self.strategy.should_reconnect(error) {
            return ReconnectDecision::GiveUp;
        }
        let attempt = self.attempt.fetch_add(1, Ordering::SeqCst) + 1;
        match self.strategy.next_delay(attempt, error) {
            Some(delay) => ReconnectDecision::Reconnect { delay, attempt },
            None => ReconnectDecision::GiveUp,
        }
    }

    /// Forces an immediate reconnect attempt (delay zero), used when the
    /// network monitor reports connectivity returning while disconnected.
    pub fn immediate(&self) -> ReconnectDecision {
        let attempt = self.attempt.fetch_add(1, Ordering::SeqCst) + 1;
        ReconnectDecision::Reconnect { delay: Duration::ZERO, attempt }
    }
}
