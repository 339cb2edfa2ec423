//! Adaptive, bidirectional heartbeat controller.
//!
//! A dedicated task fires on `interval`, expects an ack within `timeout`,
//! and escalates through `{idle, healthy, warning, timeout}` as responses
//! are missed. The connection runtime owns the task handle and feeds acks
//! back in via `record_ack`/`record_unsolicited`.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::task::JoinHandle;

use crate::config::HeartbeatConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatState {
    Idle,
    Healthy,
    Warning,
    Timeout,
}

struct Inner {
    state: HeartbeatState,
    awaiting_ack: bool,
    sent_at: Option<Instant>,
}

/// Tracks liveness for a single connection. Construct with [`HeartbeatController::new`],
/// then [`start`](HeartbeatController::start) to launch the timer task.
pub struct HeartbeatController {
    config: HeartbeatConfig,
    inner: RwLock<Inner>,
    lost_count: AtomicU32,
    current_interval_ms: AtomicU64,
    last_rtt_ms: AtomicU64,
    total_sent: AtomicU64,
    total_acked: AtomicU64,
    total_lost: AtomicU64,
    running: AtomicBool,
}

impl HeartbeatController {
    pub fn new(config: HeartbeatConfig) -> Arc<Self> {
        let initial_interval = config.interval.as_millis() as u64;
        Arc::new(Self {
            config,
            inner: RwLock::new(Inner {
                state: HeartbeatState::Idle,
                awaiting_ack: false,
                sent_at: None,
            }),
            lost_count: AtomicU32::new(0),
            current_interval_ms: AtomicU64::new(initial_interval),
            last_rtt_ms: AtomicU64::new(0),
            total_sent: AtomicU64::new(0),
            total_acked: AtomicU64::new(0),
            total_lost: AtomicU64::new(0),
            running: AtomicBool::new(false),
        })
    }

    pub fn state(&self) -> HeartbeatState {
        self.inner.read().state
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Spawns the timer loop. `on_send` is awaited once per interval to emit
    /// a heartbeat frame; `on_timeout` fires once `max_lost_count` consecutive
    /// heartbeats go unanswered; `on_state_change` fires on every transition.
    /// Returns immediately with a no-op handle if heartbeats are disabled.
    pub fn start<FSend, SendFut, FTimeout, FStateChange>(
        self: &Arc<Self>,
        mut on_send: FSend,
        mut on_timeout: FTimeout,
        mut on_state_change: FStateChange,
    ) -> JoinHandle<()>
    where
        FSend: FnMut() -> SendFut + Send + 'static,
        SendFut: Future<Output = ()> + Send,
        FTimeout: FnMut() + Send + 'static,
        FStateChange: FnMut(HeartbeatState) + Send + 'static,
    {
        if !self.config.enabled {
            return tokio::spawn(async {});
        }

        self.running.store(true, Ordering::SeqCst);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.set_state(HeartbeatState::Healthy, &mut on_state_change);

            while this.running.load(Ordering::SeqCst) {
                tokio::time::sleep(this.current_interval()).await;
                if !this.running.load(Ordering::SeqCst) {
                    break;
                }

                let overdue = this.inner.read().awaiting_ack;
                if overdue {
                    let lost = this.lost_count.fetch_add(1, Ordering::SeqCst) + 1;
                    this.total_lost.fetch_add(1, Ordering::Relaxed);
                    if lost >= this.config.max_lost_count {
                        this.set_state(HeartbeatState::Timeout, &mut on_state_change);
                        this.running.store(false, Ordering::SeqCst);
                        on_timeout();
                        break;
                    }
                    this.set_state(HeartbeatState::Warning, &mut on_state_change);
                    this.back_off();
                }

                {
                    let mut inner = this.inner.write();
                    inner.awaiting_ack = true;
                    inner.sent_at = Some(Instant::now());
                }
                this.total_sent.fetch_add(1, Ordering::Relaxed);
                on_send().await;
            }
        })
    }

    /// Stops the timer loop after its current sleep completes.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Call when a matching heartbeat response arrives. Resets the loss
    /// counter, recomputes RTT, and (in adaptive mode) retunes the interval.
    pub fn record_ack(&self) {
        let rtt = {
            let mut inner = self.inner.write();
            let rtt = inner.sent_at.map(|sent| sent.elapsed());
            inner.awaiting_ack = false;
            inner.sent_at = None;
            inner.state = HeartbeatState::Healthy;
            rtt
        };
        self.lost_count.store(0, Ordering::SeqCst);
        self.total_acked.fetch_add(1, Ordering::Relaxed);
        if let Some(rtt) = rtt {
            self.last_rtt_ms.store(rtt.as_millis() as u64, Ordering::Relaxed);
            self.adapt_interval(rtt);
        }
    }

    /// Call when the peer sends a heartbeat we did not solicit. Resets the
    /// local failure clock; the caller is still responsible for sending the
    /// mirrored response frame.
    pub fn record_unsolicited(&self) {
        self.lost_count.store(0, Ordering::SeqCst);
        let mut inner = self.inner.write();
        inner.awaiting_ack = false;
        inner.sent_at = None;
        inner.state = HeartbeatState::Healthy;
    }

    pub fn lost_count(&self) -> u32 {
        self.lost_count.load(Ordering::SeqCst)
    }

    pub fn current_interval(&self) -> Duration {
        Duration::from_millis(self.current_interval_ms.load(Ordering::Relaxed))
    }

    pub fn stats(&self) -> HeartbeatStats {
        HeartbeatStats {
            state: self.state(),
            lost_count: self.lost_count(),
            current_interval: self.current_interval(),
            last_rtt: Duration::from_millis(self.last_rtt_ms.load(Ordering::Relaxed)),
            total_sent: self.total_sent.load(Ordering::Relaxed),
            total_acked: self.total_acked.load(Ordering::Relaxed),
            total_lost: self.total_lost.load(Ordering::Relaxed),
        }
    }

    fn set_state(&self, state: HeartbeatState, on_state_change: &mut impl FnMut(HeartbeatState)) {
        let changed = {
            let mut inner = self.inner.write();
            let changed = inner.state != state;
            inner.state = state;
            changed
        };
        if changed {
            on_state_change(state);
        }
    }

    fn adapt_interval(&self, rtt: Duration) {
        if !self.config.adaptive {
            return;
        }
        let target = (rtt * 4).clamp(self.config.min_interval, self.config.max_interval);
        self.current_interval_ms.store(target.as_millis() as u64, Ordering::Relaxed);
    }

    fn back_off(&self) {
        if !self.config.adaptive {
            return;
        }
        let doubled = (self.current_interval() * 2).min(self.config.max_interval);
        self.current_interval_ms.store(doubled.as_millis() as u64, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone)]
pub struct HeartbeatStats {
    pub state: HeartbeatState,
    pub lost_count: u32,
    pub current_interval: Duration,
    pub last_rtt: Duration,
    pub total_sent: u64,
    pub total_acked: u64,
    pub total_lost: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn fast_config() -> HeartbeatConfig {
        HeartbeatConfig {
            interval: Duration::from_millis(20),
            timeout: Duration::from_millis(20),
            enabled: true,
            max_lost_count: 2,
            min_interval: Duration::from_millis(5),
            max_interval: Duration::from_millis(200),
            adaptive: false,
        }
    }

    #[tokio::test]
    async fn test_sends_and_acks_stay_healthy() {
        let controller = HeartbeatController::new(fast_config());
        let sends = Arc::new(AtomicU32::new(0));
        let sends2 = Arc::clone(&sends);
        let timed_out = Arc::new(AtomicBool::new(false));
        let timed_out2 = Arc::clone(&timed_out);
        let c2 = Arc::clone(&controller);

        let handle = controller.start(
            move || {
                let sends = Arc::clone(&sends2);
                let c = Arc::clone(&c2);
                async move {
                    sends.fetch_add(1, Ordering::SeqCst);
                    c.record_ack();
                }
            },
            move || timed_out2.store(true, Ordering::SeqCst),
            |_| {},
        );

        tokio::time::sleep(Duration::from_millis(90)).await;
        controller.stop();
        let _ = tokio::time::timeout(Duration::from_millis(100), handle).await;

        assert!(sends.load(Ordering::SeqCst) >= 2);
        assert!(!timed_out.load(Ordering::SeqCst));
        assert_eq!(controller.state(), HeartbeatState::Healthy);
    }

    #[tokio::test]
    async fn test_times_out_after_max_lost_count() {
        let controller = HeartbeatController::new(fast_config());
        let timed_out = Arc::new(AtomicBool::new(false));
        let timed_out2 = Arc::clone(&timed_out);

        let handle = controller.start(
            || async {},
            move || timed_out2.store(true, Ordering::SeqCst),
            |_| {},
        );

        let _ = tokio::time::timeout(Duration::from_millis(500), handle).await;
        assert!(timed_out.load(Ordering::SeqCst));
        assert_eq!(controller.state(), HeartbeatState::Timeout);
    }

    #[tokio::test]
    async fn test_unsolicited_heartbeat_resets_loss_counter() {
        let controller = HeartbeatController::new(fast_config());
        {
            let mut inner = controller.inner.write();
            inner.awaiting_ack = true;
            inner.sent_at = Some(Instant::now());
        }
        controller.lost_count.store(1, Ordering::SeqCst);

        controller.record_unsolicited();

        assert_eq!(controller.lost_count(), 0);
        assert_eq!(controller.state(), HeartbeatState::Healthy);
    }

    #[tokio::test]
    async fn test_adaptive_interval_stays_within_bounds() {
        let mut config = fast_config();
        config.adaptive = true;
        config.min_interval = Duration::from_millis(10);
        config.max_interval = Duration::from_millis(50);
        let controller = HeartbeatController::new(config);

        {
            let mut inner = controller.inner.write();
            inner.sent_at = Some(Instant::now() - Duration::from_millis(1));
            inner.awaiting_ack = true;
        }
        controller.record_ack();
        assert!(controller.current_interval() <= Duration::from_millis(50));
        assert!(controller.current_interval() >= Duration::from_millis(10));

        controller.back_off();
        controller.back_off();
        controller.back_off();
        assert!(controller.current_interval() <= Duration::from_millis(50));
    }

    #[test]
    fn test_disabled_start_returns_immediately() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let mut config = fast_config();
            config.enabled = false;
            let controller = HeartbeatController::new(config);
            let called = Arc::new(Mutex::new(false));
            let called2 = Arc::clone(&called);
            let handle = controller.start(|| async {}, move || *called2.lock().unwrap() = true, |_| {});
            let _ = tokio::time::timeout(Duration::from_millis(50), handle).await;
            assert!(!*called.lock().unwrap());
        });
    }
}
