//! Fixed window: counts requests in wall-clock-aligned windows; simple but
//! allows a burst of up to `2 * max_requests` across a window boundary.

use super::RateLimitAlgorithm;
use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct WindowState {
    count: u64,
    window_start: Instant,
}

pub struct FixedWindow {
    max_requests: u64,
    window: Duration,
    windows: DashMap<String, WindowState>,
}

impl FixedWindow {
    /// Panics if `max_requests` is 0 or `window` is zero duration.
    pub fn new(max_requests: u64, window: Duration) -> Self {
        assert!(max_requests > 0, "max_requests must be greater than 0");
        assert!(!window.is_zero(), "window must be non-zero");
        Self {
            max_requests,
            window,
            windows: DashMap::new(),
        }
    }
}

impl RateLimitAlgorithm for FixedWindow {
    fn try_acquire(&self, key: &str, cost: u64) -> (bool, u64) {
        let now = Instant::now();
        let mut entry = self.windows.entry(key.to_string()).or_insert_with(|| WindowState {
            count: 0,
            window_start: now,
        });

        if now.duration_since(entry.window_start) >= self.window {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count + cost <= self.max_requests {
            entry.count += cost;
            (true, self.max_requests - entry.count)
        } else {
            (false, self.max_requests.saturating_sub(entry.count))
        }
    }

    fn reset(&self, key: &str) {
        self.windows.remove(key);
    }

    fn remaining(&self, key: &str) -> u64 {
        let now = Instant::now();
        match self.windows.get(key) {
            Some(entry) if now.duration_since(entry.window_start) < self.window => {
                self.max_requests.saturating_sub(entry.count)
            }
            _ => self.max_requests,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_basic_limit() {
        let limiter = FixedWindow::new(3, Duration::from_secs(60));
        assert!(limiter.try_acquire("k", 1).0);
        assert!(limiter.try_acquire("k", 1).0);
        assert!(limiter.try_acquire("k", 1).0);
        assert!(!limiter.try_acquire("k", 1).0);
    }

    #[test]
    fn test_window_reset() {
        let limiter = FixedWindow::new(2, Duration::from_millis(80));
        limiter.try_acquire("k", 2);
        assert!(!limiter.try_acquire("k", 1).0);
        thread::sleep(Duration::from_millis(120));
        assert!(limiter.try_acquire("k", 1).0);
    }
}
