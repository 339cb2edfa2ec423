//! Sliding window: blends the previous window's count (weighted by how much
//! of it still overlaps "now") with the current window's count, avoiding the
//! fixed window's boundary-doubling burst.

use super::RateLimitAlgorithm;
use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct WindowState {
    previous_count: u64,
    current_count: u64,
    window_start: Instant,
}

pub struct SlidingWindow {
    max_requests: u64,
    window: Duration,
    windows: DashMap<String, WindowState>,
}

impl SlidingWindow {
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

    fn weighted_count(&self, state: &WindowState, now: Instant) -> f64 {
        let elapsed = now.duration_since(state.window_start).as_secs_f64();
        let window_secs = self.window.as_secs_f64();
        let position = (elapsed / window_secs).min(1.0);
        state.previous_count as f64 * (1.0 - position) + state.current_count as f64
    }
}

impl RateLimitAlgorithm for SlidingWindow {
    fn try_acquire(&self, key: &str, cost: u64) -> (bool, u64) {
        let now = Instant::now();
        let mut entry = self.windows.entry(key.to_string()).or_insert_with(|| WindowState {
            previous_count: 0,
            current_count: 0,
            window_start: now,
        });

        if now.duration_since(entry.window_start) >= self.window {
            let windows_elapsed =
                (now.duration_since(entry.window_start).as_secs_f64() / self.window.as_secs_f64()) as u64;
            entry.previous_count = if windows_elapsed == 1 { entry.current_count } else { 0 };
            entry.current_count = 0;
            entry.window_start = entry.window_start + self.window;
        }

        let estimated = self.weighted_count(&entry, now);
        if estimated + cost as f64 <= self.max_requests as f64 {
            entry.current_count += cost;
            (true, self.max_requests.saturating_sub(estimated as u64))
        } else {
            (false, self.max_requests.saturating_sub(estimated as u64))
        }
    }

    fn reset(&self, key: &str) {
        self.windows.remove(key);
    }

    fn remaining(&self, key: &str) -> u64 {
        let now = Instant::now();
        match self.windows.get(key) {
            Some(entry) => {
                let estimated = self.weighted_count(&entry, now);
                self.max_requests.saturating_sub(estimated as u64)
            }
            None => self.max_requests,
        }
    }
}
