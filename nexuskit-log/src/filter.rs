//! Filters decide whether a [`LogRecord`] is allowed through to the
//! configured targets. They compose via [`CompositeFilter`], which runs every
//! registered filter and rejects a record if any one of them rejects it.

use crate::{target::LogRecord, Level};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub trait LogFilter: Send + Sync {
    fn allow(&self, record: &LogRecord) -> bool;
}

/// Runs each registered filter in order; a record must pass all of them.
#[derive(Default)]
pub struct CompositeFilter {
    filters: Vec<Box<dyn LogFilter>>,
}

impl CompositeFilter {
    pub fn new() -> Self {
        Self { filters: Vec::new() }
    }

    pub fn add(mut self, filter: Box<dyn LogFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn allow(&self, record: &LogRecord) -> bool {
        self.filters.iter().all(|f| f.allow(record))
    }
}

/// Rejects records below a minimum level, independent of the global level.
pub struct LevelFilter {
    pub min_level: Level,
}

impl LogFilter for LevelFilter {
    fn allow(&self, record: &LogRecord) -> bool {
        record.level >= self.min_level
    }
}

/// Only allows records whose target starts with one of the given prefixes.
pub struct ModuleFilter {
    pub allowed_prefixes: Vec<String>,
}

impl LogFilter for ModuleFilter {
    fn allow(&self, record: &LogRecord) -> bool {
        self.allowed_prefixes.iter().any(|p| record.target.starts_with(p.as_str()))
    }
}

/// Passes a fixed fraction of records, chosen by a deterministic counter
/// rather than randomness (keeps filtering reproducible for tests).
pub struct SamplingFilter {
    probability: f64,
    counter: AtomicU64,
}

impl SamplingFilter {
    pub fn new(probability: f64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            counter: AtomicU64::new(0),
        }
    }
}

impl LogFilter for SamplingFilter {
    fn allow(&self, _record: &LogRecord) -> bool {
        if self.probability >= 1.0 {
            return true;
        }
        if self.probability <= 0.0 {
            return false;
        }
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let bucket = 1.0 / self.probability;
        (n as f64 % bucket) < 1.0
    }
}

/// Caps the number of records allowed per rolling time window, per target.
pub struct RateLimitFilter {
    max_per_window: u32,
    window: Duration,
    state: Mutex<HashMap<String, (Instant, u32)>>,
}

impl RateLimitFilter {
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            max_per_window,
            window,
            state: Mutex::new(HashMap::new()),
        }
    }
}

impl LogFilter for RateLimitFilter {
    fn allow(&self, record: &LogRecord) -> bool {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        let entry = state.entry(record.target.clone()).or_insert((now, 0));
        if now.duration_since(entry.0) > self.window {
            *entry = (now, 0);
        }
        if entry.1 >= self.max_per_window {
            return false;
        }
        entry.1 += 1;
        true
    }
}

/// Allows an initial burst of records through immediately, then falls back
/// to the rate limit for the remainder of the window.
pub struct BurstFilter {
    burst_size: u32,
    rate_limit: RateLimitFilter,
    burst_used: AtomicU64,
}

impl BurstFilter {
    pub fn new(burst_size: u32, sustained_per_window: u32, window: Duration) -> Self {
        Self {
            burst_size,
            rate_limit: RateLimitFilter::new(sustained_per_window, window),
            burst_used: AtomicU64::new(0),
        }
    }
}

impl LogFilter for BurstFilter {
    fn allow(&self, record: &LogRecord) -> bool {
        let used = self.burst_used.fetch_add(1, Ordering::Relaxed);
        if (used as u32) < self.burst_size {
            return true;
        }
        self.rate_limit.allow(record)
    }
}

/// Suppresses exact-duplicate messages seen within `window`.
pub struct DuplicateSuppressionFilter {
    window: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl DuplicateSuppressionFilter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }
}

impl LogFilter for DuplicateSuppressionFilter {
    fn allow(&self, record: &LogRecord) -> bool {
        let mut seen = self.seen.lock().unwrap();
        let now = Instant::now();
        let key = format!("{}:{}", record.target, record.message);
        match seen.get(&key) {
            Some(last) if now.duration_since(*last) < self.window => false,
            _ => {
                seen.insert(key, now);
                true
            }
        }
    }
}

/// Only allows records carrying a specific metadata key/value pair.
pub struct MetadataFilter {
    pub key: &'static str,
    pub value: String,
}

impl LogFilter for MetadataFilter {
    fn allow(&self, record: &LogRecord) -> bool {
        record.metadata.iter().any(|(k, v)| *k == self.key && v == &self.value)
    }
}

/// Only allows records whose message matches a simple substring pattern.
/// (Not a regex engine, to avoid pulling in a dependency the ambient stack
/// does not otherwise need.)
pub struct PatternFilter {
    pub pattern: String,
}

impl LogFilter for PatternFilter {
    fn allow(&self, record: &LogRecord) -> bool {
        record.message.contains(&self.pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Format;

    fn record(message: &str) -> LogRecord {
        LogRecord {
            level: Level::Info,
            target: "nexuskit::connection".into(),
            message: message.into(),
            tag: "NexusKit".into(),
            metadata: vec![],
            error: None,
            file: "f.rs",
            function: "f",
            line: 1,
            format: Format::Compact,
            color: false,
        }
    }

    #[test]
    fn test_level_filter() {
        let filter = LevelFilter { min_level: Level::Warning };
        assert!(!filter.allow(&record("x")));
        let mut r = record("x");
        r.level = Level::Error;
        assert!(filter.allow(&r));
    }

    #[test]
    fn test_module_filter() {
        let filter = ModuleFilter {
            allowed_prefixes: vec!["nexuskit::connection".into()],
        };
        assert!(filter.allow(&record("x")));
        let mut r = record("x");
        r.target = "nexuskit::heartbeat".into();
        assert!(!filter.allow(&r));
    }

    #[test]
    fn test_duplicate_suppression() {
        let filter = DuplicateSuppressionFilter::new(Duration::from_secs(60));
        assert!(filter.allow(&record("same")));
        assert!(!filter.allow(&record("same")));
        assert!(filter.allow(&record("different")));
    }

    #[test]
    fn test_rate_limit() {
        let filter = RateLimitFilter::new(2, Duration::from_secs(60));
        assert!(filter.allow(&record("a")));
        assert!(filter.allow(&record("a")));
        assert!(!filter.allow(&record("a")));
    }

    #[test]
    fn test_composite_requires_all() {
        let composite = CompositeFilter::new()
            .add(Box::new(LevelFilter { min_level: Level::Info }))
            .add(Box::new(PatternFilter { pattern: "heartbeat".into() }));
        assert!(!composite.allow(&record("connection opened")));
        assert!(composite.allow(&record("heartbeat missed")));
    }
}
