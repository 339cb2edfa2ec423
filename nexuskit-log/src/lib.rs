//! Structured logging for NexusKit.
//!
//! Mirrors the shape of a typical client networking SDK's log surface: a
//! tag-prefixed compact format for consoles, a JSON formatter with
//! caller-location metadata for ingestion pipelines, and pluggable output
//! targets (console, rotating file, remote batch sink). Filters compose so a
//! caller can combine level, module, sampling, and rate-limiting decisions
//! without touching the formatter.
//!
//! # Quick start
//!
//! ```rust
//! use nexuskit_log::{info, warn};
//!
//! info!("connection established");
//! warn!(target: "nexuskit::heartbeat", "missed heartbeat {}", 3);
//! ```
//!
//! # Environment variables
//!
//! | Variable | Values | Default |
//! |----------|--------|---------|
//! | `NEXUSKIT_DEBUG` | `1`/`true` | `false` |
//! | `NEXUSKIT_LOG_LEVEL` | `trace`..`error` | `info` |
//! | `NEXUSKIT_LOG_FORMAT` | `compact`, `json` | `compact` |
//! | `NEXUSKIT_LOG_TAG` | any string | `NexusKit` |
//! | `NEXUSKIT_LOG_COLOR` | `1`/`0` | auto-detect |

use once_cell::sync::Lazy;
use std::env;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Mutex, RwLock};

pub mod filter;
pub mod target;

pub use filter::{CompositeFilter, LogFilter};
pub use target::{LogRecord, LogTarget, RemoteBatchSink, RollingFileTarget};

// ============================================================================
// Log Levels
// ============================================================================

/// Log level, ordered from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warning = 3,
    Error = 4,
    Critical = 5,
    Off = 6,
}

impl Level {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warning),
            "error" => Some(Level::Error),
            "critical" | "fatal" => Some(Level::Critical),
            "off" | "none" => Some(Level::Off),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
            Level::Off => "OFF",
        }
    }
}

impl std::str::FromStr for Level {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or(())
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output format for the built-in console target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Format {
    /// `[Tag] [LEVEL] message k=v ...`
    Compact = 0,
    /// structured JSON with location/metadata/error fields.
    Json = 1,
}

impl Format {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "compact" => Some(Format::Compact),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

// ============================================================================
// Global configuration
// ============================================================================

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);
static LOG_FORMAT: AtomicU8 = AtomicU8::new(Format::Compact as u8);
static LOG_COLOR: AtomicBool = AtomicBool::new(false);

static TAG: Lazy<RwLock<String>> = Lazy::new(|| RwLock::new(String::from("NexusKit")));
static TARGETS: Lazy<Mutex<Vec<Box<dyn LogTarget>>>> =
    Lazy::new(|| Mutex::new(vec![Box::new(target::ConsoleTarget)]));
static FILTER: Lazy<RwLock<CompositeFilter>> = Lazy::new(|| RwLock::new(CompositeFilter::new()));

static CONFIG: Lazy<LogConfig> = Lazy::new(LogConfig::from_env);

#[derive(Debug)]
pub struct LogConfig {
    pub debug: bool,
    pub level: Level,
    pub format: Format,
    pub tag: String,
    pub color: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Info,
            format: Format::Compact,
            tag: "NexusKit".to_string(),
            color: false,
        }
    }
}

impl LogConfig {
    pub fn from_env() -> Self {
        let debug = env::var("NEXUSKIT_DEBUG")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let level = env::var("NEXUSKIT_LOG_LEVEL")
            .ok()
            .and_then(|s| Level::parse(&s))
            .unwrap_or(if debug { Level::Debug } else { Level::Info });
        let format = env::var("NEXUSKIT_LOG_FORMAT")
            .ok()
            .and_then(|s| Format::parse(&s))
            .unwrap_or(Format::Compact);
        let tag = env::var("NEXUSKIT_LOG_TAG").unwrap_or_else(|_| "NexusKit".to_string());
        let color = env::var("NEXUSKIT_LOG_COLOR")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(std::env::var("NO_COLOR").is_err());

        DEBUG_ENABLED.store(debug, Ordering::SeqCst);
        LOG_LEVEL.store(level as u8, Ordering::SeqCst);
        LOG_FORMAT.store(format as u8, Ordering::SeqCst);
        LOG_COLOR.store(color, Ordering::SeqCst);

        Self {
            debug,
            level,
            format,
            tag,
            color,
        }
    }
}

/// Force initialization (idempotent; called automatically by the first log call).
pub fn init() {
    Lazy::force(&CONFIG);
}

#[inline]
pub fn is_debug_enabled() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

#[inline]
pub fn is_level_enabled(level: Level) -> bool {
    level as u8 >= LOG_LEVEL.load(Ordering::Relaxed)
}

pub fn current_level() -> Level {
    match LOG_LEVEL.load(Ordering::Relaxed) {
        0 => Level::Trace,
        1 => Level::Debug,
        2 => Level::Info,
        3 => Level::Warning,
        4 => Level::Error,
        5 => Level::Critical,
        _ => Level::Off,
    }
}

pub fn set_level(level: Level) {
    LOG_LEVEL.store(level as u8, Ordering::SeqCst);
}

pub fn set_debug(enabled: bool) {
    DEBUG_ENABLED.store(enabled, Ordering::SeqCst);
    if enabled && current_level() > Level::Debug {
        set_level(Level::Debug);
    }
}

pub fn config() -> &'static LogConfig {
    &CONFIG
}

pub fn current_format() -> Format {
    match LOG_FORMAT.load(Ordering::Relaxed) {
        0 => Format::Compact,
        _ => Format::Json,
    }
}

pub fn set_format(format: Format) {
    LOG_FORMAT.store(format as u8, Ordering::SeqCst);
}

pub fn set_color(enabled: bool) {
    LOG_COLOR.store(enabled, Ordering::SeqCst);
}

/// Set the tag prefixed to every compact-format record (default `"NexusKit"`).
pub fn set_tag(tag: impl Into<String>) {
    *TAG.write().unwrap() = tag.into();
}

pub fn tag() -> String {
    TAG.read().unwrap().clone()
}

/// Replace the active output targets. Defaults to a single console target.
pub fn set_targets(targets: Vec<Box<dyn LogTarget>>) {
    *TARGETS.lock().unwrap() = targets;
}

/// Add an output target without removing existing ones.
pub fn add_target(t: Box<dyn LogTarget>) {
    TARGETS.lock().unwrap().push(t);
}

/// Replace the active filter chain (default: passes everything at/above [`current_level`]).
pub fn set_filter(filter: CompositeFilter) {
    *FILTER.write().unwrap() = filter;
}

// ============================================================================
// Fluent configuration builder
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    format: Option<Format>,
    level: Option<Level>,
    color: Option<bool>,
    tag: Option<String>,
    debug: Option<bool>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }
    pub fn level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }
    pub fn color(mut self, enabled: bool) -> Self {
        self.color = Some(enabled);
        self
    }
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = Some(enabled);
        self
    }
    pub fn apply(self) {
        if let Some(format) = self.format {
            set_format(format);
        }
        if let Some(level) = self.level {
            set_level(level);
        }
        if let Some(color) = self.color {
            set_color(color);
        }
        if let Some(tag) = self.tag {
            set_tag(tag);
        }
        if let Some(debug) = self.debug {
            set_debug(debug);
        }
    }
}

pub fn configure() -> ConfigBuilder {
    ConfigBuilder::new()
}

pub fn preset_development() {
    configure()
        .format(Format::Compact)
        .level(Level::Debug)
        .color(true)
        .debug(true)
        .apply();
}

pub fn preset_production() {
    configure()
        .format(Format::Json)
        .level(Level::Info)
        .color(false)
        .debug(false)
        .apply();
}

pub fn preset_quiet() {
    configure().format(Format::Json).level(Level::Warning).apply();
}

// ============================================================================
// Log emission
// ============================================================================

/// Structured error detail attached to a record, matching the JSON schema's
/// `error{description,type}` object.
#[derive(Debug, Clone)]
pub struct ErrorDetail {
    pub description: String,
    pub error_type: String,
}

/// Emit a log record. Called by the level macros; exposed for callers that
/// want to attach key/value metadata or an [`ErrorDetail`] directly.
pub fn log_with(
    level: Level,
    target_name: &str,
    message: &str,
    metadata: &[(&str, String)],
    error: Option<ErrorDetail>,
    location: (&'static str, &'static str, u32),
) {
    if !is_level_enabled(level) {
        return;
    }
    let record = LogRecord {
        level,
        target: target_name.to_string(),
        message: message.to_string(),
        tag: tag(),
        metadata: metadata.to_vec(),
        error,
        file: location.0,
        function: location.1,
        line: location.2,
        format: current_format(),
        color: LOG_COLOR.load(Ordering::Relaxed),
    };

    if !FILTER.read().unwrap().allow(&record) {
        return;
    }

    let targets = TARGETS.lock().unwrap();
    for t in targets.iter() {
        t.write(&record);
    }
}

#[doc(hidden)]
pub fn log(level: Level, target_name: &str, message: &str) {
    log_with(level, target_name, message, &[], None, ("", "", 0));
}

// ============================================================================
// Macros
// ============================================================================

#[macro_export]
macro_rules! trace {
    (target: $target:expr, $($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Trace) {
            $crate::log($crate::Level::Trace, $target, &format!($($arg)+));
        }
    };
    ($($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Trace) {
            $crate::log($crate::Level::Trace, module_path!(), &format!($($arg)+));
        }
    };
}

#[macro_export]
macro_rules! debug {
    (target: $target:expr, $($arg:tt)+) => {
        if $crate::is_debug_enabled() || $crate::is_level_enabled($crate::Level::Debug) {
            $crate::log($crate::Level::Debug, $target, &format!($($arg)+));
        }
    };
    ($($arg:tt)+) => {
        if $crate::is_debug_enabled() || $crate::is_level_enabled($crate::Level::Debug) {
            $crate::log($crate::Level::Debug, module_path!(), &format!($($arg)+));
        }
    };
}

#[macro_export]
macro_rules! info {
    (target: $target:expr, $($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Info) {
            $crate::log($crate::Level::Info, $target, &format!($($arg)+));
        }
    };
    ($($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Info) {
            $crate::log($crate::Level::Info, module_path!(), &format!($($arg)+));
        }
    };
}

#[macro_export]
macro_rules! warn {
    (target: $target:expr, $($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Warning) {
            $crate::log($crate::Level::Warning, $target, &format!($($arg)+));
        }
    };
    ($($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Warning) {
            $crate::log($crate::Level::Warning, module_path!(), &format!($($arg)+));
        }
    };
}

#[macro_export]
macro_rules! error {
    (target: $target:expr, $($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Error) {
            $crate::log($crate::Level::Error, $target, &format!($($arg)+));
        }
    };
    ($($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Error) {
            $crate::log($crate::Level::Error, module_path!(), &format!($($arg)+));
        }
    };
}

#[cfg(feature = "tracing")]
pub mod tracing_compat {
    use super::*;

    pub fn subscriber() -> impl tracing::Subscriber {
        use tracing_subscriber::prelude::*;
        use tracing_subscriber::{fmt, EnvFilter};

        let level = match config().level {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warning => "warn",
            Level::Error | Level::Critical => "error",
            Level::Off => "off",
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_ansi(config().color))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Error < Level::Critical);
        assert!(Level::Critical < Level::Off);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(Level::parse("warn"), Some(Level::Warning));
        assert_eq!(Level::parse("CRITICAL"), Some(Level::Critical));
        assert_eq!(Level::parse("bogus"), None);
    }

    #[test]
    fn test_set_level_roundtrip() {
        let original = current_level();
        set_level(Level::Error);
        assert_eq!(current_level(), Level::Error);
        set_level(original);
    }

    #[test]
    fn test_tag_roundtrip() {
        let original = tag();
        set_tag("Test");
        assert_eq!(tag(), "Test");
        set_tag(original);
    }

    #[test]
    fn test_macros_compile() {
        trace!("trace message");
        debug!(target: "test", "with target {}", 1);
        info!("info message");
        warn!("warn message");
        error!("error message");
    }
}
