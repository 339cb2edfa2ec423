//! Output targets: console, rotating file, and a batching remote sink.

use crate::{ErrorDetail, Format, Level};
use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// A single log event handed to every configured [`LogTarget`].
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub tag: String,
    pub metadata: Vec<(&'static str, String)>,
    pub error: Option<ErrorDetail>,
    pub file: &'static str,
    pub function: &'static str,
    pub line: u32,
    pub format: Format,
    pub color: bool,
}

/// A destination for formatted log output. Implementors must be safe to call
/// concurrently from any task.
pub trait LogTarget: Send + Sync {
    fn write(&self, record: &LogRecord);
}

fn render_compact(record: &LogRecord) -> String {
    let mut out = format!("[{}] [{}] {}", record.tag, record.level, record.message);
    for (k, v) in &record.metadata {
        out.push_str(&format!(" {}={}", k, v));
    }
    if let Some(err) = &record.error {
        out.push_str(&format!(" error=\"{}\" error_type={}", err.description, err.error_type));
    }
    out
}

fn render_json(record: &LogRecord) -> String {
    let mut metadata = String::from("{");
    for (i, (k, v)) in record.metadata.iter().enumerate() {
        if i > 0 {
            metadata.push(',');
        }
        metadata.push_str(&format!("\"{}\":\"{}\"", k, escape(v)));
    }
    metadata.push('}');

    let error = match &record.error {
        Some(e) => format!(
            "{{\"description\":\"{}\",\"type\":\"{}\"}}",
            escape(&e.description),
            escape(&e.error_type)
        ),
        None => "null".to_string(),
    };

    format!(
        "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"tag\":\"{}\",\"target\":\"{}\",\"message\":\"{}\",\"location\":{{\"file\":\"{}\",\"function\":\"{}\",\"line\":{}}},\"metadata\":{},\"error\":{}}}",
        now_rfc3339(),
        record.level,
        record.tag,
        record.target,
        escape(&record.message),
        escape(record.file),
        escape(record.function),
        record.line,
        metadata,
        error,
    )
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn render(record: &LogRecord) -> String {
    match record.format {
        Format::Compact => render_compact(record),
        Format::Json => render_json(record),
    }
}

/// Writes to stderr (warnings and above) or stdout, matching a typical CLI tool.
pub struct ConsoleTarget;

impl LogTarget for ConsoleTarget {
    fn write(&self, record: &LogRecord) {
        let line = render(record);
        if record.level >= Level::Warning {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
    }
}

/// File target that rotates to `<path>.1`, `<path>.2`, ... once `max_bytes`
/// is exceeded, keeping at most `max_backups` rotated files.
pub struct RollingFileTarget {
    inner: Mutex<RollingFileInner>,
}

struct RollingFileInner {
    path: PathBuf,
    file: File,
    max_bytes: u64,
    max_backups: usize,
    written: u64,
}

impl RollingFileTarget {
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64, max_backups: usize) -> std::io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            inner: Mutex::new(RollingFileInner {
                path,
                file,
                max_bytes,
                max_backups,
                written,
            }),
        })
    }

    fn rotate(inner: &mut RollingFileInner) -> std::io::Result<()> {
        for i in (1..inner.max_backups).rev() {
            let from = inner.path.with_extension(format!("{}", i));
            let to = inner.path.with_extension(format!("{}", i + 1));
            if from.exists() {
                let _ = fs::rename(from, to);
            }
        }
        if inner.max_backups > 0 {
            let backup = inner.path.with_extension("1");
            let _ = fs::rename(&inner.path, backup);
        }
        inner.file = OpenOptions::new().create(true).append(true).truncate(false).open(&inner.path)?;
        inner.written = 0;
        Ok(())
    }
}

impl LogTarget for RollingFileTarget {
    fn write(&self, record: &LogRecord) {
        let mut inner = self.inner.lock().unwrap();
        let line = render(record);
        if inner.written + line.len() as u64 + 1 > inner.max_bytes {
            let _ = Self::rotate(&mut inner);
        }
        if writeln!(inner.file, "{}", line).is_ok() {
            inner.written += line.len() as u64 + 1;
        }
    }
}

/// Buffers records and flushes them to a remote collector once `batch_size`
/// records accumulate. The actual transport is left to the `flush` callback
/// so this crate does not take an HTTP client dependency.
pub struct RemoteBatchSink {
    buffer: Mutex<Vec<LogRecord>>,
    batch_size: usize,
    dropped: AtomicU64,
    flush: Box<dyn Fn(&[LogRecord]) + Send + Sync>,
}

impl RemoteBatchSink {
    pub fn new(batch_size: usize, flush: impl Fn(&[LogRecord]) + Send + Sync + 'static) -> Self {
        Self {
            buffer: Mutex::new(Vec::with_capacity(batch_size)),
            batch_size,
            dropped: AtomicU64::new(0),
            flush: Box::new(flush),
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Force a flush of whatever is currently buffered.
    pub fn flush_now(&self) {
        let mut buf = self.buffer.lock().unwrap();
        if !buf.is_empty() {
            (self.flush)(&buf);
            buf.clear();
        }
    }
}

impl LogTarget for RemoteBatchSink {
    fn write(&self, record: &LogRecord) {
        let mut buf = self.buffer.lock().unwrap();
        buf.push(record.clone());
        if buf.len() >= self.batch_size {
            (self.flush)(&buf);
            buf.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> LogRecord {
        LogRecord {
            level: Level::Info,
            target: "test".into(),
            message: "hello".into(),
            tag: "NexusKit".into(),
            metadata: vec![("k", "v".into())],
            error: None,
            file: "test.rs",
            function: "sample",
            line: 1,
            format: Format::Compact,
            color: false,
        }
    }

    #[test]
    fn test_compact_render() {
        let rendered = render_compact(&sample_record());
        assert_eq!(rendered, "[NexusKit] [INFO] hello k=v");
    }

    #[test]
    fn test_json_render_contains_location() {
        let rendered = render_json(&sample_record());
        assert!(rendered.contains("\"location\""));
        assert!(rendered.contains("\"function\":\"sample\""));
    }

    #[test]
    fn test_remote_batch_flushes_at_size() {
        let flushed = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let flushed_clone = flushed.clone();
        let sink = RemoteBatchSink::new(2, move |batch| {
            flushed_clone.fetch_add(batch.len(), Ordering::SeqCst);
        });
        sink.write(&sample_record());
        assert_eq!(flushed.load(Ordering::SeqCst), 0);
        sink.write(&sample_record());
        assert_eq!(flushed.load(Ordering::SeqCst), 2);
    }
}
