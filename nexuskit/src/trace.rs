//! Lightweight distributed tracing: spans with W3C `traceparent`
//! interoperability and pluggable samplers, independent of any external
//! collector.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use rand::RngCore;

/// 16-byte trace id, rendered as 32 lowercase hex characters in `traceparent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId(pub [u8; 16]);

impl TraceId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        TraceId(bytes)
    }

    pub fn to_hex(self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 32 {
            return None;
        }
        let mut bytes = [0u8; 16];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            bytes[i] = u8::from_str_radix(std::str::from_utf8(chunk).ok()?, 16).ok()?;
        }
        Some(TraceId(bytes))
    }
}

/// 8-byte span id, rendered as 16 lowercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId(pub [u8; 8]);

impl SpanId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut bytes);
        SpanId(bytes)
    }

    pub fn to_hex(self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 16 {
            return None;
        }
        let mut bytes = [0u8; 8];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            bytes[i] = u8::from_str_radix(std::str::from_utf8(chunk).ok()?, 16).ok()?;
        }
        Some(SpanId(bytes))
    }
}

/// A single point-in-time annotation attached to a span.
#[derive(Debug, Clone)]
pub struct SpanEvent {
    pub name: String,
    pub timestamp: SystemTime,
    pub attributes: HashMap<String, String>,
}

/// A traced operation. Created via [`TraceContext::start_span`], closed with
/// [`Span::end`]; both timestamps are wall-clock so they serialize directly.
#[derive(Debug, Clone)]
pub struct Span {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_span_id: Option<SpanId>,
    pub name: String,
    pub sampled: bool,
    pub start: SystemTime,
    pub end: Option<SystemTime>,
    pub attributes: HashMap<String, String>,
    pub events: Vec<SpanEvent>,
}

impl Span {
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn add_event(&mut self, name: impl Into<String>, attributes: HashMap<String, String>) {
        self.events.push(SpanEvent { name: name.into(), timestamp: SystemTime::now(), attributes });
    }

    pub fn end(&mut self) {
        if self.end.is_none() {
            self.end = Some(SystemTime::now());
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        self.end.and_then(|end| end.duration_since(self.start).ok())
    }

    /// Emits this span's position as a W3C `traceparent` header value.
    pub fn to_traceparent(&self) -> String {
        format!(
            "00-{}-{}-{:02x}",
            self.trace_id.to_hex(),
            self.span_id.to_hex(),
            if self.sampled { 0x01 } else { 0x00 }
        )
    }

    /// Parses a `traceparent` header, returning `(trace_id, parent_span_id, sampled)`.
    pub fn parse_traceparent(value: &str) -> Option<(TraceId, SpanId, bool)> {
        let parts: Vec<&str> = value.split('-').collect();
        if parts.len() != 4 || parts[0] != "00" {
            return None;
        }
        let trace_id = TraceId::from_hex(parts[1])?;
        let span_id = SpanId::from_hex(parts[2])?;
        let flags = u8::from_str_radix(parts[3], 16).ok()?;
        Some((trace_id, span_id, flags & 0x01 == 0x01))
    }
}

/// Decides whether a new trace should be sampled.
pub trait Sampler: Send + Sync {
    fn should_sample(&self, trace_id: TraceId) -> bool;
}

pub struct AlwaysOn;
impl Sampler for AlwaysOn {
    fn should_sample(&self, _trace_id: TraceId) -> bool {
        true
    }
}

pub struct AlwaysOff;
impl Sampler for AlwaysOff {
    fn should_sample(&self, _trace_id: TraceId) -> bool {
        false
    }
}

/// Samples a fraction `p` (0.0..=1.0) of trace ids, decided by hashing the
/// trace id rather than an independent coin flip so the same trace samples
/// consistently across spans.
pub struct Probability(pub f64);
impl Sampler for Probability {
    fn should_sample(&self, trace_id: TraceId) -> bool {
        if self.0 >= 1.0 {
            return true;
        }
        if self.0 <= 0.0 {
            return false;
        }
        let leading = u64::from_be_bytes(trace_id.0[0..8].try_into().unwrap());
        let threshold = (self.0 * u64::MAX as f64) as u64;
        leading < threshold
    }
}

/// Root of a trace: owns the sampler and mints spans sharing one trace id
/// per logical operation chain (a connection's lifetime, typically).
pub struct TraceContext {
    trace_id: TraceId,
    sampler: Arc<dyn Sampler>,
}

impl TraceContext {
    pub fn new(sampler: Arc<dyn Sampler>) -> Self {
        Self { trace_id: TraceId::generate(), sampler }
    }

    /// Resumes a trace from an inbound `traceparent`, inheriting its trace id
    /// and sampling decision rather than re-deciding locally.
    pub fn from_traceparent(value: &str, sampler: Arc<dyn Sampler>) -> Option<(Self, SpanId)> {
        let (trace_id, parent_span_id, _sampled) = Span::parse_traceparent(value)?;
        Some((Self { trace_id, sampler }, parent_span_id))
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn start_span(&self, name: impl Into<String>, parent: Option<SpanId>) -> Span {
        Span {
            trace_id: self.trace_id,
            span_id: SpanId::generate(),
            parent_span_id: parent,
            name: name.into(),
            sampled: self.sampler.should_sample(self.trace_id),
            start: SystemTime::now(),
            end: None,
            attributes: HashMap::new(),
            events: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_id_hex_round_trip() {
        let id = TraceId::generate();
        let hex = id.to_hex();
        assert_eq!(hex.len(), 32);
        assert_eq!(TraceId::from_hex(&hex), Some(id));
    }

    #[test]
    fn test_span_id_hex_round_trip() {
        let id = SpanId::generate();
        let hex = id.to_hex();
        assert_eq!(hex.len(), 16);
        assert_eq!(SpanId::from_hex(&hex), Some(id));
    }

    #[test]
    fn test_traceparent_emit_and_parse() {
        let ctx = TraceContext::new(Arc::new(AlwaysOn));
        let span = ctx.start_span("connection.establish", None);
        let header = span.to_traceparent();
        assert!(header.starts_with("00-"));
        assert!(header.ends_with("-01"));

        let (trace_id, span_id, sampled) = Span::parse_traceparent(&header).unwrap();
        assert_eq!(trace_id, span.trace_id);
        assert_eq!(span_id, span.span_id);
        assert!(sampled);
    }

    #[test]
    fn test_malformed_traceparent_rejected() {
        assert!(Span::parse_traceparent("not-a-traceparent").is_none());
        assert!(Span::parse_traceparent("01-deadbeef-cafebabe-01").is_none());
    }

    #[test]
    fn test_always_off_never_samples() {
        let ctx = TraceContext::new(Arc::new(AlwaysOff));
        let span = ctx.start_span("send", None);
        assert!(!span.sampled);
    }

    #[test]
    fn test_probability_bounds_are_deterministic() {
        let always = Probability(1.0);
        let never = Probability(0.0);
        let id = TraceId::generate();
        assert!(always.should_sample(id));
        assert!(!never.should_sample(id));
    }

    #[test]
    fn test_span_duration_after_end() {
        let ctx = TraceContext::new(Arc::new(AlwaysOn));
        let mut span = ctx.start_span("receive", None);
        std::thread::sleep(Duration::from_millis(5));
        span.end();
        assert!(span.duration().is_some());
        assert!(span.duration().unwrap() >= Duration::from_millis(1));
    }

    #[test]
    fn test_resuming_trace_from_traceparent_inherits_trace_id() {
        let parent_ctx = TraceContext::new(Arc::new(AlwaysOn));
        let parent_span = parent_ctx.start_span("connection.establish", None);
        let header = parent_span.to_traceparent();

        let (child_ctx, parent_span_id) = TraceContext::from_traceparent(&header, Arc::new(AlwaysOn)).unwrap();
        assert_eq!(child_ctx.trace_id(), parent_span.trace_id);
        assert_eq!(parent_span_id, parent_span.span_id);
    }
}
