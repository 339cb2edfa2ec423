//! Protocol adapter: converts typed messages to/from bytes and interprets
//! framed bytes as events. Also hosts the request/response correlator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{NexusError, Result};
use crate::frame::{Frame, HEARTBEAT_FUNCTION_ID};

#[derive(Debug, Clone)]
pub enum ProtocolEvent {
    Response { id: u32, data: Bytes },
    Notification { event: u32, data: Bytes },
    Control { kind: String, data: Bytes },
    Error(String),
}

/// Polymorphic protocol adapter. Binary, JSON-line, and MessagePack variants
/// share this event algebra over an underlying framer.
pub trait ProtocolAdapter: Send + Sync {
    fn encode(&self, function_id: u32, request_id: u32, body: &[u8]) -> Result<Vec<u8>>;
    fn decode(&self, frame: &Frame) -> Result<Vec<u8>>;
    fn handle_incoming(&self, frame: &Frame) -> Result<Vec<ProtocolEvent>>;
    fn create_heartbeat(&self) -> Frame;
}

/// Binary wire protocol — the default adapter, matching the fixed header
/// frame format directly (no additional body envelope).
pub struct BinaryProtocolAdapter {
    version: u16,
}

impl BinaryProtocolAdapter {
    pub fn new(version: u16) -> Self {
        Self { version }
    }
}

impl ProtocolAdapter for BinaryProtocolAdapter {
    fn encode(&self, _function_id: u32, _request_id: u32, body: &[u8]) -> Result<Vec<u8>> {
        Ok(body.to_vec())
    }

    fn decode(&self, frame: &Frame) -> Result<Vec<u8>> {
        Ok(frame.body.to_vec())
    }

    fn handle_incoming(&self, frame: &Frame) -> Result<Vec<ProtocolEvent>> {
        Ok(vec![classify(frame)])
    }

    fn create_heartbeat(&self) -> Frame {
        Frame::heartbeat(self.version)
    }
}

/// JSON-line adapter: body is a UTF-8 JSON document, one per frame.
pub struct JsonLineProtocolAdapter {
    version: u16,
}

impl JsonLineProtocolAdapter {
    pub fn new(version: u16) -> Self {
        Self { version }
    }
}

impl ProtocolAdapter for JsonLineProtocolAdapter {
    fn encode(&self, _function_id: u32, _request_id: u32, body: &[u8]) -> Result<Vec<u8>> {
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| NexusError::EncodingFailed(e.to_string()))?;
        serde_json::to_vec(&value).map_err(|e| NexusError::EncodingFailed(e.to_string()))
    }

    fn decode(&self, frame: &Frame) -> Result<Vec<u8>> {
        let value: serde_json::Value =
            serde_json::from_slice(&frame.body).map_err(|e| NexusError::DecodingFailed(e.to_string()))?;
        serde_json::to_vec(&value).map_err(|e| NexusError::DecodingFailed(e.to_string()))
    }

    fn handle_incoming(&self, frame: &Frame) -> Result<Vec<ProtocolEvent>> {
        Ok(vec![classify(frame)])
    }

    fn create_heartbeat(&self) -> Frame {
        Frame::heartbeat(self.version)
    }
}

/// MessagePack-wrapped JSON adapter: body is re-encoded from JSON into
/// MessagePack on the wire, and back on receipt.
pub struct MsgPackProtocolAdapter {
    version: u16,
}

impl MsgPackProtocolAdapter {
    pub fn new(version: u16) -> Self {
        Self { version }
    }
}

impl ProtocolAdapter for MsgPackProtocolAdapter {
    fn encode(&self, _function_id: u32, _request_id: u32, body: &[u8]) -> Result<Vec<u8>> {
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| NexusError::EncodingFailed(e.to_string()))?;
        rmp_serde::to_vec(&value).map_err(|e| NexusError::EncodingFailed(e.to_string()))
    }

    fn decode(&self, frame: &Frame) -> Result<Vec<u8>> {
        let value: serde_json::Value =
            rmp_serde::from_slice(&frame.body).map_err(|e| NexusError::DecodingFailed(e.to_string()))?;
        serde_json::to_vec(&value).map_err(|e| NexusError::DecodingFailed(e.to_string()))
    }

    fn handle_incoming(&self, frame: &Frame) -> Result<Vec<ProtocolEvent>> {
        Ok(vec![classify(frame)])
    }

    fn create_heartbeat(&self) -> Frame {
        Frame::heartbeat(self.version)
    }
}

fn classify(frame: &Frame) -> ProtocolEvent {
    if frame.function_id == HEARTBEAT_FUNCTION_ID {
        ProtocolEvent::Control {
            kind: "heartbeat".to_string(),
            data: frame.body.clone(),
        }
    } else if frame.is_response() {
        ProtocolEvent::Response {
            id: frame.request_id,
            data: frame.body.clone(),
        }
    } else {
        ProtocolEvent::Notification {
            event: frame.function_id,
            data: frame.body.clone(),
        }
    }
}

struct OutstandingRequest {
    waiter: oneshot::Sender<Result<Bytes>>,
    deadline: Instant,
}

/// Owns the allocation of monotonically increasing request ids (wraps
/// skipping 0) and the map of in-flight requests awaiting a response.
pub struct RequestCorrelator {
    next_id: AtomicU32,
    outstanding: Mutex<HashMap<u32, OutstandingRequest>>,
}

impl Default for RequestCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestCorrelator {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1),
            outstanding: Mutex::new(HashMap::new()),
        }
    }

    pub fn allocate_id(&self) -> u32 {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
            // wrapped onto 0: skip it, try again
        }
    }

    /// Register a waiter for `request_id` with the given deadline, returning
    /// the receiving half the caller awaits.
    pub fn register(&self, request_id: u32, deadline: Instant) -> oneshot::Receiver<Result<Bytes>> {
        let (tx, rx) = oneshot::channel();
        self.outstanding.lock().insert(request_id, OutstandingRequest { waiter: tx, deadline });
        rx
    }

    /// Complete the outstanding request matching `request_id`, if any.
    /// Returns `InvalidResponse` if no entry was registered.
    pub fn complete(&self, request_id: u32, result: Result<Bytes>) -> Result<()> {
        let entry = self.outstanding.lock().remove(&request_id);
        match entry {
            Some(entry) => {
                let _ = entry.waiter.send(result);
                Ok(())
            }
            None => Err(NexusError::InvalidResponse(request_id)),
        }
    }

    /// Fail every outstanding request with `ConnectionClosed`, used on
    /// disconnect.
    pub fn fail_all(&self) {
        let mut map = self.outstanding.lock();
        for (_, entry) in map.drain() {
            let _ = entry.waiter.send(Err(NexusError::ConnectionClosed));
        }
    }

    /// Remove and fail any requests whose deadline has passed.
    pub fn expire_overdue(&self) {
        let now = Instant::now();
        let mut map = self.outstanding.lock();
        let expired: Vec<u32> = map
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            if let Some(entry) = map.remove(&id) {
                let _ = entry.waiter.send(Err(NexusError::RequestTimeout));
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.outstanding.lock().len()
    }
}

pub type SharedCorrelator = Arc<RequestCorrelator>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_id_skips_zero_on_wrap() {
        let corr = RequestCorrelator::new();
        corr.next_id.store(u32::MAX, Ordering::Relaxed);
        let a = corr.allocate_id();
        assert_eq!(a, u32::MAX);
        let b = corr.allocate_id();
        assert_eq!(b, 1); // wrapped past 0
    }

    #[tokio::test]
    async fn test_register_and_complete() {
        let corr = RequestCorrelator::new();
        let id = corr.allocate_id();
        let rx = corr.register(id, Instant::now() + Duration::from_secs(5));
        corr.complete(id, Ok(Bytes::from_static(b"ok"))).unwrap();
        let result = rx.await.unwrap().unwrap();
        assert_eq!(&result[..], b"ok");
        assert_eq!(corr.pending_count(), 0);
    }

    #[test]
    fn test_complete_unknown_id_errors() {
        let corr = RequestCorrelator::new();
        assert!(corr.complete(999, Ok(Bytes::new())).is_err());
    }

    #[tokio::test]
    async fn test_fail_all_resolves_with_connection_closed() {
        let corr = RequestCorrelator::new();
        let id = corr.allocate_id();
        let rx = corr.register(id, Instant::now() + Duration::from_secs(5));
        corr.fail_all();
        let result = rx.await.unwrap();
        assert!(matches!(result, Err(NexusError::ConnectionClosed)));
    }

    #[test]
    fn test_classify_heartbeat() {
        let frame = Frame::heartbeat(1);
        match classify(&frame) {
            ProtocolEvent::Control { kind, .. } => assert_eq!(kind, "heartbeat"),
            _ => panic!("expected Control"),
        }
    }
}
