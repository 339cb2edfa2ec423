//! Connection runtime: owns the socket, the state machine, and the single
//! task that drives both directions of traffic.
//!
//! One task (`drive`) holds both halves of the split transport and is the
//! only place that touches the socket after `connect()` returns. Everything
//! else — `send`, `disconnect`, the heartbeat timer, the reconnector —
//! reaches the socket only by pushing onto `outgoing`, never directly.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex as SyncMutex, RwLock as SyncRwLock};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ConnectionConfiguration;
use crate::error::{NexusError, Result};
use crate::frame::{Frame, Framer};
use crate::heartbeat::HeartbeatController;
use crate::middleware::cache::CACHE_HIT_METADATA_KEY;
use crate::middleware::{Direction, MiddlewareContext};
use crate::protocol::{ProtocolAdapter, ProtocolEvent, RequestCorrelator, SharedCorrelator};
use crate::reconnect::{ReconnectController, ReconnectDecision};
use crate::socks5;
use crate::state::{self, ConnectionState};
use crate::tls;
use crate::trace::{Span, TraceContext};

/// Unifies plain TCP and TLS-wrapped streams behind one trait object so the
/// driver doesn't need manual `Pin` projection over an enum of stream types.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Event classes a caller can subscribe to via [`Connection::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Notification,
    Control,
    Error,
}

pub type EventHandler = Arc<dyn Fn(ProtocolEvent) -> BoxFuture + Send + Sync>;

/// Result of running the outgoing middleware chain: either a wire frame
/// ready to push, or a response the cache middleware already served.
enum EncodedOutgoing {
    Frame(Vec<u8>),
    CachedResponse(Bytes),
}

#[derive(Debug, Default)]
pub struct ConnectionStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
}

#[derive(Default)]
struct StatsInner {
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
}

/// A single logical connection: endpoint, transport, protocol adapter,
/// middleware chain, heartbeat, and reconnector, wired together per
/// [`ConnectionConfiguration`].
pub struct Connection {
    config: ConnectionConfiguration,
    protocol: Arc<dyn ProtocolAdapter>,
    middleware: crate::middleware::MiddlewareChain,
    heartbeat: Arc<HeartbeatController>,
    reconnect: Option<Arc<ReconnectController>>,
    correlator: SharedCorrelator,
    state: SyncMutex<ConnectionState>,
    outgoing: SyncMutex<Option<mpsc::Sender<Vec<u8>>>>,
    driver_handle: SyncMutex<Option<JoinHandle<()>>>,
    heartbeat_handle: SyncMutex<Option<JoinHandle<()>>>,
    handlers: SyncRwLock<HashMap<EventKind, Vec<EventHandler>>>,
    stats: StatsInner,
    trace: TraceContext,
}

impl Connection {
    pub fn new(config: ConnectionConfiguration) -> Arc<Self> {
        let protocol = config
            .protocol_adapter
            .clone()
            .unwrap_or_else(|| Arc::new(crate::protocol::BinaryProtocolAdapter::new(1)));
        let reconnect = config.reconnect_strategy.clone().map(ReconnectController::new).map(Arc::new);
        let heartbeat = HeartbeatController::new(config.heartbeat.clone());
        let middleware = crate::middleware::MiddlewareChain::new(config.middleware.clone());
        let trace = TraceContext::new(config.trace_sampler.clone());

        Arc::new(Self {
            config,
            protocol,
            middleware,
            heartbeat,
            reconnect,
            correlator: Arc::new(RequestCorrelator::new()),
            state: SyncMutex::new(ConnectionState::Disconnected),
            outgoing: SyncMutex::new(None),
            driver_handle: SyncMutex::new(None),
            heartbeat_handle: SyncMutex::new(None),
            handlers: SyncRwLock::new(HashMap::new()),
            stats: StatsInner::default(),
            trace,
        })
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn endpoint(&self) -> &crate::endpoint::Endpoint {
        &self.config.endpoint
    }

    pub fn config(&self) -> &ConnectionConfiguration {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            bytes_sent: self.stats.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.stats.bytes_received.load(Ordering::Relaxed),
            messages_sent: self.stats.messages_sent.load(Ordering::Relaxed),
            messages_received: self.stats.messages_received.load(Ordering::Relaxed),
        }
    }

    /// Registers a handler for `kind`. Handlers accumulate; all registered
    /// handlers for a kind run (concurrently awaited in registration order)
    /// on every matching event.
    pub fn on(&self, kind: EventKind, handler: EventHandler) {
        self.handlers.write().entry(kind).or_default().push(handler);
    }

    fn transition_to(&self, next: ConnectionState) -> Result<()> {
        let mut guard = self.state.lock();
        *guard = state::transition(*guard, next)?;
        Ok(())
    }

    /// Starts a span sharing this connection's trace id, for one of
    /// `connection.establish`, `send`, or `receive`.
    fn start_span(&self, name: &str) -> Span {
        self.trace.start_span(name, None)
    }

    /// Ends `span` and logs its traceparent and duration.
    fn end_span(&self, mut span: Span) {
        span.end();
        nexuskit_log::trace!(
            target: "nexuskit::trace",
            "{} span finished: id={} traceparent={} duration_us={}",
            span.name,
            self.config.id,
            span.to_traceparent(),
            span.duration().map(|d| d.as_micros()).unwrap_or(0),
        );
    }

    /// Resolves the endpoint, negotiates SOCKS5 and TLS as configured, then
    /// enters `Connected` and starts the heartbeat and receive loop.
    pub async fn connect(self: &Arc<Self>) -> Result<()> {
        {
            let current = self.state();
            if current == ConnectionState::Connected {
                return Ok(());
            }
            self.transition_to(ConnectionState::Connecting)?;
        }
        if let Some(hook) = &self.config.hooks.on_connecting {
            hook();
        }

        let mut span = self.start_span("connection.establish");
        span.set_attribute("endpoint", self.config.endpoint.to_string());

        let stream = match tokio::time::timeout(self.config.connect_timeout, self.establish()).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                span.set_attribute("error", e.to_string());
                self.end_span(span);
                nexuskit_log::warn!(target: "nexuskit::connection", "connect failed: id={} error={}", self.config.id, e);
                self.handle_network_error(&e).await;
                return Err(e);
            }
            Err(_) => {
                span.set_attribute("error", "timeout");
                self.end_span(span);
                let err = NexusError::ConnectionTimeout(self.config.connect_timeout);
                nexuskit_log::warn!(target: "nexuskit::connection", "connect timed out: id={}", self.config.id);
                self.handle_network_error(&err).await;
                return Err(err);
            }
        };
        self.end_span(span);

        self.transition_to(ConnectionState::Connected)?;
        if let Some(reconnect) = &self.reconnect {
            reconnect.reset();
        }
        if let Some(hook) = &self.config.hooks.on_connected {
            hook();
        }
        nexuskit_log::info!(target: "nexuskit::connection", "connected: id={} endpoint={}", self.config.id, self.config.endpoint);

        self.spawn_driver(stream);
        Ok(())
    }

    async fn establish(&self) -> Result<Box<dyn AsyncStream>> {
        let host = self.config.endpoint.host()?;
        let port = self.config.endpoint.port()?;

        let tcp = match &self.config.proxy {
            Some(proxy) => {
                let mut sock = TcpStream::connect((proxy.host.as_str(), proxy.port))
                    .await
                    .map_err(NexusError::Io)?;
                socks5::negotiate(&mut sock, proxy, &host, port).await?;
                sock
            }
            None => TcpStream::connect((host.as_str(), port)).await.map_err(NexusError::Io)?,
        };
        tune_socket(&tcp)?;

        let stream: Box<dyn AsyncStream> = match &self.config.tls {
            Some(tls_config) => Box::new(tls::connect(tls_config, &host, tcp).await?),
            None => Box::new(tcp),
        };
        Ok(stream)
    }

    fn spawn_driver(self: &Arc<Self>, stream: Box<dyn AsyncStream>) {
        let (read_half, write_half) = tokio::io::split(stream);
        let (tx, rx) = mpsc::channel::<Vec<u8>>(256);
        *self.outgoing.lock() = Some(tx.clone());

        let driver_self = Arc::clone(self);
        let driver_reply_tx = tx.clone();
        let handle = tokio::spawn(async move { driver_self.drive(read_half, write_half, rx, driver_reply_tx).await });
        *self.driver_handle.lock() = Some(handle);

        let send_tx = tx;
        let send_conn = Arc::clone(self);
        let timeout_conn = Arc::clone(self);
        let heartbeat_handle = self.heartbeat.start(
            move || {
                let tx = send_tx.clone();
                let frame = send_conn.protocol.create_heartbeat();
                async move {
                    if let Ok(bytes) = frame.encode(false) {
                        let _ = tx.send(bytes).await;
                    }
                }
            },
            move || {
                let conn = Arc::clone(&timeout_conn);
                tokio::spawn(async move { conn.handle_network_error(&NexusError::HeartbeatTimeout).await });
            },
            |_state| {},
        );
        *self.heartbeat_handle.lock() = Some(heartbeat_handle);
    }

    async fn drive<R, W>(
        self: Arc<Self>,
        mut reader: R,
        mut writer: W,
        mut outgoing_rx: mpsc::Receiver<Vec<u8>>,
        reply_tx: mpsc::Sender<Vec<u8>>,
    ) where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut framer = Framer::new(self.config.max_frame_size);
        let mut buf = vec![0u8; 16 * 1024];

        loop {
            if !self.state().is_active() {
                break;
            }

            tokio::select! {
                biased;
                result = reader.read(&mut buf) => {
                    match result {
                        Ok(0) => {
                            self.handle_network_error(&NexusError::ConnectionClosed).await;
                            break;
                        }
                        Ok(n) => {
                            self.stats.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
                            if let Err(e) = framer.push(&buf[..n]) {
                                self.handle_network_error(&e).await;
                                break;
                            }
                            if let Err(()) = self.drain_frames(&mut framer, &reply_tx).await {
                                break;
                            }
                        }
                        Err(e) => {
                            self.handle_network_error(&NexusError::Io(e)).await;
                            break;
                        }
                    }
                }
                maybe_cmd = outgoing_rx.recv() => {
                    match maybe_cmd {
                        Some(bytes) => {
                            if let Err(e) = writer.write_all(&bytes).await {
                                self.handle_network_error(&NexusError::Io(e)).await;
                                break;
                            }
                            self.stats.bytes_sent.fetch_add(bytes.len() as u64, Ordering::Relaxed);
                        }
                        None => break,
                    }
                }
            }
        }
    }

    /// Drains every complete frame out of `framer`, dispatching each.
    /// Returns `Err(())` if a fatal protocol error ended the connection.
    async fn drain_frames(
        self: &Arc<Self>,
        framer: &mut Framer,
        reply_tx: &mpsc::Sender<Vec<u8>>,
    ) -> std::result::Result<(), ()> {
        loop {
            match framer.poll() {
                Ok(Some(frame)) => self.handle_frame(frame, reply_tx).await,
                Ok(None) => return Ok(()),
                Err(e) => {
                    self.handle_network_error(&e).await;
                    return Err(());
                }
            }
        }
    }

    async fn handle_frame(&self, frame: Frame, reply_tx: &mpsc::Sender<Vec<u8>>) {
        let mut span = self.start_span("receive");
        span.set_attribute("function_id", frame.function_id.to_string());
        self.handle_frame_inner(frame, reply_tx).await;
        self.end_span(span);
    }

    async fn handle_frame_inner(&self, frame: Frame, reply_tx: &mpsc::Sender<Vec<u8>>) {
        self.stats.messages_received.fetch_add(1, Ordering::Relaxed);
        if let Some(hook) = &self.config.hooks.on_message_received {
            hook(frame.body.len());
        }

        let mut ctx = MiddlewareContext::new(self.config.id.clone(), self.config.endpoint.clone(), Direction::Incoming);
        let transformed = match self.middleware.run_incoming(frame.body.clone(), &mut ctx).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.fan_out(EventKind::Error, ProtocolEvent::Error(e.to_string())).await;
                return;
            }
        };
        let mut adapted = frame.clone();
        adapted.body = transformed;

        let events = match self.protocol.handle_incoming(&adapted) {
            Ok(events) => events,
            Err(e) => {
                self.fan_out(EventKind::Error, ProtocolEvent::Error(e.to_string())).await;
                return;
            }
        };

        for event in events {
            self.dispatch_event(event, &frame, reply_tx).await;
        }
    }

    async fn dispatch_event(&self, event: ProtocolEvent, frame: &Frame, reply_tx: &mpsc::Sender<Vec<u8>>) {
        match &event {
            ProtocolEvent::Response { id, data } => {
                let _ = self.correlator.complete(*id, Ok(data.clone()));
            }
            ProtocolEvent::Control { kind, .. } if kind == "heartbeat" => {
                if frame.is_response() {
                    self.heartbeat.record_ack();
                } else {
                    self.heartbeat.record_unsolicited();
                    let reply = self.protocol.create_heartbeat();
                    if let Ok(bytes) = reply.encode(false) {
                        let _ = reply_tx.send(bytes).await;
                    }
                }
                self.fan_out(EventKind::Control, event).await;
            }
            ProtocolEvent::Control { .. } => self.fan_out(EventKind::Control, event).await,
            ProtocolEvent::Notification { .. } => self.fan_out(EventKind::Notification, event).await,
            ProtocolEvent::Error(_) => self.fan_out(EventKind::Error, event).await,
        }
    }

    async fn fan_out(&self, kind: EventKind, event: ProtocolEvent) {
        let handlers: Vec<EventHandler> = self.handlers.read().get(&kind).cloned().unwrap_or_default();
        for handler in handlers {
            handler(event.clone()).await;
        }
    }

    /// Sends a one-way frame (`function_id = 0`, no response correlation)
    /// through the outgoing middleware chain. Returns once the driver task
    /// has accepted the bytes, not once the peer has acknowledged them.
    pub async fn send(&self, bytes: Bytes, timeout: Option<Duration>) -> Result<()> {
        let mut span = self.start_span("send");
        let result = self.send_inner(bytes, timeout).await;
        if let Err(e) = &result {
            span.set_attribute("error", e.to_string());
        }
        self.end_span(span);
        result
    }

    async fn send_inner(&self, bytes: Bytes, timeout: Option<Duration>) -> Result<()> {
        let tx = self.require_sender()?;
        match self.encode_frame(0, 0, bytes).await? {
            EncodedOutgoing::Frame(encoded) => self.push_outgoing(&tx, encoded, timeout).await,
            // A cache hit already served the response locally; nothing goes
            // over the wire for a one-way send.
            EncodedOutgoing::CachedResponse(_) => Ok(()),
        }
    }

    /// Sends `function_id` with `body`, registers a correlator waiter, and
    /// awaits the matching response frame. A cache hit short-circuits this
    /// entirely: the cached bytes are returned without touching the socket.
    pub async fn send_request(&self, function_id: u32, body: Bytes, timeout: Option<Duration>) -> Result<Bytes> {
        let mut span = self.start_span("send");
        span.set_attribute("function_id", function_id.to_string());
        let result = self.send_request_inner(function_id, body, timeout).await;
        if let Err(e) = &result {
            span.set_attribute("error", e.to_string());
        }
        self.end_span(span);
        result
    }

    async fn send_request_inner(&self, function_id: u32, body: Bytes, timeout: Option<Duration>) -> Result<Bytes> {
        let tx = self.require_sender()?;
        let request_id = self.correlator.allocate_id();
        let timeout = timeout.unwrap_or(self.config.read_timeout);

        let encoded = match self.encode_frame(request_id, function_id, body).await? {
            EncodedOutgoing::CachedResponse(cached) => return Ok(cached),
            EncodedOutgoing::Frame(encoded) => encoded,
        };

        let waiter = self.correlator.register(request_id, std::time::Instant::now() + timeout);
        self.push_outgoing(&tx, encoded, Some(self.config.write_timeout)).await?;

        match tokio::time::timeout(timeout, waiter).await {
            Ok(Ok(result)) => result,
            Ok(Err(_canceled)) => Err(NexusError::ConnectionClosed),
            Err(_elapsed) => Err(NexusError::RequestTimeout),
        }
    }

    /// Encodes `msg` through the configured protocol adapter, then sends it
    /// as a one-way frame.
    pub async fn send_message<T: serde::Serialize>(&self, msg: &T, timeout: Option<Duration>) -> Result<()> {
        let json = serde_json::to_vec(msg).map_err(|e| NexusError::EncodingFailed(e.to_string()))?;
        let encoded = self.protocol.encode(0, 0, &json)?;
        self.send(Bytes::from(encoded), timeout).await
    }

    /// Streaming transports have no pull-based receive; subscribe via [`on`].
    pub async fn receive(&self) -> Result<Bytes> {
        Err(NexusError::UnsupportedOperation {
            op: "receive".to_string(),
            reason: "this transport is push-based; subscribe with Connection::on instead".to_string(),
        })
    }

    fn require_sender(&self) -> Result<mpsc::Sender<Vec<u8>>> {
        if !self.state().can_send() {
            return Err(NexusError::NotConnected);
        }
        self.outgoing.lock().clone().ok_or(NexusError::NotConnected)
    }

    async fn encode_frame(&self, request_id: u32, function_id: u32, body: Bytes) -> Result<EncodedOutgoing> {
        let mut ctx = MiddlewareContext::new(self.config.id.clone(), self.config.endpoint.clone(), Direction::Outgoing);
        let transformed = self.middleware.run_outgoing(body, &mut ctx).await?;
        if ctx.metadata.contains_key(CACHE_HIT_METADATA_KEY) {
            return Ok(EncodedOutgoing::CachedResponse(transformed));
        }
        let compress = self.config.compression_enabled && transformed.len() > self.config.compression_threshold;
        let frame = Frame {
            version: 1,
            type_flags: 0,
            response_flag: 0,
            request_id,
            function_id,
            response_code: 0,
            body: transformed,
        };
        Ok(EncodedOutgoing::Frame(frame.encode(compress)?))
    }

    async fn push_outgoing(&self, tx: &mpsc::Sender<Vec<u8>>, encoded: Vec<u8>, timeout: Option<Duration>) -> Result<()> {
        let len = encoded.len();
        let timeout = timeout.unwrap_or(self.config.write_timeout);
        tokio::time::timeout(timeout, tx.send(encoded))
            .await
            .map_err(|_| NexusError::ConnectionTimeout(timeout))?
            .map_err(|_| NexusError::ConnectionClosed)?;

        self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        if let Some(hook) = &self.config.hooks.on_message_sent {
            hook(len);
        }
        Ok(())
    }

    /// Tears the connection down, failing outstanding requests and
    /// cancelling the driver and heartbeat tasks. Idempotent.
    pub async fn disconnect(self: &Arc<Self>, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        let current = self.state();
        if current == ConnectionState::Disconnected {
            return Ok(());
        }
        if current != ConnectionState::Disconnecting {
            self.transition_to(ConnectionState::Disconnecting)?;
        }

        self.heartbeat.stop();
        if let Some(handle) = self.heartbeat_handle.lock().take() {
            handle.abort();
        }
        *self.outgoing.lock() = None;
        if let Some(handle) = self.driver_handle.lock().take() {
            handle.abort();
        }
        self.correlator.fail_all();
        self.transition_to(ConnectionState::Disconnected)?;
        nexuskit_log::info!(target: "nexuskit::connection", "disconnected: id={} reason={}", self.config.id, reason);

        if let Some(hook) = &self.config.hooks.on_disconnected {
            hook(reason);
        }
        Ok(())
    }

    /// Classifies a network-path error, then either tears the connection
    /// down for good or schedules a reconnect attempt per the configured
    /// strategy.
    async fn handle_network_error(self: &Arc<Self>, error: &NexusError) {
        let current = self.state();
        if !current.is_active() {
            return;
        }
        *self.outgoing.lock() = None;
        nexuskit_log::warn!(target: "nexuskit::connection", "network error: id={} error={}", self.config.id, error);
        if let Some(hook) = &self.config.hooks.on_error {
            hook(error.to_string());
        }

        let give_up = error.poisons_connection() || self.reconnect.is_none();
        if give_up {
            let _ = self.force_disconnected(error.to_string()).await;
            return;
        }

        let reconnect = self.reconnect.as_ref().unwrap();
        match reconnect.decide(error) {
            ReconnectDecision::GiveUp => {
                let _ = self.force_disconnected(error.to_string()).await;
            }
            ReconnectDecision::Reconnect { delay, attempt } => {
                self.heartbeat.stop();
                self.correlator.fail_all();
                // Reconnecting is only reachable directly from Connected or
                // Disconnected; a failed first attempt (state still
                // Connecting) has to drop through Disconnected first.
                if current == ConnectionState::Connecting {
                    let _ = self.transition_to(ConnectionState::Disconnected);
                }
                let _ = self.transition_to(ConnectionState::Reconnecting { attempt });
                nexuskit_log::info!(target: "nexuskit::connection", "scheduling reconnect: id={} attempt={} delay_ms={}", self.config.id, attempt, delay.as_millis());
                if let Some(hook) = &self.config.hooks.on_reconnecting {
                    hook(attempt);
                }

                let this = Arc::clone(self);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if matches!(this.state(), ConnectionState::Reconnecting { .. }) {
                        let _ = this.connect().await;
                    }
                });
            }
        }
    }

    /// Forces a full teardown after a reconnect attempt was refused or a
    /// poisoning error occurred. No-op if already disconnected.
    async fn force_disconnected(self: &Arc<Self>, reason: String) -> Result<()> {
        let current = self.state();
        if current == ConnectionState::Disconnected {
            return Ok(());
        }
        if current.is_active() {
            let _ = self.transition_to(ConnectionState::Disconnecting);
        }
        self.heartbeat.stop();
        if let Some(handle) = self.heartbeat_handle.lock().take() {
            handle.abort();
        }
        self.correlator.fail_all();
        *self.outgoing.lock() = None;
        if let Some(handle) = self.driver_handle.lock().take() {
            handle.abort();
        }
        self.transition_to(ConnectionState::Disconnected)?;

        if let Some(hook) = &self.config.hooks.on_disconnected {
            hook(reason);
        }
        Ok(())
    }

    /// Forces an immediate reconnect attempt, bypassing the strategy's
    /// delay. Used by the network monitor when connectivity returns while
    /// the connection sits idle in `Disconnected`.
    pub async fn reconnect_now(self: &Arc<Self>) -> Result<()> {
        let Some(reconnect) = &self.reconnect else {
            return Err(NexusError::OperationNotAllowed("no reconnect strategy configured".to_string()));
        };
        if self.state() != ConnectionState::Disconnected {
            return Ok(());
        }
        match reconnect.immediate() {
            ReconnectDecision::Reconnect { attempt, .. } => {
                self.transition_to(ConnectionState::Reconnecting { attempt })?;
                self.connect().await
            }
            ReconnectDecision::GiveUp => Ok(()),
        }
    }
}

fn tune_socket(stream: &TcpStream) -> Result<()> {
    stream.set_nodelay(true).map_err(NexusError::Io)?;
    let sock_ref = socket2::SockRef::from(stream);
    let keepalive = socket2::TcpKeepalive::new()
        .with_time(Duration::from_secs(60))
        .with_interval(Duration::from_secs(15));
    let _ = sock_ref.set_tcp_keepalive(&keepalive);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Endpoint;
    use tokio::net::TcpListener;

    fn config(endpoint: Endpoint) -> ConnectionConfiguration {
        ConnectionConfiguration::builder(endpoint)
            .connect_timeout(Duration::from_secs(2))
            .heartbeat(crate::config::HeartbeatConfig {
                enabled: false,
                ..crate::config::HeartbeatConfig::default()
            })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_connect_and_disconnect_lifecycle() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (_sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let conn = Connection::new(config(Endpoint::tcp(addr.ip().to_string(), addr.port())));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        conn.connect().await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Connected);

        conn.disconnect("test done").await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        server.abort();
    }

    #[tokio::test]
    async fn test_connect_refused_surfaces_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener); // nothing listening now

        let conn = Connection::new(config(Endpoint::tcp(addr.ip().to_string(), addr.port())));
        let err = conn.connect().await.unwrap_err();
        assert!(matches!(err, NexusError::ConnectionRefused | NexusError::Io(_)));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_send_without_connection_is_rejected() {
        let conn = Connection::new(config(Endpoint::tcp("127.0.0.1", 1)));
        let err = conn.send(Bytes::from_static(b"hi"), None).await.unwrap_err();
        assert!(matches!(err, NexusError::NotConnected));
    }

    #[tokio::test]
    async fn test_receive_is_unsupported() {
        let conn = Connection::new(config(Endpoint::tcp("127.0.0.1", 1)));
        let err = conn.receive().await.unwrap_err();
        assert!(matches!(err, NexusError::UnsupportedOperation { .. }));
    }

    #[tokio::test]
    async fn test_send_and_receive_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut header = [0u8; 4];
            sock.read_exact(&mut header).await.unwrap();
            let total_length = u32::from_be_bytes(header) as usize;
            let mut rest = vec![0u8; total_length];
            sock.read_exact(&mut rest).await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
        });

        let conn = Connection::new(config(Endpoint::tcp(addr.ip().to_string(), addr.port())));
        conn.connect().await.unwrap();
        conn.send(Bytes::from_static(b"payload"), Some(Duration::from_secs(1))).await.unwrap();

        let stats = conn.stats();
        assert_eq!(stats.messages_sent, 1);
        server.abort();
    }
}
