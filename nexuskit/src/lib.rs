//! Typed, reliable, observable client-side transport over TCP, WebSocket, and
//! Socket.IO.
//!
//! A [`Connection`] owns a single socket and drives it on its own task;
//! [`NexusKit`] is the process-wide entry point that hands out connections,
//! tracks them in a [`ConnectionManager`], and aggregates their metrics.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod buffer;
mod config;
mod connection;
mod endpoint;
mod error;
mod frame;
mod heartbeat;
mod manager;
mod metrics;
mod middleware;
mod network_monitor;
mod protocol;
mod reconnect;
mod socks5;
mod state;
mod tls;
mod trace;

pub use buffer::{codec, gzip, BufferManager};
pub use config::{
    ConnectionConfiguration, ConnectionConfigurationBuilder, HeartbeatConfig, LifecycleHooks,
    NexusKitConfig, ProxyConfig, ProxyType,
};
pub use connection::{Connection, ConnectionStats, EventKind};
pub use endpoint::Endpoint;
pub use error::{NexusError, Result};
pub use frame::{Frame, Framer, FLAG_COMPRESSED, FLAG_IDLE, FRAME_TAG, HEADER_LEN, HEARTBEAT_FUNCTION_ID};
pub use heartbeat::{HeartbeatController, HeartbeatState, HeartbeatStats};
pub use manager::{ConnectionManager, ManagerStats};
pub use metrics::{
    ConnectionSnapshot, DashboardConfig, Health, HistoryPoint, MetricsAggregator, OverviewSnapshot,
};
pub use middleware::{Direction, Middleware, MiddlewareChain, MiddlewareContext};
pub use network_monitor::{NetworkEvent, NetworkMonitor, NetworkMonitorConfig, ReachabilityStatus};
pub use protocol::{
    BinaryProtocolAdapter, JsonLineProtocolAdapter, MsgPackProtocolAdapter, ProtocolAdapter,
    ProtocolEvent, RequestCorrelator, SharedCorrelator,
};
pub use reconnect::{
    CustomStrategy, ExponentialBackoff, LinearBackoff, ReconnectController, ReconnectDecision,
    ReconnectStrategy,
};
pub use state::ConnectionState;
pub use tls::{CipherSuitePreset, ClientIdentity, TlsConfig, TlsVersion, ValidationPolicy};
pub use trace::{AlwaysOff, AlwaysOn, Probability, Sampler, Span, SpanId, TraceContext, TraceId};

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

/// Process-wide handle: global defaults, the live connection registry, the
/// metrics aggregator, and the reachability monitor.
///
/// Call [`NexusKit::init`] once at process startup; subsequent calls return
/// the same instance. [`NexusKit::shutdown`] tears down every managed
/// connection and stops the network monitor, and should run once on process
/// teardown.
pub struct NexusKit {
    config: NexusKitConfig,
    connections: ConnectionManager,
    metrics: MetricsAggregator,
    network_monitor: Arc<NetworkMonitor>,
    monitor_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

static INSTANCE: OnceLock<Arc<NexusKit>> = OnceLock::new();

impl NexusKit {
    /// Returns the process-wide instance, creating it with `config` on first
    /// call. `config` is ignored on subsequent calls.
    pub fn init(config: NexusKitConfig) -> Arc<Self> {
        INSTANCE
            .get_or_init(|| {
                let connections = ConnectionManager::new(&config);
                let metrics = MetricsAggregator::new(DashboardConfig::default());
                let network_monitor = NetworkMonitor::new(NetworkMonitorConfig::default());
                let this = Arc::new(Self {
                    config,
                    connections,
                    metrics,
                    network_monitor,
                    monitor_handle: Mutex::new(None),
                });
                this.start_network_monitor();
                this
            })
            .clone()
    }

    /// Returns the process-wide instance if [`init`](Self::init) has already
    /// run.
    pub fn global() -> Option<Arc<Self>> {
        INSTANCE.get().cloned()
    }

    /// Process-wide defaults this instance was created with.
    pub fn config(&self) -> &NexusKitConfig {
        &self.config
    }

    /// The live connection registry.
    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    /// The metrics aggregator feeding dashboards and subscribers.
    pub fn metrics(&self) -> &MetricsAggregator {
        &self.metrics
    }

    /// Builds a connection from `config`, registers it with this instance,
    /// and returns the handle.
    pub fn connect(&self, config: ConnectionConfiguration) -> Result<Arc<Connection>> {
        let connection = Connection::new(config);
        self.connections.register(&connection)?;
        self.metrics.record_connection_opened();
        Ok(connection)
    }

    fn start_network_monitor(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = self.network_monitor.start(move |event| match event {
            NetworkEvent::Connected(ReachabilityStatus::Reachable) => {
                let this = Arc::clone(&this);
                tokio::spawn(async move {
                    for connection in this.connections.all_active() {
                        if connection.state() == ConnectionState::Disconnected {
                            let _ = connection.reconnect_now().await;
                        }
                    }
                });
            }
            NetworkEvent::InterfaceChanged { .. } => {
                let this = Arc::clone(&this);
                tokio::spawn(async move {
                    for connection in this.connections.all_active() {
                        if connection.state() == ConnectionState::Connected {
                            let delay = connection.config().reconnect_on_interface_change_delay;
                            let _ = connection.disconnect("interface changed").await;
                            tokio::time::sleep(delay).await;
                            let _ = connection.reconnect_now().await;
                        }
                    }
                });
            }
            _ => {}
        });
        *self.monitor_handle.lock() = Some(handle);
    }

    /// Disconnects every managed connection and stops the network monitor.
    /// Safe to call even if nothing was ever connected.
    pub async fn shutdown(&self) {
        self.network_monitor.stop();
        if let Some(handle) = self.monitor_handle.lock().take() {
            handle.abort();
        }
        self.connections.disconnect_all().await;
    }
}
