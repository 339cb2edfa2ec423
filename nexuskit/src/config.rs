//! Immutable connection configuration, its builder, and process-wide
//! defaults consumed by the `NexusKit` singleton.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::endpoint::Endpoint;
use crate::error::{NexusError, Result};
use crate::middleware::Middleware;
use crate::protocol::ProtocolAdapter;
use crate::reconnect::ReconnectStrategy;
use crate::tls::TlsConfig;
use crate::trace::{AlwaysOn, Sampler};

#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    pub interval: Duration,
    pub timeout: Duration,
    pub enabled: bool,
    pub max_lost_count: u32,
    pub min_interval: Duration,
    pub max_interval: Duration,
    pub adaptive: bool,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(10),
            enabled: true,
            max_lost_count: 3,
            min_interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(120),
            adaptive: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyType {
    Socks5,
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub proxy_type: ProxyType,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Callbacks invoked at lifecycle boundaries. Every slot is optional; the
/// runtime invokes whichever are set and ignores the rest.
#[derive(Clone, Default)]
pub struct LifecycleHooks {
    pub on_connecting: Option<Arc<dyn Fn() + Send + Sync>>,
    pub on_connected: Option<Arc<dyn Fn() + Send + Sync>>,
    pub on_disconnected: Option<Arc<dyn Fn(String) + Send + Sync>>,
    pub on_reconnecting: Option<Arc<dyn Fn(u32) + Send + Sync>>,
    pub on_error: Option<Arc<dyn Fn(String) + Send + Sync>>,
    pub on_message_sent: Option<Arc<dyn Fn(usize) + Send + Sync>>,
    pub on_message_received: Option<Arc<dyn Fn(usize) + Send + Sync>>,
}

impl std::fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleHooks").finish_non_exhaustive()
    }
}

pub struct ConnectionConfiguration {
    pub id: String,
    pub endpoint: Endpoint,
    pub protocol_adapter: Option<Arc<dyn ProtocolAdapter>>,
    pub reconnect_strategy: Option<Arc<dyn ReconnectStrategy>>,
    pub middleware: Vec<Arc<dyn Middleware>>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub heartbeat: HeartbeatConfig,
    pub tls: Option<TlsConfig>,
    pub proxy: Option<ProxyConfig>,
    pub hooks: LifecycleHooks,
    pub metadata: HashMap<String, String>,
    pub max_frame_size: usize,
    pub compression_enabled: bool,
    pub compression_threshold: usize,
    pub reconnect_on_interface_change_delay: Duration,
    pub trace_sampler: Arc<dyn Sampler>,
}

impl ConnectionConfiguration {
    pub fn builder(endpoint: Endpoint) -> ConnectionConfigurationBuilder {
        ConnectionConfigurationBuilder::new(endpoint)
    }
}

pub struct ConnectionConfigurationBuilder {
    id: Option<String>,
    endpoint: Endpoint,
    protocol_adapter: Option<Arc<dyn ProtocolAdapter>>,
    reconnect_strategy: Option<Arc<dyn ReconnectStrategy>>,
    middleware: Vec<Arc<dyn Middleware>>,
    connect_timeout: Duration,
    read_timeout: Duration,
    write_timeout: Duration,
    heartbeat: HeartbeatConfig,
    tls: Option<TlsConfig>,
    proxy: Option<ProxyConfig>,
    hooks: LifecycleHooks,
    metadata: HashMap<String, String>,
    max_frame_size: usize,
    compression_enabled: bool,
    compression_threshold: usize,
    reconnect_on_interface_change_delay: Duration,
    trace_sampler: Arc<dyn Sampler>,
}

impl ConnectionConfigurationBuilder {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            id: None,
            endpoint,
            protocol_adapter: None,
            reconnect_strategy: None,
            middleware: Vec::new(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(10),
            heartbeat: HeartbeatConfig::default(),
            tls: None,
            proxy: None,
            hooks: LifecycleHooks::default(),
            metadata: HashMap::new(),
            max_frame_size: 16 * 1024 * 1024,
            compression_enabled: false,
            compression_threshold: 1024,
            reconnect_on_interface_change_delay: Duration::from_millis(500),
            trace_sampler: Arc::new(AlwaysOn),
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn protocol_adapter(mut self, adapter: Arc<dyn ProtocolAdapter>) -> Self {
        self.protocol_adapter = Some(adapter);
        self
    }

    pub fn reconnect_strategy(mut self, strategy: Arc<dyn ReconnectStrategy>) -> Self {
        self.reconnect_strategy = Some(strategy);
        self
    }

    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn hooks(mut self, hooks: LifecycleHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    pub fn compression(mut self, enabled: bool, threshold: usize) -> Self {
        self.compression_enabled = enabled;
        self.compression_threshold = threshold;
        self
    }

    pub fn reconnect_on_interface_change_delay(mut self, delay: Duration) -> Self {
        self.reconnect_on_interface_change_delay = delay;
        self
    }

    /// Overrides the sampler deciding which of this connection's spans carry
    /// a sampled `traceparent`. Defaults to sampling everything.
    pub fn trace_sampler(mut self, sampler: Arc<dyn Sampler>) -> Self {
        self.trace_sampler = sampler;
        self
    }

    pub fn build(self) -> Result<ConnectionConfiguration> {
        if self.connect_timeout.is_zero() {
            return Err(NexusError::InvalidConfiguration("connect_timeout must be > 0".into()));
        }
        if self.read_timeout.is_zero() {
            return Err(NexusError::InvalidConfiguration("read_timeout must be > 0".into()));
        }
        if self.write_timeout.is_zero() {
            return Err(NexusError::InvalidConfiguration("write_timeout must be > 0".into()));
        }
        if self.heartbeat.enabled && self.heartbeat.max_lost_count == 0 {
            return Err(NexusError::InvalidConfiguration("heartbeat max_lost_count must be > 0".into()));
        }
        if self.heartbeat.enabled && self.heartbeat.interval > self.heartbeat.timeout {
            return Err(NexusError::InvalidConfiguration(
                "heartbeat interval must be <= heartbeat timeout".into(),
            ));
        }
        if self.max_frame_size < 20 {
            return Err(NexusError::InvalidConfiguration("max_frame_size must be >= 20".into()));
        }

        Ok(ConnectionConfiguration {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            endpoint: self.endpoint,
            protocol_adapter: self.protocol_adapter,
            reconnect_strategy: self.reconnect_strategy,
            middleware: self.middleware,
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            heartbeat: self.heartbeat,
            tls: self.tls,
            proxy: self.proxy,
            hooks: self.hooks,
            metadata: self.metadata,
            max_frame_size: self.max_frame_size,
            compression_enabled: self.compression_enabled,
            compression_threshold: self.compression_threshold,
            reconnect_on_interface_change_delay: self.reconnect_on_interface_change_delay,
            trace_sampler: self.trace_sampler,
        })
    }
}

/// Process-wide defaults consumed by the `NexusKit` singleton.
#[derive(Debug, Clone)]
pub struct NexusKitConfig {
    pub default_connect_timeout: Duration,
    pub default_read_timeout: Duration,
    pub default_write_timeout: Duration,
    pub max_concurrent_connections: usize,
    pub stats_retention: Duration,
}

impl Default for NexusKitConfig {
    fn default() -> Self {
        Self {
            default_connect_timeout: Duration::from_secs(10),
            default_read_timeout: Duration::from_secs(30),
            default_write_timeout: Duration::from_secs(10),
            max_concurrent_connections: 256,
            stats_retention: Duration::from_secs(300),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_default_assigns_uuid() {
        let cfg = ConnectionConfiguration::builder(Endpoint::tcp("h", 1)).build().unwrap();
        assert!(!cfg.id.is_empty());
    }

    #[test]
    fn test_build_rejects_zero_timeout() {
        let err = ConnectionConfiguration::builder(Endpoint::tcp("h", 1))
            .connect_timeout(Duration::from_secs(0))
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn test_build_rejects_zero_lost_count() {
        let mut hb = HeartbeatConfig::default();
        hb.max_lost_count = 0;
        let err = ConnectionConfiguration::builder(Endpoint::tcp("h", 1)).heartbeat(hb).build();
        assert!(err.is_err());
    }

    #[test]
    fn test_build_rejects_interval_exceeding_timeout() {
        let mut hb = HeartbeatConfig::default();
        hb.interval = Duration::from_secs(60);
        hb.timeout = Duration::from_secs(10);
        let err = ConnectionConfiguration::builder(Endpoint::tcp("h", 1)).heartbeat(hb).build();
        assert!(err.is_err());
    }

    #[test]
    fn test_trace_sampler_defaults_to_always_on() {
        let cfg = ConnectionConfiguration::builder(Endpoint::tcp("h", 1)).build().unwrap();
        assert!(cfg.trace_sampler.should_sample(crate::trace::TraceId::generate()));
    }

    #[test]
    fn test_trace_sampler_override_is_honored() {
        let cfg = ConnectionConfiguration::builder(Endpoint::tcp("h", 1))
            .trace_sampler(Arc::new(crate::trace::AlwaysOff))
            .build()
            .unwrap();
        assert!(!cfg.trace_sampler.should_sample(crate::trace::TraceId::generate()));
    }

    #[test]
    fn test_custom_id_preserved() {
        let cfg = ConnectionConfiguration::builder(Endpoint::tcp("h", 1))
            .id("my-conn")
            .build()
            .unwrap();
        assert_eq!(cfg.id, "my-conn");
    }
}
