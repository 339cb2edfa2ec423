//! Dashboard metrics aggregator: polls the connection manager into a bounded
//! history ring, fans snapshots out to subscribers, and renders JSON and
//! textual reports.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::error::{NexusError, Result};
use crate::manager::ConnectionManager;
use crate::state::ConnectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Degraded,
    Unhealthy,
}

impl Health {
    fn as_str(self) -> &'static str {
        match self {
            Health::Healthy => "healthy",
            Health::Degraded => "degraded",
            Health::Unhealthy => "unhealthy",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionSnapshot {
    pub id: String,
    pub endpoint: String,
    pub state: &'static str,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
}

#[derive(Debug, Clone)]
pub struct HistoryPoint {
    pub timestamp: SystemTime,
    pub active_connections: usize,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub qps: f64,
}

/// One polled sample of process-wide state, cheap to clone for fan-out.
#[derive(Debug, Clone)]
pub struct OverviewSnapshot {
    pub timestamp: SystemTime,
    pub total_connections: u64,
    pub active_connections: usize,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub error_count: u64,
    pub qps: f64,
    pub avg_latency: Duration,
    pub health: Health,
    pub connections: Vec<ConnectionSnapshot>,
}

pub struct DashboardConfig {
    pub history_retention: Duration,
    pub max_history_points: usize,
    pub max_subscribers: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            history_retention: Duration::from_secs(3600),
            max_history_points: 720,
            max_subscribers: 16,
        }
    }
}

struct Inner {
    history: VecDeque<HistoryPoint>,
    last_sample: Option<(SystemTime, u64)>,
    latest: Option<OverviewSnapshot>,
}

/// Process-wide metrics aggregator. One instance lives on the `NexusKit`
/// singleton; `sample` is called periodically (or on demand) against the
/// live `ConnectionManager`.
pub struct MetricsAggregator {
    config: DashboardConfig,
    inner: RwLock<Inner>,
    subscribers: broadcast::Sender<OverviewSnapshot>,
    total_connections: AtomicU64,
    error_count: AtomicU64,
    latency_sum_ms: AtomicU64,
    latency_count: AtomicU64,
}

impl MetricsAggregator {
    pub fn new(config: DashboardConfig) -> Self {
        let (subscribers, _) = broadcast::channel(64);
        Self {
            config,
            inner: RwLock::new(Inner { history: VecDeque::new(), last_sample: None, latest: None }),
            subscribers,
            total_connections: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            latency_sum_ms: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
        }
    }

    /// Called once per successful `Connection::connect` so the monotonic
    /// total survives connections being dropped from the manager.
    pub fn record_connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_latency(&self, latency: Duration) {
        self.latency_sum_ms.fetch_add(latency.as_millis() as u64, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Registers a new subscriber, failing once `max_subscribers` receivers
    /// are already attached.
    pub fn subscribe(&self) -> Result<broadcast::Receiver<OverviewSnapshot>> {
        if self.subscribers.receiver_count() >= self.config.max_subscribers {
            return Err(NexusError::ResourceExhausted("dashboard subscriber limit reached".to_string()));
        }
        Ok(self.subscribers.subscribe())
    }

    /// Polls `manager`, appends a history point, broadcasts to subscribers,
    /// and returns the new snapshot.
    pub fn sample(&self, manager: &ConnectionManager) -> OverviewSnapshot {
        let stats = manager.stats();
        let connections = manager
            .all_active()
            .iter()
            .map(|c| ConnectionSnapshot {
                id: c.id().to_string(),
                endpoint: c.endpoint().to_string(),
                state: state_tag(c.state()),
                bytes_sent: c.stats().bytes_sent,
                bytes_received: c.stats().bytes_received,
                messages_sent: c.stats().messages_sent,
                messages_received: c.stats().messages_received,
            })
            .collect();

        let now = SystemTime::now();
        let latency_count = self.latency_count.load(Ordering::Relaxed);
        let avg_latency = if latency_count == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(self.latency_sum_ms.load(Ordering::Relaxed) / latency_count)
        };
        let error_count = self.error_count.load(Ordering::Relaxed);

        let qps = {
            let mut inner = self.inner.write();
            let total_messages = stats.total_messages_sent + stats.total_messages_received;
            let qps = match inner.last_sample {
                Some((prev_time, prev_total)) => {
                    let elapsed = now.duration_since(prev_time).unwrap_or(Duration::from_secs(1)).as_secs_f64().max(0.001);
                    (total_messages.saturating_sub(prev_total)) as f64 / elapsed
                }
                None => 0.0,
            };
            inner.last_sample = Some((now, total_messages));
            qps
        };

        let health = if error_count > 0 && stats.active_connections == 0 {
            Health::Unhealthy
        } else if qps == 0.0 && stats.active_connections > 0 {
            Health::Degraded
        } else {
            Health::Healthy
        };

        let snapshot = OverviewSnapshot {
            timestamp: now,
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: stats.active_connections,
            bytes_sent: stats.total_bytes_sent,
            bytes_received: stats.total_bytes_received,
            messages_sent: stats.total_messages_sent,
            messages_received: stats.total_messages_received,
            error_count,
            qps,
            avg_latency,
            health,
            connections,
        };

        {
            let mut inner = self.inner.write();
            inner.history.push_back(HistoryPoint {
                timestamp: now,
                active_connections: snapshot.active_connections,
                bytes_sent: snapshot.bytes_sent,
                bytes_received: snapshot.bytes_received,
                qps: snapshot.qps,
            });
            while inner.history.len() > self.config.max_history_points {
                inner.history.pop_front();
            }
            let retention = self.config.history_retention;
            while inner.history.front().is_some_and(|p| now.duration_since(p.timestamp).unwrap_or(Duration::ZERO) > retention) {
                inner.history.pop_front();
            }
            inner.latest = Some(snapshot.clone());
        }

        let _ = self.subscribers.send(snapshot.clone());
        snapshot
    }

    pub fn latest(&self) -> Option<OverviewSnapshot> {
        self.inner.read().latest.clone()
    }

    pub fn history(&self) -> Vec<HistoryPoint> {
        self.inner.read().history.iter().cloned().collect()
    }

    pub fn to_json(snapshot: &OverviewSnapshot) -> String {
        let timestamp: DateTime<Utc> = snapshot.timestamp.into();
        let connections: Vec<serde_json::Value> = snapshot
            .connections
            .iter()
            .map(|c| {
                serde_json::json!({
                    "id": c.id,
                    "endpoint": c.endpoint,
                    "state": c.state,
                    "bytesSent": c.bytes_sent,
                    "bytesReceived": c.bytes_received,
                    "messagesSent": c.messages_sent,
                    "messagesReceived": c.messages_received,
                })
            })
            .collect();

        serde_json::json!({
            "timestamp": timestamp.to_rfc3339(),
            "overview": {
                "totalConnections": snapshot.total_connections,
                "activeConnections": snapshot.active_connections,
                "bytesSent": snapshot.bytes_sent,
                "bytesReceived": snapshot.bytes_received,
                "messagesSent": snapshot.messages_sent,
                "messagesReceived": snapshot.messages_received,
                "errorCount": snapshot.error_count,
                "qps": snapshot.qps,
                "avgLatencyMs": snapshot.avg_latency.as_millis() as u64,
            },
            "health": snapshot.health.as_str(),
            "connections": connections,
        })
        .to_string()
    }

    pub fn to_text_report(snapshot: &OverviewSnapshot) -> String {
        let timestamp: DateTime<Utc> = snapshot.timestamp.into();
        let mut report = String::new();
        report.push_str(&format!("=== NexusKit Dashboard ({}) ===\n\n", timestamp.to_rfc3339()));

        report.push_str("-- Overview --\n");
        report.push_str(&format!("total connections:     {}\n", snapshot.total_connections));
        report.push_str(&format!("active connections:    {}\n", snapshot.active_connections));
        report.push_str(&format!("bytes sent/received:   {}/{}\n", snapshot.bytes_sent, snapshot.bytes_received));
        report.push_str(&format!("messages sent/received:{}/{}\n", snapshot.messages_sent, snapshot.messages_received));
        report.push_str(&format!("errors:                {}\n\n", snapshot.error_count));

        report.push_str("-- Health --\n");
        report.push_str(&format!("status: {}\n\n", snapshot.health.as_str()));

        report.push_str("-- Connections --\n");
        if snapshot.connections.is_empty() {
            report.push_str("(none)\n");
        }
        for c in &snapshot.connections {
            report.push_str(&format!("{} [{}] {} tx={} rx={}\n", c.id, c.state, c.endpoint, c.bytes_sent, c.bytes_received));
        }
        report.push('\n');

        report.push_str("-- Performance --\n");
        report.push_str(&format!("qps:         {:.2}\n", snapshot.qps));
        report.push_str(&format!("avg latency: {:?}\n", snapshot.avg_latency));

        report
    }
}

fn state_tag(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Disconnected => "disconnected",
        ConnectionState::Connecting => "connecting",
        ConnectionState::Connected => "connected",
        ConnectionState::Reconnecting { .. } => "reconnecting",
        ConnectionState::Disconnecting => "disconnecting",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionConfiguration, NexusKitConfig};
    use crate::endpoint::Endpoint;
    use crate::connection::Connection;

    fn aggregator() -> MetricsAggregator {
        MetricsAggregator::new(DashboardConfig { history_retention: Duration::from_secs(60), max_history_points: 3, max_subscribers: 1 })
    }

    #[test]
    fn test_sample_with_no_connections_is_healthy() {
        let manager = ConnectionManager::new(&NexusKitConfig::default());
        let agg = aggregator();
        let snapshot = agg.sample(&manager);
        assert_eq!(snapshot.active_connections, 0);
        assert_eq!(snapshot.health, Health::Healthy);
    }

    #[test]
    fn test_sample_includes_registered_connection() {
        let manager = ConnectionManager::new(&NexusKitConfig::default());
        let cfg = ConnectionConfiguration::builder(Endpoint::tcp("h", 1)).id("c1").build().unwrap();
        let conn = Connection::new(cfg);
        manager.register(&conn).unwrap();

        let agg = aggregator();
        let snapshot = agg.sample(&manager);
        assert_eq!(snapshot.connections.len(), 1);
        assert_eq!(snapshot.connections[0].id, "c1");
    }

    #[test]
    fn test_history_bounded_by_max_points() {
        let manager = ConnectionManager::new(&NexusKitConfig::default());
        let agg = aggregator();
        for _ in 0..5 {
            agg.sample(&manager);
        }
        assert!(agg.history().len() <= 3);
    }

    #[test]
    fn test_subscriber_limit_enforced() {
        let agg = aggregator();
        let _first = agg.subscribe().unwrap();
        let err = agg.subscribe().unwrap_err();
        assert!(matches!(err, NexusError::ResourceExhausted(_)));
    }

    #[test]
    fn test_json_and_text_report_render() {
        let manager = ConnectionManager::new(&NexusKitConfig::default());
        let agg = aggregator();
        let snapshot = agg.sample(&manager);

        let json = MetricsAggregator::to_json(&snapshot);
        assert!(json.contains("\"activeConnections\":0"));

        let text = MetricsAggregator::to_text_report(&snapshot);
        assert!(text.contains("-- Overview --"));
        assert!(text.contains("-- Health --"));
        assert!(text.contains("-- Connections --"));
        assert!(text.contains("-- Performance --"));
    }

    #[test]
    fn test_error_count_reflected_in_snapshot() {
        let manager = ConnectionManager::new(&NexusKitConfig::default());
        let agg = aggregator();
        agg.record_error();
        agg.record_error();
        let snapshot = agg.sample(&manager);
        assert_eq!(snapshot.error_count, 2);
    }
}
