//! Registry of live connections keyed by id, with TTL-bounded retention of
//! stats after a connection disconnects so dashboards can still show the
//! tail end of its history for a while.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::NexusKitConfig;
use crate::connection::{Connection, ConnectionStats};
use crate::error::{NexusError, Result};

struct Entry {
    connection: Weak<Connection>,
    last_seen: Instant,
    last_stats: ConnectionStats,
}

/// Aggregated counters across every connection currently (or recently)
/// registered.
#[derive(Debug, Default, Clone)]
pub struct ManagerStats {
    pub active_connections: usize,
    pub total_bytes_sent: u64,
    pub total_bytes_received: u64,
    pub total_messages_sent: u64,
    pub total_messages_received: u64,
}

/// Holds weak references to connections; a dropped `Arc<Connection>` is
/// pruned lazily the next time its entry is touched.
pub struct ConnectionManager {
    connections: DashMap<String, Entry>,
    max_concurrent: usize,
    retention: Duration,
}

impl ConnectionManager {
    pub fn new(config: &NexusKitConfig) -> Self {
        Self {
            connections: DashMap::new(),
            max_concurrent: config.max_concurrent_connections,
            retention: config.stats_retention,
        }
    }

    /// Registers `connection` under its own id. Fails if an entry with that
    /// id is already live, or the concurrent-connection ceiling is hit.
    pub fn register(&self, connection: &Arc<Connection>) -> Result<()> {
        let id = connection.id().to_string();
        if let Some(existing) = self.connections.get(&id) {
            if existing.connection.strong_count() > 0 {
                return Err(NexusError::AlreadyExists(id));
            }
        }
        if self.live_count() >= self.max_concurrent {
            return Err(NexusError::ResourceExhausted(format!(
                "max_concurrent_connections ({}) reached",
                self.max_concurrent
            )));
        }
        self.connections.insert(
            id,
            Entry {
                connection: Arc::downgrade(connection),
                last_seen: Instant::now(),
                last_stats: ConnectionStats::default(),
            },
        );
        Ok(())
    }

    /// Looks up a still-live connection by id.
    pub fn get(&self, id: &str) -> Option<Arc<Connection>> {
        let conn = self.connections.get(id)?.connection.upgrade();
        if conn.is_none() {
            self.connections.remove(id);
        }
        conn
    }

    /// Every connection currently reachable, regardless of state.
    pub fn all_active(&self) -> Vec<Arc<Connection>> {
        self.sync_and_prune();
        self.connections.iter().filter_map(|e| e.connection.upgrade()).collect()
    }

    pub async fn disconnect(&self, id: &str, reason: impl Into<String>) -> Result<()> {
        let connection = self.get(id).ok_or_else(|| NexusError::NotFound(id.to_string()))?;
        connection.disconnect(reason).await
    }

    /// Disconnects every live connection, continuing past individual
    /// failures. Used on process teardown.
    pub async fn disconnect_all(&self) {
        for connection in self.all_active() {
            let _ = connection.disconnect("manager shutdown").await;
        }
    }

    pub fn stats(&self) -> ManagerStats {
        self.sync_and_prune();
        let mut stats = ManagerStats::default();
        for entry in self.connections.iter() {
            stats.active_connections += 1;
            stats.total_bytes_sent += entry.last_stats.bytes_sent;
            stats.total_bytes_received += entry.last_stats.bytes_received;
            stats.total_messages_sent += entry.last_stats.messages_sent;
            stats.total_messages_received += entry.last_stats.messages_received;
        }
        stats
    }

    fn live_count(&self) -> usize {
        self.connections.iter().filter(|e| e.connection.strong_count() > 0).count()
    }

    /// Refreshes the cached stats snapshot for every live connection and
    /// prunes entries whose connection dropped more than `retention` ago.
    fn sync_and_prune(&self) {
        let now = Instant::now();
        let mut stale = Vec::new();
        for mut entry in self.connections.iter_mut() {
            match entry.connection.upgrade() {
                Some(conn) => {
                    entry.last_stats = conn.stats();
                    entry.last_seen = now;
                }
                None => {
                    if now.duration_since(entry.last_seen) > self.retention {
                        stale.push(entry.key().clone());
                    }
                }
            }
        }
        for id in stale {
            self.connections.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfiguration;
    use crate::endpoint::Endpoint;

    fn manager() -> ConnectionManager {
        ConnectionManager::new(&NexusKitConfig { max_concurrent_connections: 2, ..Default::default() })
    }

    fn connection(id: &str) -> Arc<Connection> {
        let cfg = ConnectionConfiguration::builder(Endpoint::tcp("127.0.0.1", 1))
            .id(id)
            .build()
            .unwrap();
        Connection::new(cfg)
    }

    #[test]
    fn test_register_and_get() {
        let manager = manager();
        let conn = connection("a");
        manager.register(&conn).unwrap();
        assert!(manager.get("a").is_some());
        assert!(manager.get("missing").is_none());
    }

    #[test]
    fn test_register_rejects_duplicate_live_id() {
        let manager = manager();
        let conn = connection("a");
        manager.register(&conn).unwrap();
        let err = manager.register(&conn).unwrap_err();
        assert!(matches!(err, NexusError::AlreadyExists(_)));
    }

    #[test]
    fn test_register_enforces_concurrency_ceiling() {
        let manager = manager();
        manager.register(&connection("a")).unwrap();
        manager.register(&connection("b")).unwrap();
        let err = manager.register(&connection("c")).unwrap_err();
        assert!(matches!(err, NexusError::ResourceExhausted(_)));
    }

    #[test]
    fn test_dropped_connection_is_pruned_on_lookup() {
        let manager = manager();
        {
            let conn = connection("a");
            manager.register(&conn).unwrap();
        }
        assert!(manager.get("a").is_none());
    }

    #[test]
    fn test_all_active_reflects_only_live_connections() {
        let manager = manager();
        let a = connection("a");
        manager.register(&a).unwrap();
        assert_eq!(manager.all_active().len(), 1);
        drop(a);
        assert_eq!(manager.all_active().len(), 0);
    }

    #[test]
    fn test_stats_aggregates_across_connections() {
        let manager = manager();
        let a = connection("a");
        manager.register(&a).unwrap();
        let stats = manager.stats();
        assert_eq!(stats.active_connections, 1);
        assert_eq!(stats.total_bytes_sent, 0);
    }

    #[test]
    fn test_disconnect_all_is_noop_with_no_connections() {
        let manager = manager();
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(manager.disconnect_all());
    }

    #[test]
    fn test_live_count_ignores_expired_weak_refs() {
        let manager = manager();
        {
            let conn = connection("a");
            manager.register(&conn).unwrap();
        }
        assert_eq!(manager.live_count(), 0);
    }
}
