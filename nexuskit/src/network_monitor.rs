//! Reachability and interface-change polling.
//!
//! No OS-level path monitor API is used; reachability is inferred by probing
//! a TCP endpoint, and interface changes by watching which local address the
//! kernel would route a packet to the probe target through. Both are cheap
//! enough to poll on an interval without raising a platform dependency.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReachabilityStatus {
    Reachable,
    Unreachable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    Connected(ReachabilityStatus),
    Disconnected,
    InterfaceChanged { from: Option<IpAddr>, to: Option<IpAddr> },
    StatusChanged(ReachabilityStatus),
}

#[derive(Debug, Clone)]
pub struct NetworkMonitorConfig {
    pub poll_interval: Duration,
    pub probe_host: String,
    pub probe_port: u16,
    pub probe_timeout: Duration,
}

impl Default for NetworkMonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            probe_host: "1.1.1.1".to_string(),
            probe_port: 443,
            probe_timeout: Duration::from_secs(3),
        }
    }
}

struct State {
    status: Option<ReachabilityStatus>,
    local_addr: Option<IpAddr>,
}

/// Polls reachability and the locally-routed interface address, emitting
/// transitions. Construct with [`NetworkMonitor::new`], then [`start`](NetworkMonitor::start).
pub struct NetworkMonitor {
    config: NetworkMonitorConfig,
    state: Mutex<State>,
    running: AtomicBool,
}

impl NetworkMonitor {
    pub fn new(config: NetworkMonitorConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Mutex::new(State { status: None, local_addr: None }),
            running: AtomicBool::new(false),
        })
    }

    /// Spawns the polling loop. `on_event` fires for every detected
    /// transition (not on every poll — a steady reachable/unreachable state
    /// produces no events after the first).
    pub fn start<F>(self: &Arc<Self>, mut on_event: F) -> JoinHandle<()>
    where
        F: FnMut(NetworkEvent) + Send + 'static,
    {
        self.running.store(true, Ordering::SeqCst);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            while this.running.load(Ordering::SeqCst) {
                this.poll_once(&mut on_event).await;
                tokio::time::sleep(this.config.poll_interval).await;
            }
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    async fn poll_once(&self, on_event: &mut impl FnMut(NetworkEvent)) {
        let reachable = self.probe().await;
        let local_addr = local_routed_address(&self.config.probe_host, self.config.probe_port);

        let mut state = self.state.lock();
        let status = if reachable { ReachabilityStatus::Reachable } else { ReachabilityStatus::Unreachable };

        match state.status {
            None => {
                on_event(NetworkEvent::Connected(status));
            }
            Some(prev) if prev != status => {
                on_event(NetworkEvent::StatusChanged(status));
                on_event(if status == ReachabilityStatus::Reachable {
                    NetworkEvent::Connected(status)
                } else {
                    NetworkEvent::Disconnected
                });
            }
            _ => {}
        }

        if state.local_addr != local_addr && (state.local_addr.is_some() || local_addr.is_some()) {
            on_event(NetworkEvent::InterfaceChanged { from: state.local_addr, to: local_addr });
        }

        state.status = Some(status);
        state.local_addr = local_addr;
    }

    async fn probe(&self) -> bool {
        let attempt = TcpStream::connect((self.config.probe_host.as_str(), self.config.probe_port));
        matches!(tokio::time::timeout(self.config.probe_timeout, attempt).await, Ok(Ok(_)))
    }
}

/// The local address the kernel would route a packet to `host:port` through,
/// found via a connected UDP socket (no packets are actually sent).
fn local_routed_address(host: &str, port: u16) -> Option<IpAddr> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect((host, port)).ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::net::TcpListener;

    #[test]
    fn test_local_routed_address_resolves_for_loopback() {
        let addr = local_routed_address("127.0.0.1", 9);
        assert!(addr.is_some());
    }

    #[tokio::test]
    async fn test_first_poll_emits_connected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let _ = listener.accept().await;
            }
        });

        let monitor = NetworkMonitor::new(NetworkMonitorConfig {
            probe_host: addr.ip().to_string(),
            probe_port: addr.port(),
            poll_interval: Duration::from_millis(20),
            probe_timeout: Duration::from_millis(200),
        });

        let events = Arc::new(Mutex::new(Vec::new()));
        let events2 = Arc::clone(&events);
        monitor.poll_once(&mut |e| events2.lock().push(e)).await;

        let recorded = events.lock();
        assert!(matches!(recorded[0], NetworkEvent::Connected(ReachabilityStatus::Reachable)));
    }

    #[tokio::test]
    async fn test_unreachable_probe_emits_disconnected_transition() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let monitor = NetworkMonitor::new(NetworkMonitorConfig {
            probe_host: addr.ip().to_string(),
            probe_port: addr.port(),
            poll_interval: Duration::from_millis(20),
            probe_timeout: Duration::from_millis(100),
        });

        let events = Arc::new(Mutex::new(Vec::new()));
        let events2 = Arc::clone(&events);
        monitor.poll_once(&mut |e| events2.lock().push(e)).await;

        let recorded = events.lock();
        assert!(matches!(recorded[0], NetworkEvent::Connected(ReachabilityStatus::Unreachable)));
    }

    #[tokio::test]
    async fn test_status_flip_emits_status_changed_and_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept_count = Arc::new(AtomicUsize::new(0));
        let accept_count2 = Arc::clone(&accept_count);
        tokio::spawn(async move {
            loop {
                if let Ok((stream, _)) = listener.accept().await {
                    accept_count2.fetch_add(1, Ordering::SeqCst);
                    drop(stream);
                }
            }
        });

        let monitor = NetworkMonitor::new(NetworkMonitorConfig {
            probe_host: addr.ip().to_string(),
            probe_port: addr.port(),
            poll_interval: Duration::from_millis(20),
            probe_timeout: Duration::from_millis(200),
        });

        let events = Arc::new(Mutex::new(Vec::new()));
        let events2 = Arc::clone(&events);
        monitor.poll_once(&mut |e| events2.lock().push(e)).await;
        {
            let mut state = monitor.state.lock();
            state.status = Some(ReachabilityStatus::Unreachable);
        }
        let events3 = Arc::clone(&events);
        monitor.poll_once(&mut |e| events3.lock().push(e)).await;

        let recorded = events.lock();
        assert!(recorded.iter().any(|e| matches!(e, NetworkEvent::StatusChanged(ReachabilityStatus::Reachable))));
    }

    #[test]
    fn test_stop_halts_running_flag() {
        let monitor = NetworkMonitor::new(NetworkMonitorConfig::default());
        monitor.running.store(true, Ordering::SeqCst);
        monitor.stop();
        assert!(!monitor.running.load(Ordering::SeqCst));
    }
}
