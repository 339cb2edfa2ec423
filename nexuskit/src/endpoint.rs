//! Typed endpoint — the logical target of a connection, independent of any
//! intermediate proxy.

use std::fmt;

use crate::error::{NexusError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    WebSocket { url: String },
    SocketIo { url: String, namespace: String },
    Custom { host: String, port: u16, scheme: String },
}

impl Endpoint {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Endpoint::Tcp { host: host.into(), port }
    }

    pub fn websocket(url: impl Into<String>) -> Self {
        Endpoint::WebSocket { url: url.into() }
    }

    pub fn socket_io(url: impl Into<String>, namespace: impl Into<String>) -> Self {
        Endpoint::SocketIo {
            url: url.into(),
            namespace: namespace.into(),
        }
    }

    pub fn custom(host: impl Into<String>, port: u16, scheme: impl Into<String>) -> Self {
        Endpoint::Custom {
            host: host.into(),
            port,
            scheme: scheme.into(),
        }
    }

    pub fn host(&self) -> Result<String> {
        match self {
            Endpoint::Tcp { host, .. } | Endpoint::Custom { host, .. } => Ok(host.clone()),
            Endpoint::WebSocket { url } | Endpoint::SocketIo { url, .. } => {
                url::Url::parse(url)
                    .ok()
                    .and_then(|u| u.host_str().map(|h| h.to_string()))
                    .ok_or_else(|| NexusError::InvalidEndpoint(url.clone()))
            }
        }
    }

    /// Port, falling back to the scheme default (443 for secure, 80 otherwise)
    /// when the URL-based variants don't carry an explicit one.
    pub fn port(&self) -> Result<u16> {
        match self {
            Endpoint::Tcp { port, .. } | Endpoint::Custom { port, .. } => Ok(*port),
            Endpoint::WebSocket { url } | Endpoint::SocketIo { url, .. } => {
                let parsed = url::Url::parse(url).map_err(|_| NexusError::InvalidEndpoint(url.clone()))?;
                Ok(parsed.port_or_known_default().unwrap_or(if self.is_secure() { 443 } else { 80 }))
            }
        }
    }

    pub fn is_secure(&self) -> bool {
        match self {
            Endpoint::Tcp { .. } => false,
            Endpoint::Custom { scheme, .. } => scheme.eq_ignore_ascii_case("tls") || scheme.eq_ignore_ascii_case("ssl"),
            Endpoint::WebSocket { url } => url.starts_with("wss://"),
            Endpoint::SocketIo { url, .. } => url.starts_with("https://") || url.starts_with("wss://"),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            Endpoint::WebSocket { url } => write!(f, "{url}"),
            Endpoint::SocketIo { url, namespace } => write!(f, "{url}{namespace}"),
            Endpoint::Custom { host, port, scheme } => write!(f, "{scheme}://{host}:{port}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_endpoint() {
        let e = Endpoint::tcp("example.com", 8080);
        assert_eq!(e.host().unwrap(), "example.com");
        assert_eq!(e.port().unwrap(), 8080);
        assert!(!e.is_secure());
    }

    #[test]
    fn test_custom_secure_scheme() {
        let e = Endpoint::custom("example.com", 9443, "tls");
        assert!(e.is_secure());
    }

    #[test]
    fn test_websocket_secure() {
        let e = Endpoint::websocket("wss://example.com/socket");
        assert!(e.is_secure());
        assert_eq!(e.host().unwrap(), "example.com");
    }

    #[test]
    fn test_display() {
        let e = Endpoint::tcp("host", 1234);
        assert_eq!(e.to_string(), "tcp://host:1234");
    }
}
