//! Canonical error taxonomy.
//!
//! One enum covering every failure surface in the connection runtime,
//! grouped the way the design document's taxonomy groups them (connection,
//! authentication, TLS, proxy, protocol, state, resource, middleware,
//! configuration).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NexusError {
    // ---- Connection ----
    #[error("connection timed out after {0:?}")]
    ConnectionTimeout(std::time::Duration),
    #[error("connection refused")]
    ConnectionRefused,
    #[error("host unreachable")]
    Unreachable,
    #[error("connection closed")]
    ConnectionClosed,
    #[error("not connected")]
    NotConnected,
    #[error("connection '{0}' already exists")]
    AlreadyExists(String),
    #[error("connection '{0}' not found")]
    NotFound(String),
    #[error("heartbeat timeout")]
    HeartbeatTimeout,

    // ---- Authentication ----
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("certificate validation failed: {0}")]
    CertValidationFailed(String),
    #[error("untrusted certificate")]
    UntrustedCertificate,

    // ---- TLS ----
    #[error("TLS handshake failed: {0}")]
    TlsHandshakeFailed(String),
    #[error("failed to load certificate: {0}")]
    CertLoadFailed(String),
    #[error("TLS error: {0}")]
    TlsError(String),

    // ---- Proxy ----
    #[error("proxy connection failed: {0}")]
    ProxyConnectionFailed(String),
    #[error("proxy authentication failed")]
    ProxyAuthFailed,
    #[error("unsupported proxy type: {0}")]
    UnsupportedProxyType(String),

    // ---- Protocol ----
    #[error("protocol error: {0}")]
    ProtocolError(String),
    #[error("invalid message format: {0}")]
    InvalidMessageFormat(String),
    #[error("unsupported protocol version")]
    UnsupportedProtocolVersion,
    #[error("encoding failed: {0}")]
    EncodingFailed(String),
    #[error("decoding failed: {0}")]
    DecodingFailed(String),
    #[error("no protocol adapter configured")]
    NoProtocolAdapter,
    #[error("invalid response for request {0}")]
    InvalidResponse(u32),
    #[error("request timed out")]
    RequestTimeout,

    // ---- State ----
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition { from: String, to: String },
    #[error("operation not allowed in state {0:?}")]
    OperationNotAllowed(String),
    #[error("unsupported operation '{op}': {reason}")]
    UnsupportedOperation { op: String, reason: String },

    // ---- Resource ----
    #[error("buffer overflow: attempted to hold more than {0} bytes")]
    BufferOverflow(usize),
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    #[error("out of memory")]
    OutOfMemory,

    // ---- Middleware ----
    #[error("middleware '{name}' failed: {underlying}")]
    MiddlewareError { name: String, underlying: String },
    #[error("middleware chain broken")]
    MiddlewareChainBroken,
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    // ---- Configuration ----
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("missing required configuration key: {0}")]
    MissingRequired(String),
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    // ---- I/O passthrough ----
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl NexusError {
    /// Whether a reconnection/retry attempt is sensible after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NexusError::ConnectionTimeout(_)
                | NexusError::ConnectionRefused
                | NexusError::Unreachable
                | NexusError::ConnectionClosed
                | NexusError::HeartbeatTimeout
                | NexusError::Io(_)
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            NexusError::ConnectionTimeout(_) | NexusError::RequestTimeout | NexusError::HeartbeatTimeout
        )
    }

    /// Whether this error leaves the connection unable to return to
    /// `Connected` without being torn down and rebuilt from scratch.
    pub fn poisons_connection(&self) -> bool {
        matches!(
            self,
            NexusError::ProtocolError(_)
                | NexusError::TlsHandshakeFailed(_)
                | NexusError::InvalidConfiguration(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, NexusError>;
