//! Request/response interceptor chains: a lighter-weight middleware variant
//! for cross-cutting concerns that don't need their own pipeline stage.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use nexuskit_log::info;

use crate::error::{NexusError, Result};
use crate::middleware::{Middleware, MiddlewareContext};

/// A single interceptor hook, applied by an `InterceptorChain` middleware.
/// Unlike `Middleware`, an interceptor can veto a message outright.
#[async_trait]
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &str;
    async fn intercept(&self, bytes: Bytes, ctx: &mut MiddlewareContext) -> Result<Bytes>;
}

/// Logs every message that passes through, at `info` level, with byte count.
pub struct LoggingInterceptor;

#[async_trait]
impl Interceptor for LoggingInterceptor {
    fn name(&self) -> &str {
        "logging"
    }

    async fn intercept(&self, bytes: Bytes, ctx: &mut MiddlewareContext) -> Result<Bytes> {
        info!(target: "nexuskit::middleware::interceptor", "message passed through connection={} bytes={}", ctx.connection_id, bytes.len());
        Ok(bytes)
    }
}

/// Rejects messages outside a configured size range.
pub struct ValidationInterceptor {
    pub min_size: Option<usize>,
    pub max_size: Option<usize>,
    pub custom: Option<Arc<dyn Fn(&[u8]) -> bool + Send + Sync>>,
}

#[async_trait]
impl Interceptor for ValidationInterceptor {
    fn name(&self) -> &str {
        "validation"
    }

    async fn intercept(&self, bytes: Bytes, _ctx: &mut MiddlewareContext) -> Result<Bytes> {
        if let Some(min) = self.min_size {
            if bytes.len() < min {
                return Err(NexusError::MiddlewareChainBroken);
            }
        }
        if let Some(max) = self.max_size {
            if bytes.len() > max {
                return Err(NexusError::MiddlewareChainBroken);
            }
        }
        if let Some(custom) = &self.custom {
            if !custom(&bytes) {
                return Err(NexusError::MiddlewareChainBroken);
            }
        }
        Ok(bytes)
    }
}

/// Applies an arbitrary byte-to-byte transform.
pub struct TransformInterceptor {
    pub transform: Arc<dyn Fn(Bytes) -> Bytes + Send + Sync>,
}

#[async_trait]
impl Interceptor for TransformInterceptor {
    fn name(&self) -> &str {
        "transform"
    }

    async fn intercept(&self, bytes: Bytes, _ctx: &mut MiddlewareContext) -> Result<Bytes> {
        Ok((self.transform)(bytes))
    }
}

/// Introduces an artificial delay, for testing backpressure and timeout
/// handling without a real slow peer.
pub struct ThrottleInterceptor {
    pub delay: Duration,
}

#[async_trait]
impl Interceptor for ThrottleInterceptor {
    fn name(&self) -> &str {
        "throttle"
    }

    async fn intercept(&self, bytes: Bytes, _ctx: &mut MiddlewareContext) -> Result<Bytes> {
        tokio::time::sleep(self.delay).await;
        Ok(bytes)
    }
}

/// Runs the wrapped interceptor only when `predicate` returns true.
pub struct ConditionalInterceptor {
    pub predicate: Arc<dyn Fn(&MiddlewareContext) -> bool + Send + Sync>,
    pub inner: Arc<dyn Interceptor>,
}

#[async_trait]
impl Interceptor for ConditionalInterceptor {
    fn name(&self) -> &str {
        "conditional"
    }

    async fn intercept(&self, bytes: Bytes, ctx: &mut MiddlewareContext) -> Result<Bytes> {
        if (self.predicate)(ctx) {
            self.inner.intercept(bytes, ctx).await
        } else {
            Ok(bytes)
        }
    }
}

/// Appends an HMAC-style signature produced by `sign`. Pairing with a
/// `VerifyInterceptor` on the peer validates message integrity.
pub struct SignatureInterceptor {
    pub sign: Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>,
}

#[async_trait]
impl Interceptor for SignatureInterceptor {
    fn name(&self) -> &str {
        "signature"
    }

    async fn intercept(&self, bytes: Bytes, _ctx: &mut MiddlewareContext) -> Result<Bytes> {
        let signature = (self.sign)(&bytes);
        let mut out = Vec::with_capacity(bytes.len() + signature.len() + 1);
        out.push(signature.len() as u8);
        out.extend_from_slice(&signature);
        out.extend_from_slice(&bytes);
        Ok(Bytes::from(out))
    }
}

/// Verifies and strips a signature appended by `SignatureInterceptor`.
pub struct VerifyInterceptor {
    pub verify: Arc<dyn Fn(&[u8], &[u8]) -> bool + Send + Sync>,
}

#[async_trait]
impl Interceptor for VerifyInterceptor {
    fn name(&self) -> &str {
        "verify"
    }

    async fn intercept(&self, bytes: Bytes, _ctx: &mut MiddlewareContext) -> Result<Bytes> {
        if bytes.is_empty() {
            return Err(NexusError::InvalidMessageFormat("empty signed message".into()));
        }
        let sig_len = bytes[0] as usize;
        if bytes.len() < 1 + sig_len {
            return Err(NexusError::InvalidMessageFormat("truncated signature".into()));
        }
        let signature = &bytes[1..1 + sig_len];
        let payload = &bytes[1 + sig_len..];
        if !(self.verify)(payload, signature) {
            return Err(NexusError::AuthFailed("signature verification failed".into()));
        }
        Ok(Bytes::copy_from_slice(payload))
    }
}

/// Parses bytes with a caller-supplied function, purely for validation side
/// effects (errors propagate); returns the input unchanged on success.
pub struct ParseInterceptor {
    pub parse: Arc<dyn Fn(&[u8]) -> std::result::Result<(), String> + Send + Sync>,
}

#[async_trait]
impl Interceptor for ParseInterceptor {
    fn name(&self) -> &str {
        "parse"
    }

    async fn intercept(&self, bytes: Bytes, _ctx: &mut MiddlewareContext) -> Result<Bytes> {
        (self.parse)(&bytes).map_err(NexusError::InvalidMessageFormat)?;
        Ok(bytes)
    }
}

/// Runs an ordered list of interceptors as a single `Middleware` stage.
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
    priority: i32,
}

impl InterceptorChain {
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        Self { interceptors, priority: 0 }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

#[async_trait]
impl Middleware for InterceptorChain {
    fn name(&self) -> &str {
        "interceptor_chain"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn handle_outgoing(&self, mut bytes: Bytes, ctx: &mut MiddlewareContext) -> Result<Bytes> {
        for interceptor in &self.interceptors {
            bytes = interceptor.intercept(bytes, ctx).await?;
        }
        Ok(bytes)
    }

    async fn handle_incoming(&self, mut bytes: Bytes, ctx: &mut MiddlewareContext) -> Result<Bytes> {
        for interceptor in self.interceptors.iter().rev() {
            bytes = interceptor.intercept(bytes, ctx).await?;
        }
        Ok(bytes)
    }
}
