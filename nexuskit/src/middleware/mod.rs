//! Ordered outgoing/incoming processors. The pipeline composes outgoing in
//! forward order, incoming in reverse; any stage may short-circuit with a
//! `MiddlewareError`.

pub mod cache;
pub mod compression;
pub mod interceptor;
pub mod ratelimit;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::endpoint::Endpoint;
use crate::error::{NexusError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// Per-message context threaded through the pipeline: connection identity,
/// direction, a typed metadata map, and a running byte count. Scoped to a
/// single message; middlewares must not retain data beyond it.
#[derive(Debug, Clone)]
pub struct MiddlewareContext {
    pub connection_id: String,
    pub endpoint: Endpoint,
    pub direction: Direction,
    pub metadata: HashMap<String, String>,
    pub bytes_so_far: usize,
}

impl MiddlewareContext {
    pub fn new(connection_id: impl Into<String>, endpoint: Endpoint, direction: Direction) -> Self {
        Self {
            connection_id: connection_id.into(),
            endpoint,
            direction,
            metadata: HashMap::new(),
            bytes_so_far: 0,
        }
    }
}

/// A pipeline stage. Both hooks default to identity so a middleware only
/// needs to implement the direction(s) it actually transforms. Async because
/// the cache stage awaits a store lookup; the connection runtime only ever
/// re-enters a chain from its owning task, so this never races.
#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    async fn handle_outgoing(&self, bytes: Bytes, _ctx: &mut MiddlewareContext) -> Result<Bytes> {
        Ok(bytes)
    }

    async fn handle_incoming(&self, bytes: Bytes, _ctx: &mut MiddlewareContext) -> Result<Bytes> {
        Ok(bytes)
    }

    /// Priority, ascending; the chain runs stages in priority order for the
    /// outgoing direction and in reverse for incoming.
    fn priority(&self) -> i32 {
        0
    }
}

#[derive(Default, Clone)]
pub struct MiddlewareChain {
    stages: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new(mut stages: Vec<Arc<dyn Middleware>>) -> Self {
        stages.sort_by_key(|m| m.priority());
        Self { stages }
    }

    pub fn push(&mut self, stage: Arc<dyn Middleware>) {
        self.stages.push(stage);
        self.stages.sort_by_key(|m| m.priority());
    }

    pub async fn run_outgoing(&self, mut bytes: Bytes, ctx: &mut MiddlewareContext) -> Result<Bytes> {
        for stage in &self.stages {
            bytes = stage.handle_outgoing(bytes, ctx).await.map_err(|e| wrap(stage.name(), e))?;
        }
        Ok(bytes)
    }

    pub async fn run_incoming(&self, mut bytes: Bytes, ctx: &mut MiddlewareContext) -> Result<Bytes> {
        for stage in self.stages.iter().rev() {
            bytes = stage.handle_incoming(bytes, ctx).await.map_err(|e| wrap(stage.name(), e))?;
        }
        Ok(bytes)
    }
}

fn wrap(name: &str, err: NexusError) -> NexusError {
    match err {
        NexusError::MiddlewareError { .. } => err,
        other => NexusError::MiddlewareError {
            name: name.to_string(),
            underlying: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;
    #[async_trait]
    impl Middleware for Noop {
        fn name(&self) -> &str {
            "noop"
        }
    }

    struct Reject;
    #[async_trait]
    impl Middleware for Reject {
        fn name(&self) -> &str {
            "reject"
        }
        async fn handle_outgoing(&self, _bytes: Bytes, _ctx: &mut MiddlewareContext) -> Result<Bytes> {
            Err(NexusError::MiddlewareChainBroken)
        }
    }

    fn ctx() -> MiddlewareContext {
        MiddlewareContext::new("conn-1", Endpoint::tcp("h", 1), Direction::Outgoing)
    }

    #[tokio::test]
    async fn test_empty_chain_is_identity() {
        let chain = MiddlewareChain::default();
        let mut c = ctx();
        let out = chain.run_outgoing(Bytes::from_static(b"hello"), &mut c).await.unwrap();
        assert_eq!(&out[..], b"hello");
    }

    #[tokio::test]
    async fn test_noop_chain_roundtrip() {
        let chain = MiddlewareChain::new(vec![Arc::new(Noop)]);
        let mut c = ctx();
        let out = chain.run_outgoing(Bytes::from_static(b"hello"), &mut c).await.unwrap();
        let back = chain.run_incoming(out, &mut c).await.unwrap();
        assert_eq!(&back[..], b"hello");
    }

    #[tokio::test]
    async fn test_reject_short_circuits() {
        let chain = MiddlewareChain::new(vec![Arc::new(Reject)]);
        let mut c = ctx();
        let err = chain.run_outgoing(Bytes::from_static(b"x"), &mut c).await.unwrap_err();
        assert!(matches!(err, NexusError::MiddlewareError { .. }));
    }
}
