//! Compression middleware: adaptive algorithm selection wrapping
//! `nexuskit_compression`'s codec with the self-describing magic-prefix
//! detection so non-prefixed bytes pass through untouched.

use async_trait::async_trait;
use bytes::Bytes;
use nexuskit_compression::{CompressionCodec, CompressionConfig};

use crate::error::Result;
use crate::middleware::{Middleware, MiddlewareContext};

pub struct CompressionMiddleware {
    codec: CompressionCodec,
}

impl CompressionMiddleware {
    pub fn new(config: CompressionConfig) -> Self {
        Self {
            codec: CompressionCodec::new(config),
        }
    }
}

#[async_trait]
impl Middleware for CompressionMiddleware {
    fn name(&self) -> &str {
        "compression"
    }

    fn priority(&self) -> i32 {
        -100 // runs first outgoing, last incoming: closest to the wire
    }

    async fn handle_outgoing(&self, bytes: Bytes, _ctx: &mut MiddlewareContext) -> Result<Bytes> {
        let encoded = self
            .codec
            .encode(&bytes)
            .map_err(|e| crate::error::NexusError::EncodingFailed(e.to_string()))?;
        Ok(Bytes::from(encoded))
    }

    async fn handle_incoming(&self, bytes: Bytes, _ctx: &mut MiddlewareContext) -> Result<Bytes> {
        let decoded = self
            .codec
            .decode(&bytes)
            .map_err(|e| crate::error::NexusError::DecodingFailed(e.to_string()))?;
        Ok(Bytes::from(decoded))
    }
}
