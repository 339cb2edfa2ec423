//! Adaptive byte-stream compression for NexusKit's middleware pipeline.
//!
//! Unlike an HTTP compression layer keyed on `Accept-Encoding`, this codec
//! works over the raw, already-framed bytes a connection middleware sees:
//! each compressed payload self-describes via a one-byte magic prefix and
//! algorithm tag, so a decoder never needs side-channel metadata.

mod algorithm;
mod codec;
mod config;
mod error;

pub use algorithm::{CompressionAlgorithm, MAGIC_PREFIX};
pub use codec::CompressionCodec;
pub use config::{CompressionConfig, CompressionConfigBuilder, CompressionStrategy};
pub use error::CompressionError;

pub type Result<T> = std::result::Result<T, CompressionError>;
