use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("compression failed: {0}")]
    CompressionFailed(String),

    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("invalid compression level: {0} (must be between {1} and {2})")]
    InvalidLevel(u32, u32, u32),

    #[error("unsupported compression algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}
