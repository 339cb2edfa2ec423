//! Byte-stream compression algorithm implementations.

use crate::{CompressionError, Result};
use std::io::Write;

/// Leading byte written before every compressed payload so a decoder can
/// tell a compressed frame body from a plain one without consulting
/// out-of-band metadata.
pub const MAGIC_PREFIX: u8 = 0xFF;

/// Supported compression algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionAlgorithm {
    /// Pick an algorithm based on payload size and available features.
    #[default]
    Auto,
    #[cfg(feature = "lz4")]
    Lz4,
    #[cfg(feature = "zlib")]
    Zlib,
    #[cfg(feature = "lzma")]
    Lzma,
    None,
}

impl CompressionAlgorithm {
    /// One-byte tag stored immediately after [`MAGIC_PREFIX`].
    pub fn tag(&self) -> u8 {
        match self {
            Self::Auto => 0,
            #[cfg(feature = "lz4")]
            Self::Lz4 => 1,
            #[cfg(feature = "zlib")]
            Self::Zlib => 2,
            #[cfg(feature = "lzma")]
            Self::Lzma => 3,
            Self::None => 255,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            #[cfg(feature = "lz4")]
            1 => Some(Self::Lz4),
            #[cfg(feature = "zlib")]
            2 => Some(Self::Zlib),
            #[cfg(feature = "lzma")]
            3 => Some(Self::Lzma),
            255 => Some(Self::None),
            _ => None,
        }
    }

    pub fn is_available(&self) -> bool {
        match self {
            Self::Auto | Self::None => true,
            #[cfg(feature = "lz4")]
            Self::Lz4 => true,
            #[cfg(feature = "zlib")]
            Self::Zlib => true,
            #[cfg(feature = "lzma")]
            Self::Lzma => true,
            #[allow(unreachable_patterns)]
            _ => false,
        }
    }

    /// Auto-selection favors the fastest codec for small payloads and the
    /// best ratio once a body grows large enough to make the difference
    /// worth the extra CPU time.
    pub fn select_auto(payload_len: usize) -> Self {
        #[cfg(feature = "lzma")]
        if payload_len > 256 * 1024 {
            return Self::Lzma;
        }
        #[cfg(feature = "zlib")]
        if payload_len > 4 * 1024 {
            return Self::Zlib;
        }
        #[cfg(feature = "lz4")]
        {
            return Self::Lz4;
        }
        #[allow(unreachable_code)]
        Self::None
    }

    pub fn compress(&self, data: &[u8], level: u32) -> Result<Vec<u8>> {
        match self {
            #[cfg(feature = "lz4")]
            Self::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
            #[cfg(feature = "zlib")]
            Self::Zlib => compress_zlib(data, level),
            #[cfg(feature = "lzma")]
            Self::Lzma => compress_lzma(data, level),
            Self::None | Self::Auto => Ok(data.to_vec()),
            #[allow(unreachable_patterns)]
            _ => Err(CompressionError::UnsupportedAlgorithm(format!("{:?}", self))),
        }
    }

    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            #[cfg(feature = "lz4")]
            Self::Lz4 => lz4_flex::decompress_size_prepended(data)
                .map_err(|e| CompressionError::DecompressionFailed(e.to_string())),
            #[cfg(feature = "zlib")]
            Self::Zlib => decompress_zlib(data),
            #[cfg(feature = "lzma")]
            Self::Lzma => decompress_lzma(data),
            Self::None | Self::Auto => Ok(data.to_vec()),
            #[allow(unreachable_patterns)]
            _ => Err(CompressionError::UnsupportedAlgorithm(format!("{:?}", self))),
        }
    }

    pub fn default_level(&self) -> u32 {
        match self {
            #[cfg(feature = "zlib")]
            Self::Zlib => 6,
            #[cfg(feature = "lzma")]
            Self::Lzma => 6,
            _ => 0,
        }
    }
}

impl std::fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            #[cfg(feature = "lz4")]
            Self::Lz4 => write!(f, "lz4"),
            #[cfg(feature = "zlib")]
            Self::Zlib => write!(f, "zlib"),
            #[cfg(feature = "lzma")]
            Self::Lzma => write!(f, "lzma"),
            Self::None => write!(f, "none"),
        }
    }
}

#[cfg(feature = "zlib")]
fn compress_zlib(data: &[u8], level: u32) -> Result<Vec<u8>> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
    encoder
        .write_all(data)
        .map_err(|e| CompressionError::CompressionFailed(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| CompressionError::CompressionFailed(e.to_string()))
}

#[cfg(feature = "zlib")]
fn decompress_zlib(data: &[u8]) -> Result<Vec<u8>> {
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| CompressionError::DecompressionFailed(e.to_string()))?;
    Ok(out)
}

#[cfg(feature = "lzma")]
fn compress_lzma(data: &[u8], level: u32) -> Result<Vec<u8>> {
    use std::io::Read;
    use xz2::read::XzEncoder;

    let mut encoder = XzEncoder::new(data, level);
    let mut out = Vec::new();
    encoder
        .read_to_end(&mut out)
        .map_err(|e| CompressionError::CompressionFailed(e.to_string()))?;
    Ok(out)
}

#[cfg(feature = "lzma")]
fn decompress_lzma(data: &[u8]) -> Result<Vec<u8>> {
    use std::io::Read;
    use xz2::read::XzDecoder;

    let mut decoder = XzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| CompressionError::DecompressionFailed(e.to_string()))?;
    Ok(out)
}
