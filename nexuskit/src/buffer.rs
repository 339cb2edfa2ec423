//! Accumulates inbound byte chunks and hands the framer the smallest API it
//! needs: append, peek, consume, clear, bounded by a maximum capacity.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{NexusError, Result};

/// A growable byte buffer bounded by `max_capacity`. Readers only ever see a
/// contiguous prefix; internal fragmentation from `consume` is hidden by
/// `BytesMut`'s own bookkeeping.
pub struct BufferManager {
    inner: BytesMut,
    max_capacity: usize,
}

impl BufferManager {
    pub fn new(initial_capacity: usize, max_capacity: usize) -> Self {
        Self {
            inner: BytesMut::with_capacity(initial_capacity),
            max_capacity,
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(8 * 1024, 16 * 1024 * 1024)
    }

    /// Append a chunk, failing if it would push the buffer past its cap.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        if self.inner.len() + bytes.len() > self.max_capacity {
            return Err(NexusError::BufferOverflow(self.max_capacity));
        }
        self.inner.extend_from_slice(bytes);
        Ok(())
    }

    pub fn available_bytes(&self) -> usize {
        self.inner.len()
    }

    /// Borrow-only view of the first `n` bytes; `None` if not enough data.
    pub fn peek(&self, n: usize) -> Option<&[u8]> {
        if self.inner.len() < n {
            None
        } else {
            Some(&self.inner[..n])
        }
    }

    /// Hand off an owned window of the first `n` bytes, advancing past them.
    pub fn consume(&mut self, n: usize) -> Bytes {
        let n = n.min(self.inner.len());
        self.inner.split_to(n).freeze()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Big-endian codec helpers used by the framer and protocol header.
pub mod codec {
    pub fn read_u16_be(bytes: &[u8]) -> u16 {
        u16::from_be_bytes([bytes[0], bytes[1]])
    }

    pub fn read_u32_be(bytes: &[u8]) -> u32 {
        u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    pub fn write_u16_be(value: u16, out: &mut Vec<u8>) {
        out.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32_be(value: u32, out: &mut Vec<u8>) {
        out.extend_from_slice(&value.to_be_bytes());
    }
}

/// Lowercase hex encoding, used for cert-pinning diagnostics and trace ids.
pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Gzip compress/decompress, used by the framer when `type_flags` bit 5 is set.
pub mod gzip {
    use std::io::{Read, Write};

    use flate2::read::GzDecoder;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    use crate::error::{NexusError, Result};

    pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(data)
            .map_err(|e| NexusError::EncodingFailed(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| NexusError::EncodingFailed(e.to_string()))
    }

    pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| NexusError::DecodingFailed(e.to_string()))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_consume() {
        let mut buf = BufferManager::new(16, 1024);
        buf.append(b"hello").unwrap();
        assert_eq!(buf.available_bytes(), 5);
        assert_eq!(buf.peek(5), Some(&b"hello"[..]));
        let taken = buf.consume(5);
        assert_eq!(&taken[..], b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_overflow_rejected() {
        let mut buf = BufferManager::new(4, 4);
        assert!(buf.append(b"12345").is_err());
    }

    #[test]
    fn test_partial_peek_returns_none() {
        let mut buf = BufferManager::new(16, 1024);
        buf.append(b"ab").unwrap();
        assert!(buf.peek(5).is_none());
    }

    #[test]
    fn test_codec_roundtrip() {
        let mut out = Vec::new();
        codec::write_u32_be(0x7A5A1234, &mut out);
        assert_eq!(codec::read_u32_be(&out), 0x7A5A1234);
    }

    #[test]
    fn test_hex_encoding() {
        assert_eq!(to_hex(&[0x7a, 0x5a]), "7a5a");
    }

    #[test]
    fn test_gzip_roundtrip() {
        let data = b"AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
        let compressed = gzip::compress(data).unwrap();
        let decompressed = gzip::decompress(&compressed).unwrap();
        assert_eq!(decompressed, data);
    }
}
