//! Length-prefixed binary frame and the streaming framer that assembles
//! frames out of arbitrarily-chunked byte deliveries.

use bytes::Bytes;

use crate::buffer::{codec, gzip, BufferManager};
use crate::error::{NexusError, Result};

pub const FRAME_TAG: u16 = 0x7A5A;
pub const HEADER_LEN: usize = 20;
pub const HEARTBEAT_FUNCTION_ID: u32 = 0xFFFF;

pub const FLAG_IDLE: u8 = 0b0000_0001;
pub const FLAG_COMPRESSED: u8 = 0b0010_0000;

#[derive(Debug, Clone)]
pub struct Frame {
    pub version: u16,
    pub type_flags: u8,
    pub response_flag: u8,
    pub request_id: u32,
    pub function_id: u32,
    pub response_code: u32,
    pub body: Bytes,
}

impl Frame {
    pub fn is_heartbeat(&self) -> bool {
        self.function_id == HEARTBEAT_FUNCTION_ID
    }

    pub fn is_response(&self) -> bool {
        self.response_flag == 1
    }

    pub fn is_compressed(&self) -> bool {
        self.type_flags & FLAG_COMPRESSED != 0
    }

    pub fn heartbeat(version: u16) -> Self {
        Self {
            version,
            type_flags: FLAG_IDLE,
            response_flag: 0,
            request_id: 0,
            function_id: HEARTBEAT_FUNCTION_ID,
            response_code: 0,
            body: Bytes::new(),
        }
    }

    /// Serialize to wire bytes, gzip-compressing the body and setting the
    /// compressed flag when requested.
    pub fn encode(&self, compress: bool) -> Result<Vec<u8>> {
        let (flags, body) = if compress && !self.body.is_empty() {
            let compressed = gzip::compress(&self.body)?;
            (self.type_flags | FLAG_COMPRESSED, compressed)
        } else {
            (self.type_flags, self.body.to_vec())
        };

        let total_length = (HEADER_LEN + body.len()) as u32;
        let mut out = Vec::with_capacity(4 + total_length as usize);
        codec::write_u32_be(total_length, &mut out);
        codec::write_u16_be(FRAME_TAG, &mut out);
        codec::write_u16_be(self.version, &mut out);
        out.push(flags);
        out.push(self.response_flag);
        codec::write_u32_be(self.request_id, &mut out);
        codec::write_u32_be(self.function_id, &mut out);
        codec::write_u32_be(self.response_code, &mut out);
        codec::write_u16_be(0, &mut out); // reserved
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Parse a complete `4 + total_length`-byte window (as produced by
    /// `Framer::poll`) into a `Frame`, decompressing the body if flagged.
    fn decode(window: &[u8]) -> Result<Self> {
        let header = &window[4..4 + HEADER_LEN];
        let tag = codec::read_u16_be(&header[0..2]);
        if tag != FRAME_TAG {
            return Err(NexusError::ProtocolError(format!("bad frame tag {tag:#06x}")));
        }
        let version = codec::read_u16_be(&header[2..4]);
        let type_flags = header[4];
        let response_flag = header[5];
        let request_id = codec::read_u32_be(&header[6..10]);
        let function_id = codec::read_u32_be(&header[10..14]);
        let response_code = codec::read_u32_be(&header[14..18]);

        let body_slice = &window[4 + HEADER_LEN..];
        let body = if type_flags & FLAG_COMPRESSED != 0 {
            Bytes::from(gzip::decompress(body_slice)?)
        } else {
            Bytes::copy_from_slice(body_slice)
        };

        Ok(Frame {
            version,
            type_flags,
            response_flag,
            request_id,
            function_id,
            response_code,
            body,
        })
    }
}

/// Streaming assembler: feed arbitrarily-sized chunks via `push`, drain
/// complete frames via `poll`. Insensitive to how bytes are chunked.
pub struct Framer {
    buffer: BufferManager,
    max_frame_size: usize,
}

impl Framer {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buffer: BufferManager::new(8 * 1024, max_frame_size.max(HEADER_LEN) * 4),
            max_frame_size,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) -> Result<()> {
        self.buffer.append(bytes)
    }

    /// Pull the next complete frame out of the buffer, if one has fully
    /// arrived. Call repeatedly to drain multiple frames from one chunk.
    pub fn poll(&mut self) -> Result<Option<Frame>> {
        let Some(len_bytes) = self.buffer.peek(4) else {
            return Ok(None);
        };
        let total_length = codec::read_u32_be(len_bytes) as usize;
        if total_length < HEADER_LEN {
            return Err(NexusError::InvalidMessageFormat(format!(
                "total_length {total_length} is smaller than the fixed header"
            )));
        }
        if total_length > self.max_frame_size {
            return Err(NexusError::InvalidMessageFormat(format!(
                "total_length {total_length} exceeds max_frame_size {}",
                self.max_frame_size
            )));
        }

        let window_len = 4 + total_length;
        let Some(window) = self.buffer.peek(window_len) else {
            return Ok(None);
        };
        let frame = Frame::decode(window)?;
        self.buffer.consume(window_len);
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> Frame {
        Frame {
            version: 1,
            type_flags: 0,
            response_flag: 0,
            request_id: 7,
            function_id: 1,
            response_code: 0,
            body: Bytes::from_static(b"hi"),
        }
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let frame = sample_frame();
        let encoded = frame.encode(false).unwrap();
        let mut framer = Framer::new(1024);
        framer.push(&encoded).unwrap();
        let decoded = framer.poll().unwrap().unwrap();
        assert_eq!(decoded.request_id, 7);
        assert_eq!(&decoded.body[..], b"hi");
        assert!(!decoded.is_compressed());
    }

    #[test]
    fn test_chunked_delivery_matches_single_chunk() {
        let frame = sample_frame();
        let encoded = frame.encode(false).unwrap();

        let mut framer_a = Framer::new(1024);
        framer_a.push(&encoded).unwrap();
        let a = framer_a.poll().unwrap().unwrap();

        let mut framer_b = Framer::new(1024);
        for byte in &encoded {
            framer_b.push(&[*byte]).unwrap();
        }
        let b = framer_b.poll().unwrap().unwrap();

        assert_eq!(a.request_id, b.request_id);
        assert_eq!(a.body, b.body);
    }

    #[test]
    fn test_rejects_short_total_length() {
        let mut out = Vec::new();
        codec::write_u32_be(4, &mut out); // smaller than HEADER_LEN
        out.extend_from_slice(&[0u8; 16]);
        let mut framer = Framer::new(1024);
        framer.push(&out).unwrap();
        assert!(framer.poll().is_err());
    }

    #[test]
    fn test_heartbeat_frame() {
        let hb = Frame::heartbeat(1);
        assert!(hb.is_heartbeat());
        assert_eq!(hb.type_flags & FLAG_IDLE, FLAG_IDLE);
    }

    #[test]
    fn test_compression_roundtrip() {
        let mut frame = sample_frame();
        frame.body = Bytes::from(vec![b'A'; 2048]);
        let encoded = frame.encode(true).unwrap();
        let mut framer = Framer::new(1024 * 1024);
        framer.push(&encoded).unwrap();
        let decoded = framer.poll().unwrap().unwrap();
        assert!(decoded.is_compressed());
        assert_eq!(decoded.body.len(), 2048);
    }

    #[test]
    fn test_bad_tag_rejected() {
        let mut out = Vec::new();
        let total_length = HEADER_LEN as u32;
        codec::write_u32_be(total_length, &mut out);
        codec::write_u16_be(0xDEAD, &mut out); // wrong tag
        out.extend_from_slice(&[0u8; HEADER_LEN - 2]);
        let mut framer = Framer::new(1024);
        framer.push(&out).unwrap();
        assert!(framer.poll().is_err());
    }
}
