//! Wire codec: prefixes compressed payloads with [`MAGIC_PREFIX`] + an
//! algorithm tag byte so a peer can decode without side-channel metadata.

use crate::{CompressionAlgorithm, CompressionConfig, CompressionError, Result, MAGIC_PREFIX};

#[derive(Debug, Clone)]
pub struct CompressionCodec {
    config: CompressionConfig,
}

impl CompressionCodec {
    pub fn new(config: CompressionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    /// Encode `data`, prefixing it with the magic byte and algorithm tag if
    /// the configured strategy decides to compress it. Returns the input
    /// unchanged (no prefix) when compression is skipped or would not help.
    pub fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        if !self.config.should_compress(data.len()) {
            return Ok(data.to_vec());
        }
        let algorithm = self.config.resolve_algorithm(data.len());
        if algorithm == CompressionAlgorithm::None {
            return Ok(data.to_vec());
        }
        let compressed = algorithm.compress(data, self.config.effective_level())?;
        if compressed.len() + 2 >= data.len() {
            return Ok(data.to_vec());
        }
        if let Some(min_ratio) = self.config.min_ratio() {
            let ratio = compressed.len() as f64 / data.len() as f64;
            if ratio > min_ratio {
                return Ok(data.to_vec());
            }
        }
        let mut out = Vec::with_capacity(compressed.len() + 2);
        out.push(MAGIC_PREFIX);
        out.push(algorithm.tag());
        out.extend_from_slice(&compressed);
        Ok(out)
    }

    /// Decode `data`, transparently reversing [`Self::encode`]. Data without
    /// the magic prefix is returned unchanged.
    pub fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < 2 || data[0] != MAGIC_PREFIX {
            return Ok(data.to_vec());
        }
        let algorithm = CompressionAlgorithm::from_tag(data[1])
            .ok_or_else(|| CompressionError::UnsupportedAlgorithm(format!("tag {}", data[1])))?;
        algorithm.decompress(&data[2..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CompressionStrategy;

    #[test]
    fn test_roundtrip_above_threshold() {
        let codec = CompressionCodec::new(
            CompressionConfig::builder()
                .strategy(CompressionStrategy::Always)
                .build(),
        );
        let data = b"repeat me ".repeat(200);
        let encoded = codec.encode(&data).unwrap();
        assert_eq!(encoded[0], crate::MAGIC_PREFIX);
        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_min_ratio_rejects_when_not_met() {
        let codec = CompressionCodec::new(
            CompressionConfig::builder()
                .strategy(CompressionStrategy::Threshold { min_size: 10, min_ratio: 0.0 })
                .build(),
        );
        let data = b"repeat me ".repeat(200);
        let encoded = codec.encode(&data).unwrap();
        assert_eq!(encoded, data);
    }

    #[test]
    fn test_min_ratio_accepts_when_met() {
        let codec = CompressionCodec::new(
            CompressionConfig::builder()
                .strategy(CompressionStrategy::Threshold { min_size: 10, min_ratio: 1.0 })
                .build(),
        );
        let data = b"repeat me ".repeat(200);
        let encoded = codec.encode(&data).unwrap();
        assert_eq!(encoded[0], crate::MAGIC_PREFIX);
    }

    #[test]
    fn test_passthrough_below_threshold() {
        let codec = CompressionCodec::new(CompressionConfig::default());
        let data = b"small";
        let encoded = codec.encode(data).unwrap();
        assert_eq!(encoded, data);
        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_never_strategy_passthrough() {
        let codec = CompressionCodec::new(
            CompressionConfig::builder()
                .strategy(CompressionStrategy::Never)
                .build(),
        );
        let data = b"x".repeat(10_000);
        let encoded = codec.encode(&data).unwrap();
        assert_eq!(encoded, data);
    }
}
