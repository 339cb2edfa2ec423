//! Configuration for the compression codec.

use crate::CompressionAlgorithm;

/// When to apply compression to an outgoing payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompressionStrategy {
    /// Compress every payload regardless of size.
    Always,
    /// Never compress; codec becomes a pass-through.
    Never,
    /// Compress only payloads at or above `min_size` bytes, and only keep
    /// the result if `compressed_len / payload_len` is at or below
    /// `min_ratio`; otherwise the payload passes through uncompressed.
    Threshold { min_size: usize, min_ratio: f64 },
    /// Delegate the decision to [`CompressionAlgorithm::select_auto`] and a
    /// default 1024-byte threshold.
    Auto,
}

impl Default for CompressionStrategy {
    fn default() -> Self {
        Self::Auto
    }
}

#[derive(Debug, Clone)]
pub struct CompressionConfig {
    pub algorithm: CompressionAlgorithm,
    pub strategy: CompressionStrategy,
    pub level: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            algorithm: CompressionAlgorithm::Auto,
            strategy: CompressionStrategy::Auto,
            level: 0,
        }
    }
}

impl CompressionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> CompressionConfigBuilder {
        CompressionConfigBuilder::new()
    }

    pub fn effective_level(&self) -> u32 {
        if self.level == 0 {
            self.algorithm.default_level()
        } else {
            self.level
        }
    }

    /// Decide whether `payload_len` bytes should be compressed under this
    /// configuration's strategy. For [`CompressionStrategy::Threshold`] this
    /// only checks `min_size`; the ratio bound is enforced after compressing
    /// (see [`Self::min_ratio`]), since the ratio isn't known beforehand.
    pub fn should_compress(&self, payload_len: usize) -> bool {
        match self.strategy {
            CompressionStrategy::Always => true,
            CompressionStrategy::Never => false,
            CompressionStrategy::Threshold { min_size, .. } => payload_len >= min_size,
            CompressionStrategy::Auto => payload_len >= 1024,
        }
    }

    /// The maximum acceptable `compressed_len / payload_len` ratio under
    /// this configuration's strategy, if it imposes one.
    pub fn min_ratio(&self) -> Option<f64> {
        match self.strategy {
            CompressionStrategy::Threshold { min_ratio, .. } => Some(min_ratio),
            _ => None,
        }
    }

    /// Resolve [`CompressionAlgorithm::Auto`] to a concrete algorithm for
    /// this payload size; non-auto algorithms pass through unchanged.
    pub fn resolve_algorithm(&self, payload_len: usize) -> CompressionAlgorithm {
        match self.algorithm {
            CompressionAlgorithm::Auto => CompressionAlgorithm::select_auto(payload_len),
            other => other,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompressionConfigBuilder {
    config: CompressionConfig,
}

impl CompressionConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: CompressionConfig::default(),
        }
    }

    pub fn algorithm(mut self, algorithm: CompressionAlgorithm) -> Self {
        self.config.algorithm = algorithm;
        self
    }

    pub fn strategy(mut self, strategy: CompressionStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn level(mut self, level: u32) -> Self {
        self.config.level = level;
        self
    }

    pub fn build(self) -> CompressionConfig {
        self.config
    }
}
