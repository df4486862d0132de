//! Quantizer Configuration
//!
//! Fixed at construction. Defaults follow the reference trainer:
//! 26 bits, temperature 0.005, chunks of 16 positions, and mode
//! thresholds (19, 26).

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{LfqError, LfqResult};

/// Bit-width cutoffs selecting the entropy strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeThresholds {
    /// `bits < vanilla_below` selects Vanilla
    pub vanilla_below: u32,
    /// `bits < chunked_below` selects Chunked-Batch, otherwise Block
    pub chunked_below: u32,
}

impl Default for ModeThresholds {
    fn default() -> Self {
        Self {
            vanilla_below: DEFAULT_VANILLA_BELOW,
            chunked_below: DEFAULT_CHUNKED_BELOW,
        }
    }
}

impl ModeThresholds {
    pub fn new(vanilla_below: u32, chunked_below: u32) -> Self {
        Self { vanilla_below, chunked_below }
    }
}

/// Configuration for [`crate::Lfq`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LfqConfig {
    /// Bits per codeword; the codebook holds 2^bits entries
    pub bits: u32,
    /// Weight of the entropy regularization term
    pub alpha: f32,
    /// Reserved weight, accepted but not used by the loss
    pub beta: f32,
    /// Divides logits before softmax (lower = sharper)
    pub temperature: f32,
    /// Additive floor before logarithms
    pub eps: f32,
    /// Sequence chunk length for Chunked-Batch and Block modes
    pub chunk_size: usize,
    /// Mode selection cutoffs
    pub thresholds: ModeThresholds,
    /// Probability-mass check and per-call diagnostics
    pub debug: bool,
}

impl Default for LfqConfig {
    fn default() -> Self {
        Self {
            bits: DEFAULT_BITS,
            alpha: DEFAULT_ALPHA,
            beta: DEFAULT_BETA,
            temperature: DEFAULT_TEMPERATURE,
            eps: DEFAULT_EPS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            thresholds: ModeThresholds::default(),
            debug: false,
        }
    }
}

impl LfqConfig {
    /// Default configuration for a given bit-width
    pub fn with_bits(bits: u32) -> Self {
        Self {
            bits,
            ..Default::default()
        }
    }

    /// Set entropy weight
    pub fn alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    /// Set reserved weight
    pub fn beta(mut self, beta: f32) -> Self {
        self.beta = beta;
        self
    }

    /// Set softmax temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set logarithm floor
    pub fn eps(mut self, eps: f32) -> Self {
        self.eps = eps;
        self
    }

    /// Set sequence chunk length
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set mode thresholds
    pub fn thresholds(mut self, vanilla_below: u32, chunked_below: u32) -> Self {
        self.thresholds = ModeThresholds::new(vanilla_below, chunked_below);
        self
    }

    /// Enable debug checks
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Codebook size 2^bits
    pub fn codebook_size(&self) -> u64 {
        codebook_size(self.bits)
    }

    /// Reject configurations the engine cannot run
    pub fn validate(&self) -> LfqResult<()> {
        if self.bits == 0 || self.bits > MAX_BITS {
            return Err(LfqError::InvalidConfig(format!(
                "bits must be in 1..={}, got {}",
                MAX_BITS, self.bits
            )));
        }
        if !(self.temperature > 0.0) {
            return Err(LfqError::InvalidConfig(format!(
                "temperature must be positive, got {}",
                self.temperature
            )));
        }
        if !(self.eps >= 0.0) {
            return Err(LfqError::InvalidConfig(format!(
                "eps must be non-negative, got {}",
                self.eps
            )));
        }
        if self.chunk_size == 0 {
            return Err(LfqError::InvalidConfig("chunk_size must be positive".to_string()));
        }
        if self.thresholds.vanilla_below > self.thresholds.chunked_below {
            return Err(LfqError::InvalidConfig(format!(
                "thresholds must be ordered, got ({}, {})",
                self.thresholds.vanilla_below, self.thresholds.chunked_below
            )));
        }
        Ok(())
    }
}
