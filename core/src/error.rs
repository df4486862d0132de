//! Error types for the quantizer

use thiserror::Error;

/// Errors raised by the quantization and entropy engine
#[derive(Error, Debug)]
pub enum LfqError {
    #[error("Tensor backend error: {0}")]
    Backend(#[from] candle_core::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Shape mismatch: expected (batch, seq, {expected_bits}), got {got:?}")]
    Shape { expected_bits: u32, got: Vec<usize> },

    #[error("Sequence length {seq_len} is not divisible by chunk size {chunk_size}")]
    ChunkSize { seq_len: usize, chunk_size: usize },

    #[error("Cannot decode {bits}-bit codes into indices (max {max} bits)")]
    IndexOverflow { bits: u32, max: u32 },

    #[error("Codeword range [{start}, {end}) is outside [0, {size})")]
    CodewordRange { start: u64, end: u64, size: u64 },

    #[error("Mean probability mass {mass} deviates from 1 by more than {tolerance}")]
    ProbabilityMass { mass: f32, tolerance: f32 },

    #[error("Mode initialization guard poisoned")]
    Poisoned,
}

/// Result alias for quantizer operations
pub type LfqResult<T> = Result<T, LfqError>;
