//! Tuning Constants for LFQ
//!
//! Defaults used throughout the quantizer. The subbook cap and the debug
//! tolerance are empirical values carried over from the reference trainer.

/// Default bit-width (2^26 codewords)
pub const DEFAULT_BITS: u32 = 26;

/// Default entropy loss weight
pub const DEFAULT_ALPHA: f32 = 1.0;

/// Default reserved weight (accepted, not consumed by the loss)
pub const DEFAULT_BETA: f32 = 1.0;

/// Default softmax temperature for soft assignment
pub const DEFAULT_TEMPERATURE: f32 = 0.005;

/// Default additive floor before logarithms
pub const DEFAULT_EPS: f32 = 1e-10;

/// Default sequence chunk length for Chunked-Batch and Block modes
pub const DEFAULT_CHUNK_SIZE: usize = 16;

/// Bit-widths below this use the Vanilla estimator
pub const DEFAULT_VANILLA_BELOW: u32 = 19;

/// Bit-widths below this (and >= vanilla threshold) use Chunked-Batch
pub const DEFAULT_CHUNKED_BELOW: u32 = 26;

/// Subbooks never exceed 2^(SUBBOOK_CAP_BITS - 1) columns
pub const SUBBOOK_CAP_BITS: u32 = 21;

/// Largest bit-width whose codeword index fits the i64 accumulator
pub const MAX_INDEX_BITS: u32 = 63;

/// Largest supported bit-width (k = 2^d must fit in u64)
pub const MAX_BITS: u32 = 63;

/// Allowed deviation of the mean-probability mass from 1 in debug mode
pub const PROBABILITY_MASS_TOLERANCE: f32 = 0.1;

/// Codebook size for a bit-width
pub const fn codebook_size(bits: u32) -> u64 {
    1u64 << bits
}

/// Number of columns in one Block-mode subbook
pub const fn subbook_size(bits: u32) -> u64 {
    let capped = if bits < SUBBOOK_CAP_BITS { bits } else { SUBBOOK_CAP_BITS };
    1u64 << capped.saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codebook_size() {
        assert_eq!(codebook_size(4), 16);
        assert_eq!(codebook_size(20), 1 << 20);
    }

    #[test]
    fn test_subbook_size_caps_at_21_bits() {
        assert_eq!(subbook_size(20), 1 << 19);
        assert_eq!(subbook_size(21), 1 << 20);
        assert_eq!(subbook_size(26), 1 << 20);
    }

    #[test]
    fn test_subbook_divides_codebook() {
        for bits in 1..=40 {
            assert_eq!(codebook_size(bits) % subbook_size(bits), 0, "bits={}", bits);
        }
    }

    #[test]
    fn test_default_thresholds_ordered() {
        assert!(DEFAULT_VANILLA_BELOW <= DEFAULT_CHUNKED_BELOW);
        assert!(DEFAULT_CHUNKED_BELOW <= MAX_BITS);
    }
}
