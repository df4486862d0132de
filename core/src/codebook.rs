//! Codebook Provider
//!
//! Codeword `i` of a `d`-bit codebook is the MSB-first bit expansion of `i`
//! with zero bits mapped to -1. Codeword matrices are laid out transposed,
//! `(d, n)`, one column per index, so a `(N, d)` batch scores against them
//! with a single matmul.
//!
//! Nothing here caches: every call regenerates exactly the requested range,
//! which keeps Block mode free of any `2^d`-sized allocation.

use candle_core::{Device, Tensor};

use crate::constants::{codebook_size, MAX_BITS};
use crate::entropy::{self, EntropyEstimate};
use crate::error::{LfqError, LfqResult};

/// Source of codeword matrices and direct whole-codebook entropy
pub trait CodebookProvider: Send + Sync {
    /// Codeword matrix for indices `[start, end)`, shape `(bits, end - start)`
    fn generate_subbook(&self, bits: u32, start: u64, end: u64, device: &Device)
        -> LfqResult<Tensor>;

    /// Entropy pair of `x` scored against a fully materialized codebook
    fn direct_entropy(
        &self,
        x: &Tensor,
        book_t: &Tensor,
        temperature: f32,
        eps: f32,
    ) -> LfqResult<EntropyEstimate>;

    /// Name of the provider
    fn name(&self) -> &'static str;
}

/// Bit-expansion codebook, generated on demand
#[derive(Debug, Clone, Copy, Default)]
pub struct BitCodebook;

impl CodebookProvider for BitCodebook {
    fn generate_subbook(
        &self,
        bits: u32,
        start: u64,
        end: u64,
        device: &Device,
    ) -> LfqResult<Tensor> {
        generate_subbook(bits, start, end, device)
    }

    fn direct_entropy(
        &self,
        x: &Tensor,
        book_t: &Tensor,
        temperature: f32,
        eps: f32,
    ) -> LfqResult<EntropyEstimate> {
        direct_entropy(x, book_t, temperature, eps)
    }

    fn name(&self) -> &'static str {
        "bit-expansion"
    }
}

/// Bit expansion of a single index, MSB first, values in {-1, +1}
pub fn codeword(index: u64, bits: u32) -> Vec<f32> {
    (0..bits)
        .rev()
        .map(|shift| if (index >> shift) & 1 == 1 { 1.0 } else { -1.0 })
        .collect()
}

/// Generate the transposed codeword matrix for `[start, end)`
///
/// Column `j` holds `codeword(start + j, bits)`.
pub fn generate_subbook(bits: u32, start: u64, end: u64, device: &Device) -> LfqResult<Tensor> {
    if bits == 0 || bits > MAX_BITS {
        return Err(LfqError::InvalidConfig(format!(
            "bits must be in 1..={}, got {}",
            MAX_BITS, bits
        )));
    }
    let size = codebook_size(bits);
    if start >= end || end > size {
        return Err(LfqError::CodewordRange { start, end, size });
    }

    let too_large = || {
        LfqError::InvalidConfig(format!(
            "codeword matrix of {} x {} entries does not fit in memory",
            bits,
            end - start
        ))
    };
    let width = usize::try_from(end - start).map_err(|_| too_large())?;
    let len = width.checked_mul(bits as usize).ok_or_else(too_large)?;

    let mut data = Vec::new();
    data.try_reserve_exact(len).map_err(|_| too_large())?;
    data.resize(len, -1.0f32);
    for (row, shift) in (0..bits).rev().enumerate() {
        let offset = row * width;
        for col in 0..width {
            if ((start + col as u64) >> shift) & 1 == 1 {
                data[offset + col] = 1.0;
            }
        }
    }

    Ok(Tensor::from_vec(data, (bits as usize, width), device)?)
}

/// Materialize the whole `(bits, 2^bits)` codebook
pub fn full_codebook(bits: u32, device: &Device) -> LfqResult<Tensor> {
    generate_subbook(bits, 0, codebook_size(bits), device)
}

/// Direct entropy over the full codebook
///
/// Softmax over all `k` codewords for every position at once. Peak memory
/// is `O(batch * seq * k)`, so this is only used for small bit-widths.
pub fn direct_entropy(
    x: &Tensor,
    book_t: &Tensor,
    temperature: f32,
    eps: f32,
) -> LfqResult<EntropyEstimate> {
    let (batch, seq, _) = x.dims3()?;
    let k = book_t.dim(1)?;

    let scores = entropy::score_chunk(x, book_t, temperature, eps)?;
    let entro_mean = scores.entropy.mean_all()?;
    let mean_probs = scores.probs.reshape((batch * seq, k))?.mean(0)?;
    let mean_entro = entropy::distribution_entropy(&mean_probs, eps)?;

    Ok(EntropyEstimate::new(entro_mean, mean_entro, mean_probs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codeword_msb_first() {
        assert_eq!(codeword(0, 3), vec![-1.0, -1.0, -1.0]);
        assert_eq!(codeword(1, 3), vec![-1.0, -1.0, 1.0]);
        assert_eq!(codeword(4, 3), vec![1.0, -1.0, -1.0]);
        assert_eq!(codeword(7, 3), vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_full_codebook_columns() {
        let book = full_codebook(3, &Device::Cpu).unwrap();
        assert_eq!(book.dims(), &[3, 8]);

        let rows = book.to_vec2::<f32>().unwrap();
        for index in 0..8u64 {
            let column: Vec<f32> = rows.iter().map(|row| row[index as usize]).collect();
            assert_eq!(column, codeword(index, 3), "index={}", index);
        }
    }

    #[test]
    fn test_subbook_matches_full_codebook_slice() {
        let full = full_codebook(5, &Device::Cpu).unwrap();
        let sub = generate_subbook(5, 8, 24, &Device::Cpu).unwrap();
        let expected = full.narrow(1, 8, 16).unwrap();

        assert_eq!(sub.to_vec2::<f32>().unwrap(), expected.to_vec2::<f32>().unwrap());
    }

    #[test]
    fn test_subbook_high_start() {
        // Only the requested range is generated, even for wide codebooks
        let bits = 40;
        let start = (1u64 << 39) + 5;
        let sub = generate_subbook(bits, start, start + 4, &Device::Cpu).unwrap();
        assert_eq!(sub.dims(), &[40, 4]);

        let rows = sub.to_vec2::<f32>().unwrap();
        let first: Vec<f32> = rows.iter().map(|row| row[0]).collect();
        assert_eq!(first, codeword(start, bits));
    }

    #[test]
    fn test_subbook_rejects_bad_range() {
        assert!(generate_subbook(4, 4, 4, &Device::Cpu).is_err());
        assert!(generate_subbook(4, 0, 17, &Device::Cpu).is_err());
        assert!(generate_subbook(0, 0, 1, &Device::Cpu).is_err());
    }

    #[test]
    fn test_subbook_rejects_oversized_matrix() {
        let result = generate_subbook(63, 0, codebook_size(63), &Device::Cpu);
        assert!(matches!(result, Err(LfqError::InvalidConfig(_))));
    }

    #[test]
    fn test_direct_entropy_bounds() {
        let bits = 4;
        let book = full_codebook(bits, &Device::Cpu).unwrap();
        let x = crate::synthetic::uniform_batch(2, 8, bits as usize, 7, &Device::Cpu).unwrap();

        let estimate = direct_entropy(&x, &book, 0.5, 1e-10).unwrap();
        let summary = estimate.values().unwrap();
        let ln_k = (16f32).ln();

        assert!(summary.entro_mean >= 0.0);
        assert!(summary.mean_entro >= 0.0);
        assert!(summary.mean_entro <= ln_k + 1e-4);
        assert!((estimate.probability_mass().unwrap() - 1.0).abs() < 1e-4);
    }
}
