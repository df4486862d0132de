//! Chunked-Batch strategy
//!
//! Same math as Vanilla, computed over disjoint sequence chunks so only a
//! `(batch, chunk, k)` probability block is alive at a time.

use candle_core::{DType, Tensor};

use super::{
    chunk_offsets, distribution_entropy, score_chunk, EntropyEstimate, EntropyEstimator,
    EntropyParams,
};
use crate::error::LfqResult;

/// Scores sequence chunks against the fully materialized codebook
pub struct ChunkedBatchEstimator<'a> {
    book_t: &'a Tensor,
    params: EntropyParams,
    chunk_size: usize,
}

impl<'a> ChunkedBatchEstimator<'a> {
    pub fn new(book_t: &'a Tensor, params: EntropyParams, chunk_size: usize) -> Self {
        Self {
            book_t,
            params,
            chunk_size,
        }
    }
}

impl EntropyEstimator for ChunkedBatchEstimator<'_> {
    fn estimate(&self, x: &Tensor) -> LfqResult<EntropyEstimate> {
        let (batch, seq, _) = x.dims3()?;
        let offsets = chunk_offsets(seq, self.chunk_size)?;
        let book_t = super::book_on_device(self.book_t, x)?;
        let k = book_t.dim(1)?;
        let device = x.device();

        let mut entro_acc = Tensor::zeros(batch, DType::F32, device)?;
        let mut probs_acc = Tensor::zeros(k, DType::F32, device)?;

        for &offset in &offsets {
            let x_chunk = x.narrow(1, offset, self.chunk_size)?;
            let scores = score_chunk(&x_chunk, &book_t, self.params.temperature, self.params.eps)?;

            // Per-sample entropy normalized by the full sequence length
            let chunk_entropy = scores.entropy.sum(1)?.affine(1.0 / seq as f64, 0.0)?;
            entro_acc = (entro_acc + chunk_entropy)?;

            let chunk_mean = scores
                .probs
                .reshape((batch * self.chunk_size, k))?
                .mean(0)?;
            probs_acc = (probs_acc + chunk_mean)?;
        }

        let mean_probs = probs_acc.affine(1.0 / offsets.len() as f64, 0.0)?;
        let mean_entro = distribution_entropy(&mean_probs, self.params.eps)?;
        let entro_mean = entro_acc.mean_all()?;

        Ok(EntropyEstimate::new(entro_mean, mean_entro, mean_probs))
    }

    fn name(&self) -> &'static str {
        "chunked-batch"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codebook::{direct_entropy, full_codebook};
    use crate::error::LfqError;
    use crate::synthetic::uniform_batch;
    use candle_core::Device;

    #[test]
    fn test_chunked_matches_direct() {
        let book = full_codebook(4, &Device::Cpu).unwrap();
        let x = uniform_batch(2, 32, 4, 42, &Device::Cpu).unwrap();
        let params = EntropyParams::new(0.05, 1e-10);

        let direct = direct_entropy(&x, &book, params.temperature, params.eps)
            .unwrap()
            .values()
            .unwrap();
        let chunked = ChunkedBatchEstimator::new(&book, params, 16)
            .estimate(&x)
            .unwrap()
            .values()
            .unwrap();

        assert!((direct.entro_mean - chunked.entro_mean).abs() < 1e-3);
        assert!((direct.mean_entro - chunked.mean_entro).abs() < 1e-3);
    }

    #[test]
    fn test_chunked_rejects_indivisible_sequence() {
        let book = full_codebook(3, &Device::Cpu).unwrap();
        let x = uniform_batch(1, 10, 3, 0, &Device::Cpu).unwrap();

        let result =
            ChunkedBatchEstimator::new(&book, EntropyParams::new(1.0, 1e-10), 4).estimate(&x);
        assert!(matches!(result, Err(LfqError::ChunkSize { seq_len: 10, chunk_size: 4 })));
    }

    #[test]
    fn test_chunked_probability_mass() {
        let book = full_codebook(5, &Device::Cpu).unwrap();
        let x = uniform_batch(3, 12, 5, 9, &Device::Cpu).unwrap();

        let estimate = ChunkedBatchEstimator::new(&book, EntropyParams::new(0.1, 1e-10), 4)
            .estimate(&x)
            .unwrap();
        assert!(estimate.verify_probability_mass(1e-3).is_ok());
    }
}
