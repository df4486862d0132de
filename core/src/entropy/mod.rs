//! Entropy Estimators
//!
//! Three interchangeable strategies computing the same two scalars:
//!
//! - `entro_mean`: per-position entropy of the soft assignment over
//!   codewords, averaged over every position and sample
//! - `mean_entro`: entropy of the averaged assignment distribution; Block
//!   keeps one distribution per sample and averages their entropies
//!
//! They differ only in how much of the `(positions, codewords)` probability
//! matrix is alive at once:
//!
//! - [`VanillaEstimator`] - whole batch against the whole codebook
//! - [`ChunkedBatchEstimator`] - sequence chunks against the whole codebook
//! - [`BlockEstimator`] - sequence chunks against generated subbooks
//!
//! # Example
//!
//! ```rust,ignore
//! use lfq_core::entropy::{ChunkedBatchEstimator, EntropyEstimator, EntropyParams};
//!
//! let estimator = ChunkedBatchEstimator::new(&book_t, EntropyParams::new(0.005, 1e-10), 16);
//! let estimate = estimator.estimate(&x)?;
//! println!("{:?}", estimate.values()?);
//! ```

mod block;
mod chunked;
mod vanilla;

pub use block::BlockEstimator;
pub use chunked::ChunkedBatchEstimator;
pub use vanilla::VanillaEstimator;

use candle_core::{DType, Tensor, D};
use serde::{Deserialize, Serialize};

use crate::error::{LfqError, LfqResult};

/// Trait for entropy estimation strategies
pub trait EntropyEstimator {
    /// Estimate the entropy pair for a `(batch, seq, bits)` input
    fn estimate(&self, x: &Tensor) -> LfqResult<EntropyEstimate>;

    /// Name of the strategy
    fn name(&self) -> &'static str;
}

/// Softmax parameters shared by every strategy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntropyParams {
    pub temperature: f32,
    pub eps: f32,
}

impl EntropyParams {
    pub fn new(temperature: f32, eps: f32) -> Self {
        Self { temperature, eps }
    }
}

/// Result of one entropy estimation
#[derive(Debug, Clone)]
pub struct EntropyEstimate {
    /// Mean per-position entropy (scalar)
    pub entro_mean: Tensor,
    /// Entropy of the averaged distribution (scalar)
    pub mean_entro: Tensor,
    /// Final averaged assignment distribution, `(n,)` or one row per sample
    pub mean_probs: Tensor,
}

/// Entropy pair as host scalars
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EntropyValues {
    pub entro_mean: f32,
    pub mean_entro: f32,
}

impl EntropyEstimate {
    pub fn new(entro_mean: Tensor, mean_entro: Tensor, mean_probs: Tensor) -> Self {
        Self {
            entro_mean,
            mean_entro,
            mean_probs,
        }
    }

    /// Copy both scalars to the host
    pub fn values(&self) -> LfqResult<EntropyValues> {
        Ok(EntropyValues {
            entro_mean: scalar(&self.entro_mean)?,
            mean_entro: scalar(&self.mean_entro)?,
        })
    }

    /// Mass of each averaged distribution (one entry for a vector)
    pub fn row_masses(&self) -> LfqResult<Vec<f32>> {
        Ok(self
            .mean_probs
            .to_dtype(DType::F32)?
            .sum(D::Minus1)?
            .flatten_all()?
            .to_vec1::<f32>()?)
    }

    /// Mass of the row furthest from 1
    pub fn probability_mass(&self) -> LfqResult<f32> {
        let worst = self.row_masses()?.into_iter().fold(1.0f32, |worst, mass| {
            if mass.is_nan() || (mass - 1.0).abs() > (worst - 1.0).abs() {
                mass
            } else {
                worst
            }
        });
        Ok(worst)
    }

    /// Fail if any averaged distribution does not sum to ~1
    pub fn verify_probability_mass(&self, tolerance: f32) -> LfqResult<f32> {
        let mass = self.probability_mass()?;
        if !((mass - 1.0).abs() <= tolerance) {
            return Err(LfqError::ProbabilityMass { mass, tolerance });
        }
        Ok(mass)
    }
}

/// Soft assignment of one chunk
pub(crate) struct ChunkScores {
    /// `(batch, chunk, n)` assignment probabilities
    pub probs: Tensor,
    /// `(batch, chunk)` per-position entropy
    pub entropy: Tensor,
}

/// Score a `(batch, chunk, bits)` slice against a `(bits, n)` codeword matrix
pub(crate) fn score_chunk(
    x_chunk: &Tensor,
    book_t: &Tensor,
    temperature: f32,
    eps: f32,
) -> LfqResult<ChunkScores> {
    let (batch, chunk, bits) = x_chunk.dims3()?;
    let n = book_t.dim(1)?;

    let flat = x_chunk
        .to_dtype(DType::F32)?
        .contiguous()?
        .reshape((batch * chunk, bits))?;
    let logits = flat
        .matmul(book_t)?
        .affine(1.0 / temperature as f64, 0.0)?;

    let probs = candle_nn::ops::softmax(&logits, D::Minus1)?;
    let log_probs = candle_nn::ops::log_softmax(&logits.affine(1.0, eps as f64)?, D::Minus1)?;
    let entropy = (&probs * &log_probs)?.sum(D::Minus1)?.neg()?;

    Ok(ChunkScores {
        probs: probs.reshape((batch, chunk, n))?,
        entropy: entropy.reshape((batch, chunk))?,
    })
}

/// Entropy `-sum(p * ln(p + eps))` over the last dim, averaged over rows
///
/// A plain vector yields its own entropy.
pub(crate) fn distribution_entropy(probs: &Tensor, eps: f32) -> LfqResult<Tensor> {
    let log_probs = probs.affine(1.0, eps as f64)?.log()?;
    Ok((probs * log_probs)?.sum(D::Minus1)?.mean_all()?.neg()?)
}

/// Start offsets of the sequence chunks; the chunk size must divide `seq_len`
pub(crate) fn chunk_offsets(seq_len: usize, chunk_size: usize) -> LfqResult<Vec<usize>> {
    if chunk_size == 0 || seq_len % chunk_size != 0 {
        return Err(LfqError::ChunkSize { seq_len, chunk_size });
    }
    Ok((0..seq_len / chunk_size).map(|i| i * chunk_size).collect())
}

/// Codebook on the same device as the batch
pub(crate) fn book_on_device(book_t: &Tensor, x: &Tensor) -> LfqResult<Tensor> {
    if book_t.device().same_device(x.device()) {
        Ok(book_t.clone())
    } else {
        Ok(book_t.to_device(x.device())?)
    }
}

/// Read a single-element tensor as f32
pub(crate) fn scalar(t: &Tensor) -> LfqResult<f32> {
    Ok(t.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?[0])
}
