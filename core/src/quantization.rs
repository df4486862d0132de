//! Sign Quantization
//!
//! Each coordinate is thresholded independently: `> 0` maps to `+1`,
//! everything else (zero and NaN included) to `-1`.
//!
//! # Usage
//! ```rust,ignore
//! use lfq_core::quantization::{hard_quantize, straight_through, commit_loss};
//!
//! let q = hard_quantize(&x)?;            // non-differentiable code
//! let q_st = straight_through(&x, &q)?;  // value of q, gradient of x
//! let commit = commit_loss(&x, &q)?;     // mean((x - q)^2)
//! ```

use candle_core::{DType, Tensor};

use crate::codebook::codeword;
use crate::constants::MAX_INDEX_BITS;
use crate::error::{LfqError, LfqResult};

/// Hard ±1 code, same shape, dtype and device as `x`
pub fn hard_quantize(x: &Tensor) -> LfqResult<Tensor> {
    let positive = x.gt(&x.zeros_like()?)?;
    Ok(positive.to_dtype(x.dtype())?.affine(2.0, -1.0)?)
}

/// Straight-through estimator: `x + detach(q - x)`
///
/// Numerically equal to `q`; under `backward()` it propagates gradients
/// to `x` as if it were the identity.
pub fn straight_through(x: &Tensor, q: &Tensor) -> LfqResult<Tensor> {
    let residual = q.sub(x)?.detach();
    Ok(x.add(&residual)?)
}

/// Commitment loss: mean squared error between `x` and the detached code
pub fn commit_loss(x: &Tensor, q: &Tensor) -> LfqResult<Tensor> {
    let target = q.detach();
    Ok(x.sub(&target)?.sqr()?.mean_all()?)
}

/// Decode ±1 codes `(batch, seq, bits)` into `i64` indices `(batch, seq)`
///
/// Bit `j` (MSB first) is set when the coordinate is positive.
pub fn decode_indices(q: &Tensor) -> LfqResult<Tensor> {
    let (batch, seq, bits) = q.dims3()?;
    if bits as u32 > MAX_INDEX_BITS {
        return Err(LfqError::IndexOverflow {
            bits: bits as u32,
            max: MAX_INDEX_BITS,
        });
    }

    let rows = q
        .to_dtype(DType::F32)?
        .reshape((batch * seq, bits))?
        .to_vec2::<f32>()?;
    let indices: Vec<i64> = rows.iter().map(|row| code_to_index(row) as i64).collect();

    Ok(Tensor::from_vec(indices, (batch, seq), q.device())?)
}

/// Index of a single ±1 code, MSB first
pub fn code_to_index(code: &[f32]) -> u64 {
    code.iter()
        .fold(0u64, |acc, &v| (acc << 1) | u64::from(v > 0.0))
}

/// Re-expand an index into its ±1 code
pub fn index_to_code(index: u64, bits: u32) -> Vec<f32> {
    codeword(index, bits)
}
