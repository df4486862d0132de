//! Synthetic input batches
//!
//! Deterministic, seeded `(batch, seq, bits)` tensors for benchmarks,
//! demos and tests.

use candle_core::{Device, Tensor};
use rand::prelude::*;
use rand_distr::{Distribution, Normal, Uniform};

use crate::error::{LfqError, LfqResult};

/// Uniform values in `[-1, 1)`
pub fn uniform_batch(
    batch: usize,
    seq: usize,
    bits: usize,
    seed: u64,
    device: &Device,
) -> LfqResult<Tensor> {
    let mut rng = StdRng::seed_from_u64(seed);
    let dist = Uniform::new(-1.0f32, 1.0);
    let data: Vec<f32> = (0..batch * seq * bits).map(|_| dist.sample(&mut rng)).collect();
    Ok(Tensor::from_vec(data, (batch, seq, bits), device)?)
}

/// Gaussian values with the given standard deviation
///
/// `std_dev` must be finite and non-negative.
pub fn normal_batch(
    batch: usize,
    seq: usize,
    bits: usize,
    std_dev: f32,
    seed: u64,
    device: &Device,
) -> LfqResult<Tensor> {
    if !(std_dev >= 0.0) || !std_dev.is_finite() {
        return Err(LfqError::InvalidConfig(format!(
            "std_dev must be finite and non-negative, got {}",
            std_dev
        )));
    }
    let dist = Normal::new(0.0f32, std_dev)
        .map_err(|e| LfqError::InvalidConfig(format!("invalid std_dev {}: {}", std_dev, e)))?;
    let mut rng = StdRng::seed_from_u64(seed);
    let data: Vec<f32> = (0..batch * seq * bits).map(|_| dist.sample(&mut rng)).collect();
    Ok(Tensor::from_vec(data, (batch, seq, bits), device)?)
}
