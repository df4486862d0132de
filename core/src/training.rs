//! Training Wrapper
//!
//! Holds a quantizer together with a train/eval switch, so model code can
//! call `forward` without threading the flag through every layer.
//!
//! # Example
//!
//! ```rust,ignore
//! use lfq_core::{LfqConfig, TrainableLfq};
//!
//! let mut layer = TrainableLfq::new(LfqConfig::with_bits(12))?;
//! layer.train();
//! let out = layer.forward(&encoded, false)?;
//! let loss = (out.entro_loss + out.commit_loss)?;
//! ```

use candle_core::Tensor;

use crate::config::LfqConfig;
use crate::error::LfqResult;
use crate::lfq::{Lfq, LfqOutput};

/// Quantizer with a train/eval flag
#[derive(Debug)]
pub struct TrainableLfq {
    lfq: Lfq,
    training: bool,
}

impl TrainableLfq {
    /// Create in training mode
    pub fn new(config: LfqConfig) -> LfqResult<Self> {
        Ok(Self::from_lfq(Lfq::new(config)?))
    }

    /// Wrap an existing quantizer, in training mode
    pub fn from_lfq(lfq: Lfq) -> Self {
        Self { lfq, training: true }
    }

    /// Switch to training mode (losses computed)
    pub fn train(&mut self) {
        self.training = true;
    }

    /// Switch to inference mode (losses skipped)
    pub fn eval(&mut self) {
        self.training = false;
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    pub fn inner(&self) -> &Lfq {
        &self.lfq
    }

    /// Forward pass under the current mode
    pub fn forward(&self, x: &Tensor, return_indices: bool) -> LfqResult<LfqOutput> {
        self.lfq.run(x, return_indices, self.training)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::uniform_batch;
    use candle_core::Device;

    #[test]
    fn test_starts_in_training() {
        let layer = TrainableLfq::new(LfqConfig::with_bits(3)).unwrap();
        assert!(layer.is_training());
    }

    #[test]
    fn test_eval_skips_losses() {
        let mut layer = TrainableLfq::new(LfqConfig::with_bits(3).temperature(0.5)).unwrap();
        let x = uniform_batch(2, 16, 3, 4, &Device::Cpu).unwrap();

        let trained = layer.forward(&x, true).unwrap();
        assert!(trained.indices.is_some());
        assert!(trained.summary().unwrap().commit_loss > 0.0);

        layer.eval();
        let inferred = layer.forward(&x, true).unwrap();
        assert!(inferred.indices.is_none());
        assert_eq!(inferred.summary().unwrap().commit_loss, 0.0);
    }
}
