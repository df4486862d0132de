//! Lookup-Free Quantizer
//!
//! Wires mode selection, sign quantization and entropy estimation together
//! for one call. The mode and any materialized codebook are created on the
//! first call, on that call's device, and reused for the lifetime of the
//! quantizer.

use std::sync::{Arc, Mutex};

use candle_core::{DType, Device, Tensor};
use serde::{Deserialize, Serialize};

use crate::codebook::{BitCodebook, CodebookProvider};
use crate::config::LfqConfig;
use crate::constants::PROBABILITY_MASS_TOLERANCE;
use crate::entropy::{scalar, EntropyEstimate};
use crate::error::{LfqError, LfqResult};
use crate::mode::{LfqMode, ModeState};
use crate::quantization::{commit_loss, decode_indices, hard_quantize, straight_through};

/// Six-slot result of [`Lfq::run`]
#[derive(Debug, Clone)]
pub struct LfqOutput {
    /// ±1 code; straight-through in training, hard otherwise
    pub quantized: Tensor,
    /// Mean per-position assignment entropy
    pub entro_mean: Tensor,
    /// Entropy of the batch-averaged assignment
    pub mean_entro: Tensor,
    /// `alpha * entro_mean - alpha * mean_entro`
    pub entro_loss: Tensor,
    /// Codeword indices `(batch, seq)`, training calls only
    pub indices: Option<Tensor>,
    /// Mean squared error between input and code
    pub commit_loss: Tensor,
}

/// Loss scalars copied to the host
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LossSummary {
    pub entro_mean: f32,
    pub mean_entro: f32,
    pub entro_loss: f32,
    pub commit_loss: f32,
}

impl LfqOutput {
    /// Output of the inference fast path: hard code, exact zero losses
    fn inference(quantized: Tensor, device: &Device) -> LfqResult<Self> {
        let zero = Tensor::zeros((), DType::F32, device)?;
        Ok(Self {
            quantized,
            entro_mean: zero.clone(),
            mean_entro: zero.clone(),
            entro_loss: zero.clone(),
            indices: None,
            commit_loss: zero,
        })
    }

    /// Copy the four loss scalars to the host
    pub fn summary(&self) -> LfqResult<LossSummary> {
        Ok(LossSummary {
            entro_mean: scalar(&self.entro_mean)?,
            mean_entro: scalar(&self.mean_entro)?,
            entro_loss: scalar(&self.entro_loss)?,
            commit_loss: scalar(&self.commit_loss)?,
        })
    }

    /// `(quantized, entro_mean, mean_entro, entro_loss, indices, commit_loss)`
    pub fn into_tuple(self) -> (Tensor, Tensor, Tensor, Tensor, Option<Tensor>, Tensor) {
        (
            self.quantized,
            self.entro_mean,
            self.mean_entro,
            self.entro_loss,
            self.indices,
            self.commit_loss,
        )
    }
}

/// Lookup-free quantizer with entropy regularization
pub struct Lfq {
    config: LfqConfig,
    provider: Arc<dyn CodebookProvider>,
    state: Mutex<Option<Arc<ModeState>>>,
}

impl Lfq {
    /// Create a quantizer with the bit-expansion codebook
    pub fn new(config: LfqConfig) -> LfqResult<Self> {
        Self::with_provider(config, Arc::new(BitCodebook))
    }

    /// Create a quantizer with a custom codebook provider
    pub fn with_provider(
        config: LfqConfig,
        provider: Arc<dyn CodebookProvider>,
    ) -> LfqResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            provider,
            state: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &LfqConfig {
        &self.config
    }

    /// Selected mode, `None` until the first call
    pub fn mode(&self) -> Option<LfqMode> {
        self.state
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|state| state.mode()))
    }

    /// Initialize mode state on `device` once; later calls reuse it
    pub fn init_state(&self, device: &Device) -> LfqResult<Arc<ModeState>> {
        let mut guard = self.state.lock().map_err(|_| LfqError::Poisoned)?;
        if let Some(state) = guard.as_ref() {
            return Ok(Arc::clone(state));
        }
        let state = Arc::new(ModeState::init(&self.config, self.provider.as_ref(), device)?);
        *guard = Some(Arc::clone(&state));
        Ok(state)
    }

    /// Run the mode's entropy estimator on `x`
    ///
    /// With `debug` set, the averaged distribution must sum to 1 within
    /// tolerance or the call fails.
    pub fn estimate_entropy(&self, x: &Tensor) -> LfqResult<EntropyEstimate> {
        self.check_shape(x)?;
        let state = self.init_state(x.device())?;
        let estimator = state.estimator(&self.config, self.provider.as_ref());
        let estimate = estimator.estimate(x)?;

        if self.config.debug {
            let mass = estimate.verify_probability_mass(PROBABILITY_MASS_TOLERANCE)?;
            tracing::debug!(estimator = estimator.name(), mass, "probability mass");
        }
        Ok(estimate)
    }

    /// Quantize a `(batch, seq, bits)` batch
    ///
    /// Outside training the entropy estimate is skipped: losses are exact
    /// zeros and no indices are returned even if requested.
    pub fn run(&self, x: &Tensor, return_indices: bool, training: bool) -> LfqResult<LfqOutput> {
        self.check_shape(x)?;
        let device = x.device();
        self.init_state(device)?;

        let q = hard_quantize(x)?;
        if !training {
            return LfqOutput::inference(q, device);
        }

        let estimate = self.estimate_entropy(x)?;
        let alpha = self.config.alpha as f64;
        let entro_loss = estimate
            .entro_mean
            .affine(alpha, 0.0)?
            .sub(&estimate.mean_entro.affine(alpha, 0.0)?)?;

        let quantized = straight_through(x, &q)?;
        let commit = commit_loss(x, &q)?;

        let indices = if return_indices {
            Some(decode_indices(&q)?)
        } else {
            None
        };

        let output = LfqOutput {
            quantized,
            entro_mean: estimate.entro_mean,
            mean_entro: estimate.mean_entro,
            entro_loss,
            indices,
            commit_loss: commit,
        };

        if self.config.debug {
            let summary = output.summary()?;
            tracing::debug!(
                bits = self.config.bits,
                entro_mean = summary.entro_mean,
                mean_entro = summary.mean_entro,
                entro_loss = summary.entro_loss,
                commit_loss = summary.commit_loss,
                "lfq step"
            );
        }

        Ok(output)
    }

    fn check_shape(&self, x: &Tensor) -> LfqResult<()> {
        let dims = x.dims();
        if dims.len() != 3 || dims[2] != self.config.bits as usize {
            return Err(LfqError::Shape {
                expected_bits: self.config.bits,
                got: dims.to_vec(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for Lfq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lfq")
            .field("config", &self.config)
            .field("provider", &self.provider.name())
            .field("mode", &self.mode())
            .finish()
    }
}
