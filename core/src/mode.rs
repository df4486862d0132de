//! Mode Selection
//!
//! Picks the entropy strategy from the bit-width:
//!
//! | bit-width                        | mode          | codebook            |
//! |----------------------------------|---------------|---------------------|
//! | `bits < vanilla_below`           | Vanilla       | materialized once   |
//! | `vanilla_below <= bits < chunked_below` | Chunked-Batch | materialized once |
//! | `bits >= chunked_below`          | Block         | subbooks on demand  |
//!
//! Selection runs once per [`crate::Lfq`], on the first call, on that
//! call's device.

use std::ops::Range;

use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};

use crate::codebook::CodebookProvider;
use crate::config::{LfqConfig, ModeThresholds};
use crate::constants::{codebook_size, subbook_size};
use crate::entropy::{
    BlockEstimator, ChunkedBatchEstimator, EntropyEstimator, EntropyParams, VanillaEstimator,
};
use crate::error::LfqResult;

/// Entropy estimation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LfqMode {
    /// Whole batch against the whole codebook
    Vanilla,
    /// Sequence chunks against the whole codebook
    ChunkedBatch,
    /// Sequence chunks against generated subbooks
    Block,
}

impl LfqMode {
    /// Select the mode for a bit-width
    pub fn select(bits: u32, thresholds: ModeThresholds) -> Self {
        if bits < thresholds.vanilla_below {
            Self::Vanilla
        } else if bits < thresholds.chunked_below {
            Self::ChunkedBatch
        } else {
            Self::Block
        }
    }

    /// Whether this mode keeps the full codebook in memory
    pub fn materializes_codebook(&self) -> bool {
        !matches!(self, Self::Block)
    }
}

impl std::fmt::Display for LfqMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vanilla => write!(f, "vanilla"),
            Self::ChunkedBatch => write!(f, "chunked-batch"),
            Self::Block => write!(f, "block"),
        }
    }
}

impl std::str::FromStr for LfqMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vanilla" => Ok(Self::Vanilla),
            "chunked-batch" | "chunked" | "x-batch" | "batch" => Ok(Self::ChunkedBatch),
            "block" => Ok(Self::Block),
            _ => Err(format!("Unknown mode: {}. Valid: vanilla, chunked-batch, block", s)),
        }
    }
}

/// Partition of `[0, 2^bits)` into equal contiguous subbooks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubbookPlan {
    bits: u32,
    subbook_size: u64,
    num_subbooks: u64,
}

impl SubbookPlan {
    /// Plan for a bit-width; `subbook_size = 2^(min(21, bits) - 1)`
    pub fn new(bits: u32) -> Self {
        let size = subbook_size(bits);
        Self {
            bits,
            subbook_size: size,
            num_subbooks: codebook_size(bits) / size,
        }
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn subbook_size(&self) -> u64 {
        self.subbook_size
    }

    pub fn num_subbooks(&self) -> u64 {
        self.num_subbooks
    }

    /// Fresh producer over the subbook ranges, in index order
    pub fn ranges(&self) -> SubbookRanges {
        SubbookRanges {
            next: 0,
            count: self.num_subbooks,
            size: self.subbook_size,
        }
    }
}

/// Iterator over subbook index ranges
#[derive(Debug, Clone)]
pub struct SubbookRanges {
    next: u64,
    count: u64,
    size: u64,
}

impl Iterator for SubbookRanges {
    type Item = Range<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.count {
            return None;
        }
        let start = self.next * self.size;
        self.next += 1;
        Some(start..start + self.size)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.count - self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SubbookRanges {}

/// Lazily initialized per-configuration state
///
/// Each variant owns exactly what its strategy reads, so a dispatch can
/// never meet a mode without its codebook.
#[derive(Debug, Clone)]
pub enum ModeState {
    Vanilla { book_t: Tensor },
    ChunkedBatch { book_t: Tensor },
    Block { plan: SubbookPlan },
}

impl ModeState {
    /// Select the mode and materialize what it needs on `device`
    pub fn init(
        config: &LfqConfig,
        provider: &dyn CodebookProvider,
        device: &Device,
    ) -> LfqResult<Self> {
        let mode = LfqMode::select(config.bits, config.thresholds);
        let state = match mode {
            LfqMode::Vanilla => Self::Vanilla {
                book_t: provider.generate_subbook(config.bits, 0, config.codebook_size(), device)?,
            },
            LfqMode::ChunkedBatch => Self::ChunkedBatch {
                book_t: provider.generate_subbook(config.bits, 0, config.codebook_size(), device)?,
            },
            LfqMode::Block => Self::Block {
                plan: SubbookPlan::new(config.bits),
            },
        };

        match &state {
            Self::Block { plan } => tracing::info!(
                bits = config.bits,
                mode = %mode,
                subbook_size = plan.subbook_size(),
                num_subbooks = plan.num_subbooks(),
                "selected quantizer mode"
            ),
            _ => tracing::info!(
                bits = config.bits,
                mode = %mode,
                codebook_size = config.codebook_size(),
                "selected quantizer mode"
            ),
        }

        Ok(state)
    }

    pub fn mode(&self) -> LfqMode {
        match self {
            Self::Vanilla { .. } => LfqMode::Vanilla,
            Self::ChunkedBatch { .. } => LfqMode::ChunkedBatch,
            Self::Block { .. } => LfqMode::Block,
        }
    }

    /// Materialized codebook, if this mode keeps one
    pub fn codebook(&self) -> Option<&Tensor> {
        match self {
            Self::Vanilla { book_t } | Self::ChunkedBatch { book_t } => Some(book_t),
            Self::Block { .. } => None,
        }
    }

    /// Estimator for this mode
    pub fn estimator<'a>(
        &'a self,
        config: &LfqConfig,
        provider: &'a dyn CodebookProvider,
    ) -> Box<dyn EntropyEstimator + 'a> {
        let params = EntropyParams::new(config.temperature, config.eps);
        match self {
            Self::Vanilla { book_t } => Box::new(VanillaEstimator::new(book_t, provider, params)),
            Self::ChunkedBatch { book_t } => {
                Box::new(ChunkedBatchEstimator::new(book_t, params, config.chunk_size))
            }
            Self::Block { plan } => {
                Box::new(BlockEstimator::new(plan, provider, params, config.chunk_size))
            }
        }
    }
}
