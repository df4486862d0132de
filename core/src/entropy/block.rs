//! Block strategy
//!
//! For codebooks too large to score in one matmul. Each subbook is
//! generated from the provider, scored chunk by chunk, folded into the
//! running totals and dropped before the next one is generated, so peak
//! memory is `O(batch * chunk * subbook_size)` whatever the bit-width.
//!
//! Subbooks are normalized independently and share one `(batch,
//! subbook_size)` accumulator: slot `j` of row `b` collects the mass sample
//! `b` puts on column `j` of every subbook. Each row sums to 1, and
//! `mean_entro` is the entropy of each row averaged over the batch.

use candle_core::{DType, Tensor};

use super::{
    chunk_offsets, distribution_entropy, score_chunk, EntropyEstimate, EntropyEstimator,
    EntropyParams,
};
use crate::codebook::CodebookProvider;
use crate::error::LfqResult;
use crate::mode::SubbookPlan;

/// Scores sequence chunks against subbooks generated on demand
pub struct BlockEstimator<'a> {
    plan: &'a SubbookPlan,
    provider: &'a dyn CodebookProvider,
    params: EntropyParams,
    chunk_size: usize,
}

impl<'a> BlockEstimator<'a> {
    pub fn new(
        plan: &'a SubbookPlan,
        provider: &'a dyn CodebookProvider,
        params: EntropyParams,
        chunk_size: usize,
    ) -> Self {
        Self {
            plan,
            provider,
            params,
            chunk_size,
        }
    }
}

impl EntropyEstimator for BlockEstimator<'_> {
    fn estimate(&self, x: &Tensor) -> LfqResult<EntropyEstimate> {
        let (batch, seq, _) = x.dims3()?;
        let offsets = chunk_offsets(seq, self.chunk_size)?;
        let device = x.device();
        let width = self.plan.subbook_size() as usize;

        // Every subbook contributes `seq` rows of unit mass per sample
        let denorm = (seq as u64 * self.plan.num_subbooks()) as f64;

        let mut entro_acc = Tensor::zeros(batch, DType::F32, device)?;
        let mut probs_acc = Tensor::zeros((batch, width), DType::F32, device)?;

        for range in self.plan.ranges() {
            let sub_book = self
                .provider
                .generate_subbook(self.plan.bits(), range.start, range.end, device)?;

            for &offset in &offsets {
                let x_chunk = x.narrow(1, offset, self.chunk_size)?;
                let scores =
                    score_chunk(&x_chunk, &sub_book, self.params.temperature, self.params.eps)?;

                let chunk_entropy = scores.entropy.sum(1)?.affine(1.0 / denorm, 0.0)?;
                entro_acc = (entro_acc + chunk_entropy)?;

                let chunk_mass = scores.probs.sum(1)?.affine(1.0 / denorm, 0.0)?;
                probs_acc = (probs_acc + chunk_mass)?;
            }

            drop(sub_book);
            tracing::trace!(start = range.start, end = range.end, "released subbook");
        }

        let mean_entro = distribution_entropy(&probs_acc, self.params.eps)?;
        let entro_mean = entro_acc.mean_all()?;

        Ok(EntropyEstimate::new(entro_mean, mean_entro, probs_acc))
    }

    fn name(&self) -> &'static str {
        "block"
    }
}
