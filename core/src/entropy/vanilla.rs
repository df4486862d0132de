//! Vanilla strategy: delegate to the provider's direct entropy routine.

use candle_core::Tensor;

use super::{EntropyEstimate, EntropyEstimator, EntropyParams};
use crate::codebook::CodebookProvider;
use crate::error::LfqResult;

/// Scores the whole batch against the fully materialized codebook
pub struct VanillaEstimator<'a> {
    book_t: &'a Tensor,
    provider: &'a dyn CodebookProvider,
    params: EntropyParams,
}

impl<'a> VanillaEstimator<'a> {
    pub fn new(
        book_t: &'a Tensor,
        provider: &'a dyn CodebookProvider,
        params: EntropyParams,
    ) -> Self {
        Self {
            book_t,
            provider,
            params,
        }
    }
}

impl EntropyEstimator for VanillaEstimator<'_> {
    fn estimate(&self, x: &Tensor) -> LfqResult<EntropyEstimate> {
        let book_t = super::book_on_device(self.book_t, x)?;
        self.provider
            .direct_entropy(x, &book_t, self.params.temperature, self.params.eps)
    }

    fn name(&self) -> &'static str {
        "vanilla"
    }
}
