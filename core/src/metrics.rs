//! Codebook Usage Metrics
//!
//! Host-side statistics for reports:
//! - Utilization: share of the codebook actually hit by a batch
//! - Perplexity: `exp(mean_entro)`, the effective number of codewords
//! - Mean Squared Error: reconstruction distance of the ±1 code

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Usage summary of decoded indices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeUsage {
    /// Number of positions
    pub total: usize,
    /// Number of distinct codewords hit
    pub distinct: usize,
    /// `distinct / codebook_size`
    pub utilization: f64,
    /// Most frequent codeword and its count
    pub most_common: Option<(i64, usize)>,
}

/// Summarize how a batch spreads over a codebook of `codebook_size` entries
pub fn code_usage(indices: &[i64], codebook_size: u64) -> CodeUsage {
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for &index in indices {
        *counts.entry(index).or_insert(0) += 1;
    }

    // Ties resolve to the smallest index so reports are stable
    let most_common = counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
        .map(|(&index, &count)| (index, count));

    let utilization = if codebook_size == 0 {
        0.0
    } else {
        counts.len() as f64 / codebook_size as f64
    };

    CodeUsage {
        total: indices.len(),
        distinct: counts.len(),
        utilization,
        most_common,
    }
}

/// Effective number of codewords for an entropy in nats
pub fn perplexity(entropy: f32) -> f32 {
    entropy.exp()
}

/// Mean Squared Error
///
/// MSE = (1/n) * Σ(original_i - code_i)²
pub fn mean_squared_error(original: &[f32], code: &[f32]) -> f32 {
    debug_assert_eq!(original.len(), code.len());

    if original.is_empty() {
        return 0.0;
    }

    let n = original.len() as f32;
    original.iter()
        .zip(code.iter())
        .map(|(o, c)| (o - c).powi(2))
        .sum::<f32>() / n
}
