//! Cross-Strategy Benchmark
//!
//! Runs the entropy strategies on the same synthetic batch and checks that
//! Vanilla and Chunked-Batch agree. Block is reported alongside; its
//! subbook-local softmax is not expected to match the other two.
//!
//! # Usage
//! ```bash
//! lfq bench --bits 4,8,12 --batch 2 --seq 32 --seed 42
//! lfq bench --bits 10 --json
//! ```

use std::time::Instant;

use anyhow::{Context, Result};
use candle_core::Device;
use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::Serialize;

use lfq_core::entropy::{
    BlockEstimator, ChunkedBatchEstimator, EntropyEstimator, EntropyParams, VanillaEstimator,
};
use lfq_core::{full_codebook, synthetic, BitCodebook, EntropyValues, LfqConfig, SubbookPlan};

/// Vanilla and Chunked-Batch must agree within this tolerance
pub const AGREEMENT_TOLERANCE: f32 = 1e-3;

/// Widest codebook the bench will materialize
pub const MAX_BENCH_BITS: u32 = 16;

/// Bench parameters
#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub bits: Vec<u32>,
    pub batch: usize,
    pub seq: usize,
    pub chunk_size: usize,
    pub seed: u64,
    pub temperature: f32,
    pub eps: f32,
}

impl BenchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.bits.is_empty() {
            anyhow::bail!("No bit widths given");
        }
        if let Some(&bits) = self.bits.iter().find(|&&b| b == 0 || b > MAX_BENCH_BITS) {
            anyhow::bail!("Bit width {} out of range 1..={}", bits, MAX_BENCH_BITS);
        }
        if self.batch == 0 || self.seq == 0 {
            anyhow::bail!("Batch and sequence length must be positive");
        }
        if self.chunk_size == 0 || self.seq % self.chunk_size != 0 {
            anyhow::bail!(
                "Chunk size {} must divide sequence length {}",
                self.chunk_size,
                self.seq
            );
        }
        Ok(())
    }

    fn params(&self) -> EntropyParams {
        EntropyParams::new(self.temperature, self.eps)
    }
}

/// One bit width
#[derive(Debug, Clone, Serialize)]
pub struct BenchResult {
    pub bits: u32,
    pub codebook_size: u64,
    pub vanilla: EntropyValues,
    pub chunked: EntropyValues,
    pub block: EntropyValues,
    pub max_abs_diff: f32,
    pub agree: bool,
    pub vanilla_ms: f64,
    pub chunked_ms: f64,
    pub block_ms: f64,
}

/// Full bench run
#[derive(Debug, Clone, Serialize)]
pub struct BenchReport {
    pub timestamp: String,
    pub batch: usize,
    pub seq: usize,
    pub chunk_size: usize,
    pub seed: u64,
    pub temperature: f32,
    pub tolerance: f32,
    pub results: Vec<BenchResult>,
}

impl BenchReport {
    pub fn all_agree(&self) -> bool {
        self.results.iter().all(|r| r.agree)
    }
}

/// Run every bit width in parallel, ordered by bit width
pub fn run_bench(config: &BenchConfig, progress: Option<&ProgressBar>) -> Result<BenchReport> {
    config.validate()?;

    let mut results = config
        .bits
        .par_iter()
        .map(|&bits| {
            let result = bench_bits(config, bits);
            if let Some(pb) = progress {
                pb.inc(1);
            }
            result
        })
        .collect::<Result<Vec<_>>>()?;
    results.sort_by_key(|r| r.bits);

    Ok(BenchReport {
        timestamp: chrono::Utc::now().to_rfc3339(),
        batch: config.batch,
        seq: config.seq,
        chunk_size: config.chunk_size,
        seed: config.seed,
        temperature: config.temperature,
        tolerance: AGREEMENT_TOLERANCE,
        results,
    })
}

fn bench_bits(config: &BenchConfig, bits: u32) -> Result<BenchResult> {
    let device = Device::Cpu;
    let params = config.params();
    let provider = BitCodebook;

    let x = synthetic::uniform_batch(
        config.batch,
        config.seq,
        bits as usize,
        config.seed,
        &device,
    )?;
    let book_t = full_codebook(bits, &device)?;
    let plan = SubbookPlan::new(bits);

    let (vanilla, vanilla_ms) = timed(&VanillaEstimator::new(&book_t, &provider, params), &x)
        .with_context(|| format!("vanilla estimate failed at {} bits", bits))?;
    let (chunked, chunked_ms) =
        timed(&ChunkedBatchEstimator::new(&book_t, params, config.chunk_size), &x)
            .with_context(|| format!("chunked estimate failed at {} bits", bits))?;
    let (block, block_ms) =
        timed(&BlockEstimator::new(&plan, &provider, params, config.chunk_size), &x)
            .with_context(|| format!("block estimate failed at {} bits", bits))?;

    let max_abs_diff = (vanilla.entro_mean - chunked.entro_mean)
        .abs()
        .max((vanilla.mean_entro - chunked.mean_entro).abs());

    tracing::debug!(bits, max_abs_diff, vanilla_ms, chunked_ms, block_ms, "bench width done");

    Ok(BenchResult {
        bits,
        codebook_size: LfqConfig::with_bits(bits).codebook_size(),
        vanilla,
        chunked,
        block,
        max_abs_diff,
        agree: max_abs_diff <= AGREEMENT_TOLERANCE,
        vanilla_ms,
        chunked_ms,
        block_ms,
    })
}

fn timed(
    estimator: &dyn EntropyEstimator,
    x: &candle_core::Tensor,
) -> Result<(EntropyValues, f64)> {
    let start = Instant::now();
    let values = estimator.estimate(x)?.values()?;
    Ok((values, start.elapsed().as_secs_f64() * 1000.0))
}

/// Parse a comma separated list of bit widths, e.g. `4,8,12`
pub fn parse_bits_list(list: &str) -> Result<Vec<u32>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u32>()
                .map_err(|e| anyhow::anyhow!("Invalid bit width '{}': {}", s, e))
        })
        .collect()
}
