//! LFQ CLI - Lookup-Free Quantization
//!
//! Usage:
//!   lfq quantize batch.json --train --indices   # Quantize a batch
//!   lfq plan --bits 26                          # Show mode and subbook plan
//!   lfq bench --bits 4,8,12                     # Compare entropy strategies
//!   lfq config list                             # Show stored defaults

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};

use lfq_core::{
    code_usage, mean_squared_error, perplexity, LfqConfig, LfqMode, SubbookPlan, TrainableLfq,
};

mod bench;
mod config;
mod input;

use bench::{parse_bits_list, run_bench, BenchConfig, BenchReport};
use config::Config;
use input::{load_batch, QuantizeReport};

// ============================================================================
// CLI STRUCTURE
// ============================================================================

#[derive(Parser)]
#[command(name = "lfq")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "LFQ - Lookup-Free Quantization with entropy regularization", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Quantize a (batch, seq, bits) JSON batch
    Quantize {
        /// Input file (JSON). Use - for stdin.
        input: Option<PathBuf>,

        /// Output file. Omit for stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Code width (defaults to the batch's last dimension)
        #[arg(short, long)]
        bits: Option<u32>,

        /// Run in training mode (entropy and commit losses)
        #[arg(long)]
        train: bool,

        /// Include codeword indices (training mode only)
        #[arg(long)]
        indices: bool,

        /// Softmax temperature
        #[arg(long)]
        temperature: Option<f32>,

        /// Entropy loss weight
        #[arg(long)]
        alpha: Option<f32>,

        /// Sequence chunk size for Chunked-Batch and Block modes
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Verify probability mass and log per-call losses
        #[arg(long)]
        debug: bool,

        /// Config file overriding ~/.lfq/config.toml
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Use CUDA device 0 when available
        #[arg(long)]
        gpu: bool,
    },

    /// Show the mode, codebook size and subbook plan for a bit-width
    Plan {
        /// Code width (defaults to the configured bits)
        #[arg(short, long)]
        bits: Option<u32>,

        /// Config file overriding ~/.lfq/config.toml
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Compare entropy strategies on synthetic batches
    Bench {
        /// Comma separated bit widths
        #[arg(short, long, default_value = "4,8,12")]
        bits: String,

        /// Batch size
        #[arg(long)]
        batch: Option<usize>,

        /// Sequence length
        #[arg(long)]
        seq: Option<usize>,

        /// Chunk size
        #[arg(long)]
        chunk_size: Option<usize>,

        /// RNG seed
        #[arg(long)]
        seed: Option<u64>,

        /// Softmax temperature
        #[arg(long)]
        temperature: Option<f32>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Config file overriding ~/.lfq/config.toml
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Manage stored defaults
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Set a configuration value
    Set {
        /// Key, e.g. bits, temperature, chunk_size, bench.seed (see `lfq config list`)
        key: String,
        /// Value
        value: String,
    },
    /// Get a configuration value
    Get {
        /// Key
        key: String,
    },
    /// List all configuration
    List,
    /// Show config file path
    Path,
    /// Restore defaults
    Reset,
}

// ============================================================================
// MAIN
// ============================================================================

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Quantize {
            input,
            output,
            bits,
            train,
            indices,
            temperature,
            alpha,
            chunk_size,
            debug,
            config,
            gpu,
        } => {
            let stored = resolve_config(config.as_deref())?;
            let overrides = QuantizeOverrides { bits, temperature, alpha, chunk_size, debug };
            quantize_cmd(input, output, stored.quantizer, overrides, train, indices, gpu)?;
        }
        Commands::Plan { bits, config } => {
            let stored = resolve_config(config.as_deref())?;
            plan_cmd(stored.quantizer, bits)?;
        }
        Commands::Bench { bits, batch, seq, chunk_size, seed, temperature, json, config } => {
            let stored = resolve_config(config.as_deref())?;
            let bench_config = BenchConfig {
                bits: parse_bits_list(&bits)?,
                batch: batch.unwrap_or(stored.bench.batch),
                seq: seq.unwrap_or(stored.bench.seq),
                chunk_size: chunk_size.unwrap_or(stored.quantizer.chunk_size),
                seed: seed.unwrap_or(stored.bench.seed),
                temperature: temperature.unwrap_or(stored.quantizer.temperature),
                eps: stored.quantizer.eps,
            };
            bench_cmd(&bench_config, json)?;
        }
        Commands::Config { action } => match action {
            ConfigCommands::Set { key, value } => config_set(&key, &value)?,
            ConfigCommands::Get { key } => config_get(&key)?,
            ConfigCommands::List => config_list()?,
            ConfigCommands::Path => config_path()?,
            ConfigCommands::Reset => config_reset()?,
        },
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Explicit config file if given (must exist), otherwise ~/.lfq/config.toml
fn resolve_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => {
            if !p.exists() {
                anyhow::bail!("Config file not found: {}", p.display());
            }
            Config::load_from(p)
        }
        None => Config::load(),
    }
}

// ============================================================================
// QUANTIZE COMMAND
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
struct QuantizeOverrides {
    bits: Option<u32>,
    temperature: Option<f32>,
    alpha: Option<f32>,
    chunk_size: Option<usize>,
    debug: bool,
}

impl QuantizeOverrides {
    /// Flags win over stored values; bits fall back to the batch width
    fn apply(self, mut config: LfqConfig, batch_bits: usize) -> LfqConfig {
        config.bits = self.bits.unwrap_or(batch_bits as u32);
        if let Some(t) = self.temperature {
            config.temperature = t;
        }
        if let Some(a) = self.alpha {
            config.alpha = a;
        }
        if let Some(c) = self.chunk_size {
            config.chunk_size = c;
        }
        config.debug |= self.debug;
        config
    }
}

fn quantize_cmd(
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    stored: LfqConfig,
    overrides: QuantizeOverrides,
    train: bool,
    want_indices: bool,
    gpu: bool,
) -> Result<()> {
    let batch = load_batch(input.as_deref())?;
    let (b, s, d) = batch.shape;
    eprintln!("{}  Loaded batch {}x{}x{}", style("📥").cyan(), b, s, d);

    let config = overrides.apply(stored, batch.bits());
    let mode = LfqMode::select(config.bits, config.thresholds);

    if want_indices && !train {
        eprintln!(
            "{}  Indices are only produced in training mode (add {})",
            style("⚠").yellow(),
            style("--train").cyan()
        );
    }

    let device = if gpu {
        candle_core::Device::cuda_if_available(0)?
    } else {
        candle_core::Device::Cpu
    };

    let mut lfq = TrainableLfq::new(config.clone())?;
    if !train {
        lfq.eval();
    }

    let x = batch.to_tensor(&device)?;
    let out = lfq
        .forward(&x, want_indices)
        .with_context(|| format!("Quantization failed ({} mode, {} bits)", mode, config.bits))?;

    let losses = out.summary()?;
    let indices = match &out.indices {
        Some(t) => Some(t.to_vec2::<i64>()?),
        None => None,
    };
    let usage = indices.as_ref().map(|rows| {
        let flat: Vec<i64> = rows.iter().flatten().copied().collect();
        code_usage(&flat, config.codebook_size())
    });

    let codes = out.quantized.to_vec3::<f32>()?;
    let flat_codes: Vec<f32> = codes.iter().flatten().flatten().copied().collect();
    let reconstruction_mse = mean_squared_error(&batch.data, &flat_codes);

    let report = QuantizeReport {
        timestamp: chrono::Utc::now().to_rfc3339(),
        bits: config.bits,
        mode: lfq.inner().mode().unwrap_or(mode),
        shape: [b, s, d],
        training: train,
        codes,
        indices,
        losses,
        reconstruction_mse,
        usage,
        perplexity: train.then(|| perplexity(losses.mean_entro)),
    };

    eprintln!(
        "{}  Mode: {}  codebook: 2^{}",
        style("✅").green(),
        style(report.mode).green(),
        config.bits
    );
    eprintln!("   reconstruction mse {:.4}", reconstruction_mse);
    if train {
        eprintln!(
            "   entro_mean {:.4}  mean_entro {:.4}  entro_loss {:.4}  commit {:.4}",
            losses.entro_mean, losses.mean_entro, losses.entro_loss, losses.commit_loss
        );
    }

    let json = serde_json::to_string_pretty(&report)?;
    match output {
        Some(path) => {
            fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("{}  Saved to {}", style("💾").cyan(), path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}

// ============================================================================
// PLAN COMMAND
// ============================================================================

fn plan_cmd(mut config: LfqConfig, bits: Option<u32>) -> Result<()> {
    if let Some(b) = bits {
        config.bits = b;
    }
    config.validate()?;

    let mode = LfqMode::select(config.bits, config.thresholds);

    println!();
    println!("{}", style("🧭 LFQ Plan").bold().cyan());
    println!("{}", style("═".repeat(60)).dim());
    println!("  Bits:            {}", style(config.bits).white());
    println!("  Codebook size:   {}", style(config.codebook_size()).white());
    println!(
        "  Thresholds:      vanilla < {} <= chunked-batch < {} <= block",
        config.thresholds.vanilla_below, config.thresholds.chunked_below
    );
    println!("  Mode:            {}", style(mode).green().bold());

    match mode {
        LfqMode::Vanilla => {
            println!("  Codebook:        materialized once, scored against the whole batch");
        }
        LfqMode::ChunkedBatch => {
            println!("  Codebook:        materialized once");
            println!("  Chunk size:      {} positions", config.chunk_size);
        }
        LfqMode::Block => {
            let plan = SubbookPlan::new(config.bits);
            println!("  Codebook:        generated per subbook, never materialized");
            println!("  Subbook size:    {}", plan.subbook_size());
            println!("  Subbooks:        {}", plan.num_subbooks());
            println!("  Chunk size:      {} positions", config.chunk_size);
            println!("{}", style("─".repeat(60)).dim());
            let ranges: Vec<_> = plan.ranges().collect();
            let shown = ranges.len().min(4);
            for range in &ranges[..shown] {
                println!("    [{}, {})", range.start, range.end);
            }
            if ranges.len() > shown {
                println!("    ... {} more", ranges.len() - shown);
            }
        }
    }
    println!("{}", style("═".repeat(60)).dim());
    println!();

    Ok(())
}

// ============================================================================
// BENCH COMMAND
// ============================================================================

fn bench_cmd(config: &BenchConfig, json: bool) -> Result<()> {
    let pb = if json {
        None
    } else {
        let pb = ProgressBar::new(config.bits.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} widths",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Some(pb)
    };

    let report = run_bench(config, pb.as_ref())?;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_bench(&report);
    }

    if !report.all_agree() {
        anyhow::bail!("Strategies disagree beyond tolerance {}", report.tolerance);
    }
    Ok(())
}

fn print_bench(report: &BenchReport) {
    println!();
    println!("{}", style("🔬 LFQ Strategy Benchmark").bold().cyan());
    println!("{}", style("═".repeat(72)).dim());
    println!(
        "  Batch {}  Seq {}  Chunk {}  Seed {}  T={}",
        report.batch, report.seq, report.chunk_size, report.seed, report.temperature
    );
    println!("{}", style("─".repeat(72)).dim());
    println!(
        "  {:>4}  {:>10}  {:>10}  {:>10}  {:>10}  {:>9}  {}",
        "bits", "entro_mean", "mean_entro", "block_em", "|diff|", "ms(v/c)", ""
    );

    for r in &report.results {
        let mark = if r.agree {
            style("✓").green()
        } else {
            style("✗").red()
        };
        println!(
            "  {:>4}  {:>10.5}  {:>10.5}  {:>10.5}  {:>10.2e}  {:>4.1}/{:<4.1}  {}",
            r.bits,
            r.vanilla.entro_mean,
            r.vanilla.mean_entro,
            r.block.entro_mean,
            r.max_abs_diff,
            r.vanilla_ms,
            r.chunked_ms,
            mark
        );
    }

    println!("{}", style("═".repeat(72)).dim());
    if report.all_agree() {
        println!(
            "  {} Vanilla and Chunked-Batch agree within {}",
            style("VERDICT:").bold(),
            report.tolerance
        );
    } else {
        println!(
            "  {} {}",
            style("VERDICT:").bold(),
            style("Strategies disagree").red().bold()
        );
    }
    println!();
}

// ============================================================================
// CONFIG COMMANDS
// ============================================================================

fn config_set(key: &str, value: &str) -> Result<()> {
    let mut config = Config::load()?;
    config.set(key, value)?;
    config.save()?;
    println!("{} Set {} = {}", style("✓").green(), key, value);
    Ok(())
}

fn config_get(key: &str) -> Result<()> {
    let config = Config::load()?;
    println!("{}", config.get(key)?);
    Ok(())
}

fn config_list() -> Result<()> {
    let config = Config::load()?;
    println!("{}", style("⚙️  LFQ Configuration").bold());
    println!();
    for key in config::KEYS {
        println!("  {:<14} {}", format!("{}:", key), config.get(key)?);
    }
    Ok(())
}

fn config_path() -> Result<()> {
    println!("{}", Config::path()?.display());
    Ok(())
}

fn config_reset() -> Result<()> {
    Config::default().save()?;
    println!("{} Configuration reset to defaults", style("✓").green());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_quantize() {
        let cli = Cli::try_parse_from([
            "lfq", "-vv", "quantize", "batch.json", "--train", "--indices", "--bits", "8",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Quantize { bits, train, indices, .. } => {
                assert_eq!(bits, Some(8));
                assert!(train);
                assert!(indices);
            }
            _ => panic!("expected quantize"),
        }
    }

    #[test]
    fn test_cli_parses_bench_defaults() {
        let cli = Cli::try_parse_from(["lfq", "bench"]).unwrap();
        match cli.command {
            Commands::Bench { bits, json, .. } => {
                assert_eq!(bits, "4,8,12");
                assert!(!json);
            }
            _ => panic!("expected bench"),
        }
    }

    #[test]
    fn test_overrides_take_precedence() {
        let stored = LfqConfig::default().temperature(0.5);
        let overrides = QuantizeOverrides {
            bits: None,
            temperature: Some(0.1),
            alpha: None,
            chunk_size: Some(8),
            debug: true,
        };
        let config = overrides.apply(stored, 6);
        assert_eq!(config.bits, 6);
        assert_eq!(config.temperature, 0.1);
        assert_eq!(config.chunk_size, 8);
        assert!(config.debug);
        assert_eq!(config.alpha, 1.0);
    }

    #[test]
    fn test_bits_default_to_batch_width() {
        let batch = input::Batch::from_json("[[[0.5, -0.5, 1.0]]]").unwrap();
        let config = QuantizeOverrides::default().apply(LfqConfig::default(), batch.bits());
        assert_eq!(config.bits, 3);

        let pinned = QuantizeOverrides { bits: Some(5), ..Default::default() };
        assert_eq!(pinned.apply(LfqConfig::default(), batch.bits()).bits, 5);
    }

    #[test]
    fn test_resolve_missing_explicit_config() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_config(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
