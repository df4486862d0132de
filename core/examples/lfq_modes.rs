//! LFQ mode tour
//!
//! Runs one training step per strategy on a synthetic batch and prints
//! the loss terms.
//!
//! Run with: cargo run -p lfq_core --example lfq_modes --release

use candle_core::Device;

use lfq_core::synthetic::uniform_batch;
use lfq_core::{Lfq, LfqConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║     LOOKUP-FREE QUANTIZATION - MODE TOUR                         ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    let device = Device::Cpu;
    let (batch, seq) = (2, 32);

    // Thresholds shrunk so every mode fits in a few MB
    let configs = [
        LfqConfig::with_bits(8).thresholds(10, 12),
        LfqConfig::with_bits(10).thresholds(8, 12),
        LfqConfig::with_bits(12).thresholds(8, 10),
    ];

    for config in configs {
        let bits = config.bits;
        let lfq = Lfq::new(config.temperature(0.05).debug(true))?;
        let x = uniform_batch(batch, seq, bits as usize, 42, &device)?;

        let out = lfq.run(&x, true, true)?;
        let summary = out.summary()?;
        let mode = lfq.mode().map(|m| m.to_string()).unwrap_or_default();

        println!("📐 {} bits → {} codewords ({})", bits, 1u64 << bits, mode);
        println!("   Entropy mean:    {:.4}", summary.entro_mean);
        println!("   Mean entropy:    {:.4}", summary.mean_entro);
        println!("   Entropy loss:    {:.4}", summary.entro_loss);
        println!("   Commit loss:     {:.4}", summary.commit_loss);
        println!();
    }

    Ok(())
}
