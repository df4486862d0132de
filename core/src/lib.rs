//! LFQ Core - Lookup-Free Quantization
//!
//! Quantizes `(batch, seq, d)` tensors into ±1 codes, one sign bit per
//! coordinate, naming one of `2^d` codewords without a lookup table. For
//! training it also computes the entropy regularizer that keeps the
//! codebook from collapsing onto a few codewords.
//!
//! # Features
//!
//! - **Sign quantization** with a straight-through gradient path
//! - **Three entropy strategies** picked from the bit-width:
//!   Vanilla, Chunked-Batch and Block (subbooks generated on demand)
//! - **Lazy mode selection** on the first call's device
//! - **Index decoding** of codes into `i64` codeword labels
//!
//! # Modes
//!
//! | bit-width (defaults) | mode | memory |
//! |----------------------|------|--------|
//! | `d < 19` | Vanilla | `O(B * S * 2^d)` |
//! | `19 <= d < 26` | Chunked-Batch | `O(B * chunk * 2^d)` |
//! | `d >= 26` | Block | `O(B * chunk * 2^20)` |
//!
//! # Example
//!
//! ```rust,ignore
//! use lfq_core::{Lfq, LfqConfig};
//!
//! let lfq = Lfq::new(LfqConfig::with_bits(16))?;
//! let out = lfq.run(&x, true, true)?;
//! let loss = (out.entro_loss + out.commit_loss)?;
//! ```

pub mod codebook;
pub mod config;
pub mod constants;
pub mod entropy;
pub mod error;
pub mod lfq;
pub mod metrics;
pub mod mode;
pub mod quantization;
pub mod synthetic;
pub mod training;

pub use codebook::{codeword, full_codebook, generate_subbook, BitCodebook, CodebookProvider};
pub use config::{LfqConfig, ModeThresholds};
pub use entropy::{EntropyEstimate, EntropyEstimator, EntropyParams, EntropyValues};
pub use error::{LfqError, LfqResult};
pub use lfq::{Lfq, LfqOutput, LossSummary};
pub use metrics::{code_usage, mean_squared_error, perplexity, CodeUsage};
pub use mode::{LfqMode, ModeState, SubbookPlan};
pub use quantization::{commit_loss, decode_indices, hard_quantize, straight_through};
pub use training::TrainableLfq;
