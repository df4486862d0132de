//! Batch input/output for `lfq quantize`
//!
//! Accepts either a bare 3-D array or an object with a `batch` field:
//!
//! ```json
//! {"batch": [[[0.1, -0.4, 0.9], [0.0, 0.2, -0.3]]]}
//! ```

use anyhow::{Context, Result};
use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read};
use std::path::Path;

use lfq_core::{CodeUsage, LfqMode, LossSummary};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BatchFile {
    Wrapped { batch: Vec<Vec<Vec<f32>>> },
    Bare(Vec<Vec<Vec<f32>>>),
}

/// Dense `(batch, seq, bits)` values loaded from JSON
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub data: Vec<f32>,
    pub shape: (usize, usize, usize),
}

impl Batch {
    /// Parse a JSON document into a rectangular batch
    pub fn from_json(text: &str) -> Result<Self> {
        let nested = match serde_json::from_str::<BatchFile>(text)
            .context("Expected a 3-D array or {\"batch\": [...]}")?
        {
            BatchFile::Wrapped { batch } => batch,
            BatchFile::Bare(batch) => batch,
        };
        Self::from_nested(nested)
    }

    /// Flatten nested rows, rejecting ragged input
    pub fn from_nested(nested: Vec<Vec<Vec<f32>>>) -> Result<Self> {
        let batch = nested.len();
        let seq = nested.first().map(|s| s.len()).unwrap_or(0);
        let bits = nested
            .first()
            .and_then(|s| s.first())
            .map(|row| row.len())
            .unwrap_or(0);

        if batch == 0 || seq == 0 || bits == 0 {
            anyhow::bail!("Batch is empty");
        }

        let mut data = Vec::with_capacity(batch * seq * bits);
        for (b, sample) in nested.into_iter().enumerate() {
            if sample.len() != seq {
                anyhow::bail!("Sample {} has {} positions, expected {}", b, sample.len(), seq);
            }
            for (s, row) in sample.into_iter().enumerate() {
                if row.len() != bits {
                    anyhow::bail!(
                        "Sample {} position {} has {} values, expected {}",
                        b, s, row.len(), bits
                    );
                }
                data.extend(row);
            }
        }

        Ok(Self { data, shape: (batch, seq, bits) })
    }

    pub fn bits(&self) -> usize {
        self.shape.2
    }

    pub fn to_tensor(&self, device: &Device) -> Result<Tensor> {
        Ok(Tensor::from_slice(&self.data, self.shape, device)?)
    }
}

/// Load a batch from a file, or stdin when `path` is `-` or absent
pub fn load_batch(path: Option<&Path>) -> Result<Batch> {
    let text = match path {
        Some(p) if p.as_os_str() != "-" => fs::read_to_string(p)
            .with_context(|| format!("Failed to read {}", p.display()))?,
        _ => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    Batch::from_json(&text)
}

/// Written by `lfq quantize`
#[derive(Debug, Serialize)]
pub struct QuantizeReport {
    pub timestamp: String,
    pub bits: u32,
    pub mode: LfqMode,
    pub shape: [usize; 3],
    pub training: bool,
    pub codes: Vec<Vec<Vec<f32>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indices: Option<Vec<Vec<i64>>>,
    pub losses: LossSummary,
    /// Host-side `mean((x - code)^2)`, reported in both modes
    pub reconstruction_mse: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<CodeUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perplexity: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wrapped() {
        let batch = Batch::from_json(r#"{"batch": [[[0.5, -0.5], [1.0, 0.0]]]}"#).unwrap();
        assert_eq!(batch.shape, (1, 2, 2));
        assert_eq!(batch.data, vec![0.5, -0.5, 1.0, 0.0]);
    }

    #[test]
    fn test_parse_bare() {
        let batch = Batch::from_json("[[[1.0]], [[-1.0]]]").unwrap();
        assert_eq!(batch.shape, (2, 1, 1));
        assert_eq!(batch.bits(), 1);
    }

    #[test]
    fn test_rejects_ragged() {
        assert!(Batch::from_json("[[[1.0, 2.0], [3.0]]]").is_err());
        assert!(Batch::from_json("[[[1.0]], [[2.0], [3.0]]]").is_err());
    }

    #[test]
    fn test_rejects_empty_and_malformed() {
        assert!(Batch::from_json("[]").is_err());
        assert!(Batch::from_json(r#"{"vectors": [[1.0]]}"#).is_err());
    }

    #[test]
    fn test_to_tensor() {
        let batch = Batch::from_json("[[[0.5, -0.5, 2.0]]]").unwrap();
        let t = batch.to_tensor(&Device::Cpu).unwrap();
        assert_eq!(t.dims(), &[1, 1, 3]);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.json");
        fs::write(&path, "[[[0.1, 0.2]]]").unwrap();
        let batch = load_batch(Some(&path)).unwrap();
        assert_eq!(batch.shape, (1, 1, 2));
    }
}
