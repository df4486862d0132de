//! Configuration management for the LFQ CLI
//!
//! Stores the default quantizer settings in ~/.lfq/config.toml

use anyhow::{Context, Result};
use lfq_core::LfqConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// BENCH DEFAULTS
// ============================================================================

/// Defaults for `lfq bench`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchDefaults {
    pub batch: usize,
    pub seq: usize,
    pub seed: u64,
}

impl Default for BenchDefaults {
    fn default() -> Self {
        Self {
            batch: 2,
            seq: 32,
            seed: 42,
        }
    }
}

// ============================================================================
// MAIN CONFIG
// ============================================================================

/// CLI Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Quantizer defaults
    #[serde(default)]
    pub quantizer: LfqConfig,

    /// Benchmark defaults
    #[serde(default)]
    pub bench: BenchDefaults,
}

/// Keys accepted by `lfq config set/get`
pub const KEYS: &[&str] = &[
    "bits",
    "alpha",
    "beta",
    "temperature",
    "eps",
    "chunk_size",
    "vanilla_below",
    "chunked_below",
    "debug",
    "bench.batch",
    "bench.seq",
    "bench.seed",
];

impl Config {
    /// Get the config directory path (~/.lfq/)
    pub fn dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
        Ok(home.join(".lfq"))
    }

    /// Get the config file path (~/.lfq/config.toml)
    pub fn path() -> Result<PathBuf> {
        Ok(Self::dir()?.join("config.toml"))
    }

    /// Load config from the default location (default if missing)
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    /// Load config from a file (default if missing)
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        Ok(config)
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    /// Save config to a file, creating its directory if needed
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(())
    }

    /// Set a value by key; the result must still be a valid quantizer config
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let q = &mut self.quantizer;
        match key {
            "bits" => q.bits = parse(key, value)?,
            "alpha" => q.alpha = parse(key, value)?,
            "beta" => q.beta = parse(key, value)?,
            "temperature" => q.temperature = parse(key, value)?,
            "eps" => q.eps = parse(key, value)?,
            "chunk_size" => q.chunk_size = parse(key, value)?,
            "vanilla_below" => q.thresholds.vanilla_below = parse(key, value)?,
            "chunked_below" => q.thresholds.chunked_below = parse(key, value)?,
            "debug" => q.debug = parse(key, value)?,
            "bench.batch" => self.bench.batch = parse(key, value)?,
            "bench.seq" => self.bench.seq = parse(key, value)?,
            "bench.seed" => self.bench.seed = parse(key, value)?,
            _ => anyhow::bail!("Unknown key: {}. Valid keys: {}", key, KEYS.join(", ")),
        }
        self.quantizer.validate()?;
        Ok(())
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Result<String> {
        let q = &self.quantizer;
        let value = match key {
            "bits" => q.bits.to_string(),
            "alpha" => q.alpha.to_string(),
            "beta" => q.beta.to_string(),
            "temperature" => q.temperature.to_string(),
            "eps" => q.eps.to_string(),
            "chunk_size" => q.chunk_size.to_string(),
            "vanilla_below" => q.thresholds.vanilla_below.to_string(),
            "chunked_below" => q.thresholds.chunked_below.to_string(),
            "debug" => q.debug.to_string(),
            "bench.batch" => self.bench.batch.to_string(),
            "bench.seq" => self.bench.seq.to_string(),
            "bench.seed" => self.bench.seed.to_string(),
            _ => anyhow::bail!("Unknown key: {}. Valid keys: {}", key, KEYS.join(", ")),
        };
        Ok(value)
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("Invalid value for {}: {} ({})", key, value, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.quantizer, LfqConfig::default());
        assert_eq!(config.bench.seq, 32);
    }

    #[test]
    fn test_set_and_get() {
        let mut config = Config::default();
        config.set("bits", "12").unwrap();
        config.set("temperature", "0.1").unwrap();
        config.set("debug", "true").unwrap();
        config.set("bench.seed", "7").unwrap();

        assert_eq!(config.get("bits").unwrap(), "12");
        assert_eq!(config.get("temperature").unwrap(), "0.1");
        assert_eq!(config.get("debug").unwrap(), "true");
        assert_eq!(config.get("bench.seed").unwrap(), "7");
    }

    #[test]
    fn test_set_rejects_invalid() {
        let mut config = Config::default();
        assert!(config.set("bits", "many").is_err());
        assert!(config.set("colour", "blue").is_err());
        assert!(config.set("temperature", "0").is_err());
        assert!(config.get("colour").is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.set("bits", "10").unwrap();
        config.set("chunk_size", "8").unwrap();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, Config::default());
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[quantizer]\nbits = 14\n").unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.quantizer.bits, 14);
        assert_eq!(loaded.quantizer.chunk_size, 16);
    }
}
