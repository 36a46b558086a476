//! Pipeline configuration
//!
//! Read from an optional config file and `IRRIGATION_*` environment
//! variables (nested keys use `__`). Every field has a default, so an empty
//! environment yields a working configuration.

use crate::classifier::{ForestConfig, LogisticConfig};
use crate::predictor::{OutputConfig, DEFAULT_LOW_CONFIDENCE_THRESHOLD};
use crate::source::{DuplicatePolicy, ReshapeConfig};
use crate::store::{ModelStoreConfig, DEFAULT_BUNDLE_FILE};
use crate::training::TrainingConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "IRRIGATION";

/// Lowest accepted `min_samples`
pub const MIN_TRAINING_SAMPLES: usize = 10;

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory holding the model bundle
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Row source fetch timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub source_timeout_secs: u64,

    /// Model store read/write timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub storage_timeout_secs: u64,

    /// Share of samples held out for evaluation
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,

    /// Seed for the split and the tree ensemble
    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default = "default_n_trees")]
    pub n_trees: usize,

    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Iteration bound for the linear classifier
    #[serde(default = "default_linear_max_iter")]
    pub linear_max_iter: usize,

    /// Minimum number of complete batches needed to train
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,

    /// Predictions below this confidence are flagged
    #[serde(default = "default_low_confidence_threshold")]
    pub low_confidence_threshold: f64,
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_test_fraction() -> f64 {
    0.2
}

fn default_seed() -> u64 {
    42
}

fn default_n_trees() -> usize {
    100
}

fn default_max_depth() -> usize {
    10
}

fn default_linear_max_iter() -> usize {
    1000
}

fn default_min_samples() -> usize {
    MIN_TRAINING_SAMPLES
}

fn default_low_confidence_threshold() -> f64 {
    DEFAULT_LOW_CONFIDENCE_THRESHOLD
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            source_timeout_secs: default_timeout_secs(),
            storage_timeout_secs: default_timeout_secs(),
            test_fraction: default_test_fraction(),
            seed: default_seed(),
            n_trees: default_n_trees(),
            max_depth: default_max_depth(),
            linear_max_iter: default_linear_max_iter(),
            min_samples: default_min_samples(),
            duplicate_policy: DuplicatePolicy::default(),
            low_confidence_threshold: default_low_confidence_threshold(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from an optional file and the environment
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        let parsed: Self = config
            .try_deserialize()
            .context("Invalid pipeline configuration")?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            anyhow::bail!("test_fraction must be between 0 and 1, got {}", self.test_fraction);
        }
        if self.min_samples < MIN_TRAINING_SAMPLES {
            anyhow::bail!(
                "min_samples must be at least {}, got {}",
                MIN_TRAINING_SAMPLES,
                self.min_samples
            );
        }
        if self.n_trees == 0 {
            anyhow::bail!("n_trees must be at least 1");
        }
        if self.source_timeout_secs == 0 || self.storage_timeout_secs == 0 {
            anyhow::bail!("timeouts must be at least one second");
        }
        Ok(())
    }

    pub fn training(&self) -> TrainingConfig {
        TrainingConfig {
            min_samples: self.min_samples,
            test_fraction: self.test_fraction,
            seed: self.seed,
            forest: ForestConfig {
                n_trees: self.n_trees,
                max_depth: self.max_depth,
                seed: self.seed,
                ..Default::default()
            },
            linear: LogisticConfig {
                max_iter: self.linear_max_iter,
                ..Default::default()
            },
        }
    }

    pub fn store(&self) -> ModelStoreConfig {
        ModelStoreConfig {
            model_dir: self.model_dir.clone(),
            bundle_file: DEFAULT_BUNDLE_FILE.to_string(),
        }
    }

    pub fn reshape(&self) -> ReshapeConfig {
        ReshapeConfig {
            duplicate_policy: self.duplicate_policy,
        }
    }

    pub fn output(&self) -> OutputConfig {
        OutputConfig {
            low_confidence_threshold: self.low_confidence_threshold,
        }
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.seed, 42);
        assert_eq!(config.n_trees, 100);
        assert_eq!(config.source_timeout(), Duration::from_secs(30));
        assert_eq!(config.duplicate_policy, DuplicatePolicy::LastWriteWins);

        let training = config.training();
        assert_eq!(training, TrainingConfig::default());
        assert_eq!(config.store().bundle_file, "irrigation_models.json");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("irrigation.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "model_dir = \"/var/lib/irrigation\"").unwrap();
        writeln!(file, "n_trees = 25").unwrap();
        writeln!(file, "duplicate_policy = \"reject\"").unwrap();
        drop(file);

        let config = PipelineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.model_dir, PathBuf::from("/var/lib/irrigation"));
        assert_eq!(config.n_trees, 25);
        assert_eq!(config.training().forest.n_trees, 25);
        assert_eq!(config.duplicate_policy, DuplicatePolicy::Reject);
        assert_eq!(config.max_depth, 10);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(PipelineConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_environment_overrides_defaults() {
        std::env::set_var("IRRIGATION_LINEAR_MAX_ITER", "250");
        std::env::set_var("IRRIGATION_SOURCE_TIMEOUT_SECS", "7");
        let loaded = PipelineConfig::load(None);
        std::env::remove_var("IRRIGATION_LINEAR_MAX_ITER");
        std::env::remove_var("IRRIGATION_SOURCE_TIMEOUT_SECS");

        let config = loaded.unwrap();
        assert_eq!(config.linear_max_iter, 250);
        assert_eq!(config.training().linear.max_iter, 250);
        assert_eq!(config.source_timeout(), Duration::from_secs(7));
    }

    #[test]
    fn test_min_samples_floor() {
        let lowered = PipelineConfig {
            min_samples: 3,
            ..Default::default()
        };
        assert!(lowered.validate().unwrap_err().to_string().contains("min_samples"));

        let raised = PipelineConfig {
            min_samples: 50,
            ..Default::default()
        };
        assert!(raised.validate().is_ok());
    }

    #[test]
    fn test_invalid_fraction_rejected() {
        let config = PipelineConfig {
            test_fraction: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
