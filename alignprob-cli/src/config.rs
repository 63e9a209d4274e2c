//! Configuration handling for the alignprob CLI
//!
//! Supports loading configuration from alignprob.toml files with CLI argument overrides.

use anyhow::{Result, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::CliError;

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "alignprob.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub classify: ClassifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default number of threads to use
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Number of reads scored per parallel batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Calibration table path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<PathBuf>,

    /// Per-base reward for a match in the aligner's scoring scheme
    #[serde(default = "default_match_score")]
    pub match_score: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyConfig {
    /// Prior belief that a placement is true before its score is seen
    #[serde(default = "default_prior")]
    pub prior: f64,

    /// Minimum posterior for a placement to be called true
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

// Default value functions
fn default_threads() -> usize { num_cpus::get() }
fn default_batch_size() -> usize { 10_000 }
fn default_match_score() -> i32 { 2 }
fn default_prior() -> f64 { 0.5 }
fn default_threshold() -> f64 { 0.5 }

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            table: None,
            match_score: default_match_score(),
        }
    }
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            prior: default_prior(),
            threshold: default_threshold(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            model: ModelConfig::default(),
            classify: ClassifyConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(path)?
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    log::info!("Loading configuration from: {}", DEFAULT_CONFIG_FILE);
                    Self::load_from_file(&default_path)?
                } else {
                    log::debug!("Using default configuration");
                    Self::default()
                }
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration file: {}", path.display()))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<(), CliError> {
        if self.model.match_score <= 0 {
            return Err(CliError::config(format!(
                "model.match_score must be positive, got {}",
                self.model.match_score
            )));
        }
        check_probability("classify.prior", self.classify.prior)?;
        check_probability("classify.threshold", self.classify.threshold)?;
        if self.general.batch_size == 0 {
            return Err(CliError::config("general.batch_size must be at least 1"));
        }
        Ok(())
    }

    /// Generate example configuration file content
    pub fn example_toml() -> Result<String> {
        toml::to_string_pretty(&Self::default())
            .context("Failed to serialize default configuration")
    }
}

/// Reject values outside [0, 1].
pub fn check_probability(name: &str, value: f64) -> Result<(), CliError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(CliError::config(format!("{} must be in [0, 1], got {}", name, value)))
    }
}
