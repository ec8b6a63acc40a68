use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{PipelineError, Result};

/// Tolerance used when checking that split ratios sum to one.
pub const RATIO_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data: DataConfig,
    pub assessment: AssessmentConfig,
    pub split: SplitConfig,
    pub bias: BiasConfig,
    pub thresholds: ThresholdConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub splits_dir: PathBuf,
    pub reports_dir: PathBuf,
    /// Used as `doc_type` for documents placed directly in `raw_dir`.
    pub default_doc_type: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            processed_dir: PathBuf::from("data/processed"),
            splits_dir: PathBuf::from("data/splits"),
            reports_dir: PathBuf::from("reports"),
            default_doc_type: "receipt".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessmentConfig {
    /// Laplacian variance that maps to a quality score of 1.0.
    pub sharpness_reference: f64,
    /// Raw Laplacian variance below which a scan is flagged as blurred.
    pub blur_variance_threshold: f64,
    /// Upper bound on documents assessed concurrently.
    pub workers: usize,
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            sharpness_reference: 1000.0,
            blur_variance_threshold: 100.0,
            workers: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub train: f64,
    pub val: f64,
    pub test: f64,
    pub seed: u64,
    /// Only split records whose receipt labels are complete. Off by default,
    /// which splits every record with complete ledger metadata.
    pub require_labels: bool,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train: 0.7,
            val: 0.15,
            test: 0.15,
            seed: 42,
            require_labels: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiasConfig {
    /// Absolute size/quality correlation above which size bias is reported.
    pub size_correlation_max: f64,
    /// Spread of per-format mean quality above which format bias is reported.
    pub format_mean_difference_max: f64,
}

impl Default for BiasConfig {
    fn default() -> Self {
        Self {
            size_correlation_max: 0.7,
            format_mean_difference_max: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub quality_score_min: f64,
    pub blur_rate_max: f64,
    pub missing_values_max: f64,
    pub duplicate_rate_max: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            quality_score_min: 0.5,
            blur_rate_max: 0.1,
            missing_values_max: 0.05,
            duplicate_rate_max: 0.02,
        }
    }
}

/// Where a resolved configuration came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: PipelineConfig,
    pub source: ConfigSource,
}

impl PipelineConfig {
    /// Resolve the configuration at `path`, falling back to the documented
    /// defaults when the file does not exist. A file that exists but fails to
    /// parse or validate is an error.
    pub fn resolve(path: &Path) -> Result<ResolvedConfig> {
        if !path.exists() {
            warn!(path = %path.display(), "Config file not found, using defaults");
            let config = PipelineConfig::default();
            config.validate()?;
            return Ok(ResolvedConfig {
                config,
                source: ConfigSource::Defaults,
            });
        }

        let config_content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config = Self::from_toml_str(&config_content)?;
        info!(path = %path.display(), "Loaded pipeline config");
        Ok(ResolvedConfig {
            config,
            source: ConfigSource::File(path.to_path_buf()),
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.split.validate()?;

        let unit_checks = [
            ("thresholds.quality_score_min", self.thresholds.quality_score_min),
            ("thresholds.blur_rate_max", self.thresholds.blur_rate_max),
            ("thresholds.missing_values_max", self.thresholds.missing_values_max),
            ("thresholds.duplicate_rate_max", self.thresholds.duplicate_rate_max),
            ("bias.size_correlation_max", self.bias.size_correlation_max),
            ("bias.format_mean_difference_max", self.bias.format_mean_difference_max),
        ];
        for (name, value) in unit_checks {
            if !(0.0..=1.0).contains(&value) {
                return Err(PipelineError::Configuration(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if self.assessment.sharpness_reference <= 0.0 {
            return Err(PipelineError::Configuration(
                "assessment.sharpness_reference must be positive".to_string(),
            ));
        }
        if self.assessment.blur_variance_threshold < 0.0 {
            return Err(PipelineError::Configuration(
                "assessment.blur_variance_threshold must not be negative".to_string(),
            ));
        }
        if self.assessment.workers == 0 {
            return Err(PipelineError::Configuration(
                "assessment.workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl SplitConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("train", self.train), ("val", self.val), ("test", self.test)] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(PipelineError::Configuration(format!(
                    "split ratio '{}' must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        let total = self.train + self.val + self.test;
        if (total - 1.0).abs() > RATIO_TOLERANCE {
            return Err(PipelineError::Configuration(format!(
                "split ratios must sum to 1, got {:.6}",
                total
            )));
        }
        Ok(())
    }
}
