//! Pipeline configuration
//!
//! YAML-backed configuration covering every tunable surface of the pipeline:
//! label column, drift thresholds, preprocessing minimums, holdout split,
//! promotion gate, and the optional state directory for persistence. Every
//! field has a default, so an empty document is a valid configuration.
//!
//! ```yaml
//! label_column: salary
//! state_dir: ./state
//! drift:
//!   numeric_significance: 0.05
//!   categorical_tvd_threshold: 0.2
//! split:
//!   ratio: 0.2
//!   seed: 42
//! promotion:
//!   primary_metric: mae
//!   tolerance: 0.05
//! ```

pub mod cli;

pub use cli::{apply_overrides, parse_args, Cli, Command, DriftArgs, InfoArgs, RunArgs, ValidateArgs};

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::drift::DriftConfig;
use crate::error::{Error, Result};
use crate::eval::SplitConfig;
use crate::preprocess::PreprocessConfig;
use crate::promote::PromotionConfig;

/// Root configuration for one pipeline deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Name of the prediction target column
    pub label_column: String,
    pub drift: DriftConfig,
    pub preprocess: PreprocessConfig,
    pub split: SplitConfig,
    pub promotion: PromotionConfig,
    /// Directory for persisted deployed state; in-memory only when absent
    pub state_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            label_column: "salary".to_string(),
            drift: DriftConfig::default(),
            preprocess: PreprocessConfig::default(),
            split: SplitConfig::default(),
            promotion: PromotionConfig::default(),
            state_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Parse a configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Check field-level constraints
    pub fn validate(&self) -> Result<()> {
        if self.label_column.trim().is_empty() {
            return Err(Error::Config("label_column must not be empty".to_string()));
        }
        if !(0.0..1.0).contains(&self.split.ratio) || self.split.ratio <= 0.0 {
            return Err(Error::Config(format!(
                "split.ratio must be in (0, 1), got {}",
                self.split.ratio
            )));
        }
        if self.promotion.tolerance < 0.0 {
            return Err(Error::Config(format!(
                "promotion.tolerance must be >= 0, got {}",
                self.promotion.tolerance
            )));
        }
        if self.drift.numeric_significance <= 0.0 || self.drift.numeric_significance >= 1.0 {
            return Err(Error::Config(format!(
                "drift.numeric_significance must be in (0, 1), got {}",
                self.drift.numeric_significance
            )));
        }
        if !(0.0..=1.0).contains(&self.drift.categorical_tvd_threshold) {
            return Err(Error::Config(format!(
                "drift.categorical_tvd_threshold must be in [0, 1], got {}",
                self.drift.categorical_tvd_threshold
            )));
        }
        if self.drift.min_reference_rows == 0 {
            return Err(Error::Config(
                "drift.min_reference_rows must be >= 1".to_string(),
            ));
        }
        if self.preprocess.min_training_rows == 0 {
            return Err(Error::Config(
                "preprocess.min_training_rows must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promote::PrimaryMetric;

    #[test]
    fn test_empty_document_is_valid() {
        let config = PipelineConfig::from_yaml("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.label_column, "salary");
    }

    #[test]
    fn test_full_document_roundtrip() {
        let yaml = r#"
label_column: price
state_dir: ./state
drift:
  numeric_significance: 0.01
  categorical_tvd_threshold: 0.3
  min_reference_rows: 50
  fail_on_missing_features: true
preprocess:
  min_training_rows: 25
split:
  ratio: 0.25
  seed: 7
promotion:
  primary_metric: rmse
  tolerance: 0.1
"#;
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.label_column, "price");
        assert_eq!(config.state_dir, Some(PathBuf::from("./state")));
        assert_eq!(config.drift.min_reference_rows, 50);
        assert!(config.drift.fail_on_missing_features);
        assert_eq!(config.preprocess.min_training_rows, 25);
        assert_eq!(config.split.seed, 7);
        assert_eq!(config.promotion.primary_metric, PrimaryMetric::Rmse);
        assert!((config.promotion.tolerance - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let config = PipelineConfig::from_yaml("label_column: income\n").unwrap();
        assert_eq!(config.label_column, "income");
        assert_eq!(config.split, SplitConfig::default());
        assert_eq!(config.promotion, PromotionConfig::default());
    }

    #[test]
    fn test_invalid_split_ratio_rejected() {
        for ratio in ["0.0", "1.0", "1.5", "-0.2"] {
            let yaml = format!("split:\n  ratio: {ratio}\n");
            let err = PipelineConfig::from_yaml(&yaml).unwrap_err();
            assert_eq!(err.kind(), "ConfigError");
        }
    }

    #[test]
    fn test_negative_tolerance_rejected() {
        let err = PipelineConfig::from_yaml("promotion:\n  tolerance: -0.01\n").unwrap_err();
        assert!(err.to_string().contains("tolerance"));
    }

    #[test]
    fn test_empty_label_rejected() {
        let err = PipelineConfig::from_yaml("label_column: \"  \"\n").unwrap_err();
        assert!(err.to_string().contains("label_column"));
    }

    #[test]
    fn test_invalid_significance_rejected() {
        let err =
            PipelineConfig::from_yaml("drift:\n  numeric_significance: 1.0\n").unwrap_err();
        assert!(err.to_string().contains("numeric_significance"));
    }

    #[test]
    fn test_malformed_yaml_rejected() {
        let err = PipelineConfig::from_yaml("label_column: [not closed\n").unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
    }

    #[test]
    fn test_unknown_metric_rejected() {
        let err =
            PipelineConfig::from_yaml("promotion:\n  primary_metric: accuracy\n").unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
    }
}
