//! Preprocessing: cleaning, imputation, and feature encoding
//!
//! Transforms a candidate snapshot into a model-ready feature table. Rows
//! with a missing label are dropped and duplicates removed by canonical row
//! key. Missing numerics are imputed with the column median, missing
//! categoricals with the column mode; both statistics are computed from the
//! candidate itself so every run is reproducible from its own data. Categoricals are one-hot
//! encoded and numerics standardized; the exact category list and scaling
//! statistics are recorded in the `FeatureManifest` so inference-time
//! preprocessing can reproduce the encoding bit for bit.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::dataset::{row_key, ColumnType, DatasetSnapshot, Fingerprint, Row, Schema, Value};
use crate::error::{Error, Result};

/// Preprocessing thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Minimum usable rows after cleaning
    pub min_training_rows: usize,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            min_training_rows: 10,
        }
    }
}

/// Encoding recorded for one source column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureEncoding {
    /// Standardized numeric: (value - mean) / std, median-imputed
    Numeric { median: f64, mean: f64, std: f64 },
    /// One-hot over the recorded category list, mode-imputed; categories
    /// unseen at fit time encode to all zeros
    OneHot { categories: Vec<String>, mode: String },
}

/// One source column and how it was encoded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub column: String,
    pub encoding: FeatureEncoding,
}

/// The exact feature list and encodings a model was fit on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureManifest {
    pub features: Vec<FeatureSpec>,
    pub label_column: String,
    /// Expanded output column names, in encoded order
    pub output_names: Vec<String>,
}

impl FeatureManifest {
    /// Encode one raw row into the fit-time feature vector.
    ///
    /// Reproduces the training-time encoding exactly: same imputation values,
    /// same category order, same scaling statistics.
    pub fn encode_row(&self, schema: &Schema, row: &Row) -> Result<Vec<f64>> {
        let mut encoded = Vec::with_capacity(self.output_names.len());
        for spec in &self.features {
            let idx = schema
                .index_of(&spec.column)
                .ok_or_else(|| Error::ColumnNotFound(spec.column.clone()))?;
            match &spec.encoding {
                FeatureEncoding::Numeric { median, mean, std } => {
                    let raw = match row[idx] {
                        Value::Number(n) if n.is_finite() => n,
                        _ => *median,
                    };
                    encoded.push((raw - mean) / std);
                }
                FeatureEncoding::OneHot { categories, mode } => {
                    let observed = row[idx].as_text().unwrap_or(mode);
                    for cat in categories {
                        encoded.push(if cat == observed { 1.0 } else { 0.0 });
                    }
                }
            }
        }
        Ok(encoded)
    }
}

/// Model-ready feature table: encoded rows plus labels and provenance
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    pub feature_names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub labels: Vec<f64>,
    /// Canonical row keys of the source rows, for split disjointness
    pub row_keys: Vec<String>,
    pub manifest: FeatureManifest,
    pub source_fingerprint: Fingerprint,
}

impl FeatureTable {
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }
}

/// Cleans and encodes a candidate snapshot
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// Transform a candidate snapshot into a feature table.
    ///
    /// Cleaning drops rows with a missing label and deduplicates rows by
    /// canonical row key, so each key appears at most once downstream. Fails
    /// with `DataQuality` if the label column is not numeric, contains
    /// non-finite values, or fewer than the configured minimum rows survive
    /// cleaning.
    pub fn transform(
        &self,
        candidate: &DatasetSnapshot,
        label_column: &str,
    ) -> Result<FeatureTable> {
        let schema = candidate.schema();
        let label_idx = schema
            .index_of(label_column)
            .ok_or_else(|| Error::ColumnNotFound(label_column.to_string()))?;
        if schema.columns()[label_idx].ty != ColumnType::Numeric {
            return Err(Error::DataQuality(format!(
                "label column '{label_column}' is not numeric"
            )));
        }

        // Drop rows with a missing label and duplicate rows by canonical key
        // (merge dedups, but a cold-start candidate arrives unmerged); a
        // present but non-finite label is a hard data quality failure.
        let mut kept: Vec<&Row> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for row in candidate.rows() {
            match row[label_idx] {
                Value::Missing => continue,
                Value::Number(n) if n.is_finite() => {
                    if seen.insert(row_key(row)) {
                        kept.push(row);
                    }
                }
                _ => {
                    return Err(Error::DataQuality(format!(
                        "label column '{label_column}' contains a non-finite value"
                    )))
                }
            }
        }

        if kept.len() < self.config.min_training_rows {
            return Err(Error::DataQuality(format!(
                "{} usable rows after cleaning, {} required",
                kept.len(),
                self.config.min_training_rows
            )));
        }

        // Per-column imputation and encoding statistics, from the candidate only
        let mut features = Vec::new();
        let mut output_names = Vec::new();
        for (idx, col) in schema.columns().iter().enumerate() {
            if idx == label_idx {
                continue;
            }
            match col.ty {
                ColumnType::Numeric => {
                    let values: Vec<f64> = kept
                        .iter()
                        .filter_map(|r| match r[idx] {
                            Value::Number(n) if n.is_finite() => Some(n),
                            _ => None,
                        })
                        .collect();
                    let median = median(&values);
                    let mean = mean(&values);
                    let std = std_dev(&values, mean);
                    output_names.push(col.name.clone());
                    features.push(FeatureSpec {
                        column: col.name.clone(),
                        encoding: FeatureEncoding::Numeric {
                            median,
                            mean,
                            std: if std > 0.0 { std } else { 1.0 },
                        },
                    });
                }
                ColumnType::Categorical => {
                    let values: Vec<&str> =
                        kept.iter().filter_map(|r| r[idx].as_text()).collect();
                    let (categories, mode) = categories_and_mode(&values);
                    for cat in &categories {
                        output_names.push(format!("{}={}", col.name, cat));
                    }
                    features.push(FeatureSpec {
                        column: col.name.clone(),
                        encoding: FeatureEncoding::OneHot { categories, mode },
                    });
                }
            }
        }

        let manifest = FeatureManifest {
            features,
            label_column: label_column.to_string(),
            output_names: output_names.clone(),
        };

        let mut rows = Vec::with_capacity(kept.len());
        let mut labels = Vec::with_capacity(kept.len());
        let mut row_keys = Vec::with_capacity(kept.len());
        for row in &kept {
            rows.push(manifest.encode_row(schema, row)?);
            labels.push(match row[label_idx] {
                Value::Number(n) => n,
                _ => unreachable!("missing labels were dropped above"),
            });
            row_keys.push(row_key(row));
        }

        Ok(FeatureTable {
            feature_names: output_names,
            rows,
            labels,
            row_keys,
            manifest,
            source_fingerprint: candidate.fingerprint().clone(),
        })
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Sorted distinct categories plus the mode (ties broken lexicographically)
fn categories_and_mode(values: &[&str]) -> (Vec<String>, String) {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for v in values {
        *counts.entry(v).or_insert(0) += 1;
    }
    let mut categories: Vec<String> = counts.keys().map(|s| s.to_string()).collect();
    categories.sort_unstable();
    // Scanning the sorted list with a strict comparison keeps the
    // lexicographically smallest category on a count tie
    let mut mode = String::new();
    let mut best = 0;
    for cat in &categories {
        let count = counts.get(cat.as_str()).copied().unwrap_or(0);
        if count > best {
            best = count;
            mode = cat.clone();
        }
    }
    (categories, mode)
}
