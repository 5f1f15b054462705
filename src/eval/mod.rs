//! Model evaluation
//!
//! A deterministic, seeded holdout split plus regression accuracy metrics
//! (MAE, RMSE, R²). The split shuffles row indices with a seeded `StdRng`
//! so the same candidate snapshot, seed, and ratio always yield the same
//! train/holdout partition, disjoint by row key.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::dataset::Fingerprint;
use crate::error::{Error, Result};
use crate::preprocess::FeatureTable;
use crate::train::ModelArtifact;

/// Holdout split parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Fraction of rows held out for evaluation
    pub ratio: f64,
    /// Seed for the deterministic shuffle
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            ratio: 0.2,
            seed: 42,
        }
    }
}

/// Accuracy metrics for one model against one evaluation split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
    /// Fingerprint of the snapshot the metrics were computed on
    pub snapshot_fingerprint: Fingerprint,
    pub evaluated_at: DateTime<Utc>,
    pub n_holdout_rows: usize,
}

/// Split a feature table into (train, holdout) deterministically.
///
/// The holdout takes `round(n * ratio)` rows (at least one when `n > 1`);
/// the partition is disjoint by construction since each row index lands on
/// exactly one side.
pub fn holdout_split(table: &FeatureTable, config: &SplitConfig) -> (FeatureTable, FeatureTable) {
    let n = table.n_rows();
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = rand::rngs::StdRng::seed_from_u64(config.seed);
    indices.shuffle(&mut rng);

    let mut holdout_count = (n as f64 * config.ratio).round() as usize;
    if n > 1 {
        holdout_count = holdout_count.clamp(1, n - 1);
    } else {
        holdout_count = 0;
    }

    let (holdout_idx, train_idx) = indices.split_at(holdout_count);
    (subset(table, train_idx), subset(table, holdout_idx))
}

fn subset(table: &FeatureTable, indices: &[usize]) -> FeatureTable {
    FeatureTable {
        feature_names: table.feature_names.clone(),
        rows: indices.iter().map(|&i| table.rows[i].clone()).collect(),
        labels: indices.iter().map(|&i| table.labels[i]).collect(),
        row_keys: indices.iter().map(|&i| table.row_keys[i].clone()).collect(),
        manifest: table.manifest.clone(),
        source_fingerprint: table.source_fingerprint.clone(),
    }
}

/// Evaluate a fitted model against a holdout split.
///
/// Fails with `Evaluation` if the holdout is empty.
pub fn evaluate(model: &ModelArtifact, holdout: &FeatureTable) -> Result<MetricsRecord> {
    if holdout.n_rows() == 0 {
        return Err(Error::Evaluation("holdout set is empty".to_string()));
    }

    let predictions = model.predict_table(holdout);
    let n = holdout.n_rows() as f64;

    let mae = predictions
        .iter()
        .zip(&holdout.labels)
        .map(|(p, y)| (p - y).abs())
        .sum::<f64>()
        / n;

    let mse = predictions
        .iter()
        .zip(&holdout.labels)
        .map(|(p, y)| (p - y).powi(2))
        .sum::<f64>()
        / n;
    let rmse = mse.sqrt();

    let label_mean = holdout.labels.iter().sum::<f64>() / n;
    let ss_tot = holdout
        .labels
        .iter()
        .map(|y| (y - label_mean).powi(2))
        .sum::<f64>();
    let ss_res = mse * n;
    let r2 = if ss_tot > f64::EPSILON {
        1.0 - ss_res / ss_tot
    } else if ss_res <= f64::EPSILON {
        1.0
    } else {
        0.0
    };

    Ok(MetricsRecord {
        mae,
        rmse,
        r2,
        snapshot_fingerprint: holdout.source_fingerprint.clone(),
        evaluated_at: Utc::now(),
        n_holdout_rows: holdout.n_rows(),
    })
}
