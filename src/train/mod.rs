//! Model training
//!
//! The concrete training algorithm is a capability behind the `Trainer`
//! trait: features and labels in, fitted artifact out. The bundled
//! `LinearRegressionTrainer` fits ordinary least squares via the normal
//! equations with a small ridge term for conditioning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dataset::Fingerprint;
use crate::error::{Error, Result};
use crate::preprocess::{FeatureManifest, FeatureTable};

/// A fitted linear model: one weight per encoded feature plus an intercept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub weights: Vec<f64>,
    pub intercept: f64,
}

impl LinearModel {
    /// Predict the label for one encoded feature vector
    pub fn predict(&self, features: &[f64]) -> f64 {
        self.intercept
            + self
                .weights
                .iter()
                .zip(features)
                .map(|(w, x)| w * x)
                .sum::<f64>()
    }
}

/// A fitted model together with the feature manifest it was fit on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub model: LinearModel,
    pub manifest: FeatureManifest,
    /// Fingerprint of the snapshot the feature table was derived from
    pub trained_on: Fingerprint,
    pub trained_at: DateTime<Utc>,
    pub n_training_rows: usize,
}

impl ModelArtifact {
    /// Predict labels for every row of an encoded feature table
    pub fn predict_table(&self, table: &FeatureTable) -> Vec<f64> {
        table.rows.iter().map(|r| self.model.predict(r)).collect()
    }
}

/// Training capability: features and labels in, fitted artifact out
pub trait Trainer {
    fn fit(&self, features: &FeatureTable) -> Result<ModelArtifact>;
}

/// Ordinary least squares via the normal equations.
///
/// Solves (X'X + ridge*I) w = X'y with Gaussian elimination and partial
/// pivoting; the ridge term keeps near-collinear one-hot blocks solvable.
#[derive(Debug, Clone)]
pub struct LinearRegressionTrainer {
    ridge: f64,
}

impl Default for LinearRegressionTrainer {
    fn default() -> Self {
        Self { ridge: 1e-8 }
    }
}

impl LinearRegressionTrainer {
    pub fn new(ridge: f64) -> Self {
        Self { ridge }
    }
}

impl Trainer for LinearRegressionTrainer {
    fn fit(&self, features: &FeatureTable) -> Result<ModelArtifact> {
        let n = features.n_rows();
        let d = features.n_features();
        if n == 0 {
            return Err(Error::Training("no training rows".to_string()));
        }
        if features
            .rows
            .iter()
            .flatten()
            .chain(features.labels.iter())
            .any(|v| !v.is_finite())
        {
            return Err(Error::Training(
                "non-finite value in feature table".to_string(),
            ));
        }

        // Augment with an intercept column at the end
        let dim = d + 1;
        let mut ata = vec![vec![0.0; dim]; dim];
        let mut aty = vec![0.0; dim];

        for (row, &y) in features.rows.iter().zip(&features.labels) {
            for i in 0..dim {
                let xi = if i < d { row[i] } else { 1.0 };
                aty[i] += xi * y;
                for j in i..dim {
                    let xj = if j < d { row[j] } else { 1.0 };
                    ata[i][j] += xi * xj;
                }
            }
        }
        // Mirror the upper triangle and apply ridge damping
        for i in 0..dim {
            for j in 0..i {
                ata[i][j] = ata[j][i];
            }
            ata[i][i] += self.ridge;
        }

        let solution = solve(ata, aty)?;
        if solution.iter().any(|v| !v.is_finite()) {
            return Err(Error::Training(
                "solver produced non-finite coefficients".to_string(),
            ));
        }

        let (weights, intercept) = (solution[..d].to_vec(), solution[d]);
        Ok(ModelArtifact {
            model: LinearModel { weights, intercept },
            manifest: features.manifest.clone(),
            trained_on: features.source_fingerprint.clone(),
            trained_at: Utc::now(),
            n_training_rows: n,
        })
    }
}

/// Gaussian elimination with partial pivoting
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .ok_or_else(|| Error::Training("empty system".to_string()))?;
        if a[pivot][col].abs() < 1e-12 {
            return Err(Error::Training("singular normal equations".to_string()));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut sum = b[row];
        for k in (row + 1)..n {
            sum -= a[row][k] * x[k];
        }
        x[row] = sum / a[row][row];
    }
    Ok(x)
}
