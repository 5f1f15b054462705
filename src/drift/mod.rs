//! Data drift detection
//!
//! Compares an incoming data batch against the reference training
//! distribution, feature by feature. Numeric features use the two-sample
//! Kolmogorov-Smirnov statistic against its asymptotic critical value at the
//! configured significance level; categorical features use total variation
//! distance against a fixed threshold.
//!
//! The verdict is informational: a drift finding is reported and notified but
//! never blocks retraining on its own.

use std::fmt::Write as FmtWrite;

use serde::{Deserialize, Serialize};

use crate::dataset::{ColumnType, DatasetSnapshot, Fingerprint, Value};

/// Drift detection thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Significance level for the numeric KS test
    pub numeric_significance: f64,
    /// Total variation distance threshold for categorical features
    pub categorical_tvd_threshold: f64,
    /// Minimum reference rows needed for a meaningful comparison
    pub min_reference_rows: usize,
    /// Treat a feature present on only one side as a drift trigger
    pub fail_on_missing_features: bool,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            numeric_significance: 0.05,
            categorical_tvd_threshold: 0.2,
            min_reference_rows: 10,
            fail_on_missing_features: false,
        }
    }
}

/// Per-feature drift status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureStatus {
    Stable,
    Drift,
    MissingInReference,
    MissingInIncoming,
}

impl std::fmt::Display for FeatureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureStatus::Stable => write!(f, "stable"),
            FeatureStatus::Drift => write!(f, "DRIFT"),
            FeatureStatus::MissingInReference => write!(f, "missing_in_reference"),
            FeatureStatus::MissingInIncoming => write!(f, "missing_in_incoming"),
        }
    }
}

/// Distance score for one feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDrift {
    pub feature: String,
    pub status: FeatureStatus,
    /// KS statistic for numeric features, TVD for categorical; absent when
    /// the feature is missing on one side
    pub score: Option<f64>,
    /// Threshold the score was compared against
    pub threshold: Option<f64>,
}

/// Overall drift verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriftVerdict {
    NoDrift,
    DriftDetected,
    /// Reference too small to compare; the pipeline proceeds unverified
    InsufficientReferenceData,
}

impl std::fmt::Display for DriftVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriftVerdict::NoDrift => write!(f, "no_drift"),
            DriftVerdict::DriftDetected => write!(f, "drift_detected"),
            DriftVerdict::InsufficientReferenceData => write!(f, "insufficient_reference_data"),
        }
    }
}

/// Result of comparing two snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub verdict: DriftVerdict,
    pub features: Vec<FeatureDrift>,
    pub reference_fingerprint: Fingerprint,
    pub incoming_fingerprint: Fingerprint,
}

impl DriftReport {
    /// Features whose score exceeded their threshold
    pub fn drifted_features(&self) -> Vec<&str> {
        self.features
            .iter()
            .filter(|f| f.status == FeatureStatus::Drift)
            .map(|f| f.feature.as_str())
            .collect()
    }

    /// Human-readable report block for notifications and logs
    pub fn format_report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Drift verdict: {}", self.verdict);
        for f in &self.features {
            match (f.score, f.threshold) {
                (Some(score), Some(threshold)) => {
                    let _ = writeln!(
                        out,
                        "  {:<24} {:<22} score={:.4} threshold={:.4}",
                        f.feature, f.status, score, threshold
                    );
                }
                _ => {
                    let _ = writeln!(out, "  {:<24} {}", f.feature, f.status);
                }
            }
        }
        out
    }
}

/// Statistical comparison of incoming data against a reference distribution
#[derive(Debug, Clone, Default)]
pub struct DriftDetector {
    config: DriftConfig,
}

impl DriftDetector {
    pub fn new(config: DriftConfig) -> Self {
        Self { config }
    }

    /// Compare incoming against reference, feature by feature.
    ///
    /// The label column is excluded from the comparison. A pure function of
    /// the two snapshots: identical inputs always yield identical reports.
    pub fn detect(
        &self,
        reference: &DatasetSnapshot,
        incoming: &DatasetSnapshot,
        label_column: &str,
    ) -> DriftReport {
        if reference.n_rows() < self.config.min_reference_rows {
            return DriftReport {
                verdict: DriftVerdict::InsufficientReferenceData,
                features: Vec::new(),
                reference_fingerprint: reference.fingerprint().clone(),
                incoming_fingerprint: incoming.fingerprint().clone(),
            };
        }

        let mut features = Vec::new();
        let mut any_drift = false;

        for (ref_idx, col) in reference.schema().columns().iter().enumerate() {
            if col.name == label_column {
                continue;
            }
            let incoming_idx = incoming.schema().index_of(&col.name);
            let Some(incoming_idx) = incoming_idx else {
                features.push(FeatureDrift {
                    feature: col.name.clone(),
                    status: FeatureStatus::MissingInIncoming,
                    score: None,
                    threshold: None,
                });
                any_drift |= self.config.fail_on_missing_features;
                continue;
            };

            let (score, threshold) = match col.ty {
                ColumnType::Numeric => {
                    let a = numeric_values(reference, ref_idx);
                    let b = numeric_values(incoming, incoming_idx);
                    if a.is_empty() || b.is_empty() {
                        features.push(FeatureDrift {
                            feature: col.name.clone(),
                            status: if a.is_empty() {
                                FeatureStatus::MissingInReference
                            } else {
                                FeatureStatus::MissingInIncoming
                            },
                            score: None,
                            threshold: None,
                        });
                        any_drift |= self.config.fail_on_missing_features;
                        continue;
                    }
                    let stat = ks_statistic(&a, &b);
                    let crit = ks_critical_value(
                        self.config.numeric_significance,
                        a.len(),
                        b.len(),
                    );
                    (stat, crit)
                }
                ColumnType::Categorical => {
                    let tvd = total_variation_distance(
                        &text_values(reference, ref_idx),
                        &text_values(incoming, incoming_idx),
                    );
                    (tvd, self.config.categorical_tvd_threshold)
                }
            };

            let status = if score > threshold {
                any_drift = true;
                FeatureStatus::Drift
            } else {
                FeatureStatus::Stable
            };
            features.push(FeatureDrift {
                feature: col.name.clone(),
                status,
                score: Some(score),
                threshold: Some(threshold),
            });
        }

        // Features that only exist on the incoming side
        for col in incoming.schema().columns() {
            if col.name == label_column || reference.schema().index_of(&col.name).is_some() {
                continue;
            }
            features.push(FeatureDrift {
                feature: col.name.clone(),
                status: FeatureStatus::MissingInReference,
                score: None,
                threshold: None,
            });
            any_drift |= self.config.fail_on_missing_features;
        }

        DriftReport {
            verdict: if any_drift {
                DriftVerdict::DriftDetected
            } else {
                DriftVerdict::NoDrift
            },
            features,
            reference_fingerprint: reference.fingerprint().clone(),
            incoming_fingerprint: incoming.fingerprint().clone(),
        }
    }
}

fn numeric_values(snapshot: &DatasetSnapshot, idx: usize) -> Vec<f64> {
    snapshot
        .rows()
        .iter()
        .filter_map(|r| match r[idx] {
            Value::Number(n) if n.is_finite() => Some(n),
            _ => None,
        })
        .collect()
}

fn text_values(snapshot: &DatasetSnapshot, idx: usize) -> Vec<String> {
    snapshot
        .rows()
        .iter()
        .filter_map(|r| r[idx].as_text().map(|s| s.to_string()))
        .collect()
}

/// Two-sample Kolmogorov-Smirnov statistic: the maximum distance between
/// the empirical CDFs of the two samples.
fn ks_statistic(a: &[f64], b: &[f64]) -> f64 {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_unstable_by(|x, y| x.total_cmp(y));
    b.sort_unstable_by(|x, y| x.total_cmp(y));

    let (na, nb) = (a.len() as f64, b.len() as f64);
    let mut i = 0;
    let mut j = 0;
    let mut max_dist: f64 = 0.0;

    while i < a.len() && j < b.len() {
        let x = a[i].min(b[j]);
        while i < a.len() && a[i] <= x {
            i += 1;
        }
        while j < b.len() && b[j] <= x {
            j += 1;
        }
        let dist = (i as f64 / na - j as f64 / nb).abs();
        max_dist = max_dist.max(dist);
    }
    max_dist
}

/// Asymptotic critical value for the two-sample KS test at significance
/// alpha: c(alpha) * sqrt((n + m) / (n * m)), c(alpha) = sqrt(-ln(alpha/2)/2).
fn ks_critical_value(alpha: f64, n: usize, m: usize) -> f64 {
    let c = (-((alpha / 2.0).ln()) / 2.0).sqrt();
    let (n, m) = (n as f64, m as f64);
    c * ((n + m) / (n * m)).sqrt()
}

/// Total variation distance between two categorical frequency distributions.
fn total_variation_distance(a: &[String], b: &[String]) -> f64 {
    use std::collections::HashMap;

    fn frequencies(values: &[String]) -> HashMap<&str, f64> {
        let mut counts: HashMap<&str, f64> = HashMap::new();
        for v in values {
            *counts.entry(v.as_str()).or_insert(0.0) += 1.0;
        }
        let total = values.len().max(1) as f64;
        counts.values_mut().for_each(|c| *c /= total);
        counts
    }

    let pa = frequencies(a);
    let pb = frequencies(b);
    let mut categories: Vec<&str> = pa.keys().chain(pb.keys()).copied().collect();
    categories.sort_unstable();
    categories.dedup();

    0.5 * categories
        .iter()
        .map(|c| (pa.get(c).unwrap_or(&0.0) - pb.get(c).unwrap_or(&0.0)).abs())
        .sum::<f64>()
}
