//! Promotion gate
//!
//! Decides whether a freshly trained candidate replaces the incumbent model.
//! A candidate is promoted when no incumbent exists, when it improves the
//! primary metric, or when it regresses by no more than the configured
//! tolerance fraction. This keeps a noisy retrain from silently degrading
//! the deployed model while allowing small regressions that reflect the
//! larger, fresher dataset.

use serde::{Deserialize, Serialize};

use crate::eval::MetricsRecord;

/// Metric the gate compares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimaryMetric {
    /// Mean absolute error, lower is better
    Mae,
    /// Root mean squared error, lower is better
    Rmse,
    /// Coefficient of determination, higher is better
    R2,
}

impl PrimaryMetric {
    pub fn value_of(&self, metrics: &MetricsRecord) -> f64 {
        match self {
            PrimaryMetric::Mae => metrics.mae,
            PrimaryMetric::Rmse => metrics.rmse,
            PrimaryMetric::R2 => metrics.r2,
        }
    }

    pub fn lower_is_better(&self) -> bool {
        !matches!(self, PrimaryMetric::R2)
    }

    pub fn name(&self) -> &'static str {
        match self {
            PrimaryMetric::Mae => "mae",
            PrimaryMetric::Rmse => "rmse",
            PrimaryMetric::R2 => "r2",
        }
    }
}

/// Gate thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromotionConfig {
    pub primary_metric: PrimaryMetric,
    /// Maximum tolerated relative regression, as a fraction (0.05 = 5%)
    pub tolerance: f64,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            primary_metric: PrimaryMetric::Mae,
            tolerance: 0.05,
        }
    }
}

/// Gate verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Promote,
    Reject,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Promote => write!(f, "promote"),
            Verdict::Reject => write!(f, "reject"),
        }
    }
}

/// Outcome of the gate, with the rule that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionDecision {
    pub verdict: Verdict,
    pub candidate: MetricsRecord,
    pub incumbent: Option<MetricsRecord>,
    /// Human-readable statement of the applied rule
    pub rule: String,
}

/// Compare candidate metrics against the incumbent's and decide.
///
/// Absent incumbent always promotes. Otherwise the relative regression of
/// the primary metric is computed and compared against the tolerance.
pub fn decide(
    candidate: &MetricsRecord,
    incumbent: Option<&MetricsRecord>,
    config: &PromotionConfig,
) -> PromotionDecision {
    let metric = config.primary_metric;
    let Some(incumbent) = incumbent else {
        return PromotionDecision {
            verdict: Verdict::Promote,
            candidate: candidate.clone(),
            incumbent: None,
            rule: "no incumbent model; first candidate always promotes".to_string(),
        };
    };

    let cand = metric.value_of(candidate);
    let inc = metric.value_of(incumbent);

    // Relative regression: positive means the candidate is worse. An
    // exact-zero incumbent only tolerates an exact-zero candidate.
    let denom = inc.abs().max(1e-12);
    let regression = if metric.lower_is_better() {
        (cand - inc) / denom
    } else {
        (inc - cand) / denom
    };

    let verdict = if regression <= config.tolerance {
        Verdict::Promote
    } else {
        Verdict::Reject
    };

    let rule = format!(
        "{} {:.4} vs incumbent {:.4}: relative regression {:+.2}% (tolerance {:.2}%)",
        metric.name(),
        cand,
        inc,
        regression * 100.0,
        config.tolerance * 100.0
    );

    PromotionDecision {
        verdict,
        candidate: candidate.clone(),
        incumbent: Some(incumbent.clone()),
        rule,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DatasetSnapshot, Fingerprint};

    fn record(mae: f64, rmse: f64, r2: f64) -> MetricsRecord {
        let snap = DatasetSnapshot::parse_csv("x\n1\n").unwrap();
        MetricsRecord {
            mae,
            rmse,
            r2,
            snapshot_fingerprint: snap.fingerprint().clone(),
            evaluated_at: chrono::Utc::now(),
            n_holdout_rows: 10,
        }
    }

    fn fingerprint_of(rec: &MetricsRecord) -> &Fingerprint {
        &rec.snapshot_fingerprint
    }

    #[test]
    fn test_no_incumbent_always_promotes() {
        let candidate = record(100.0, 120.0, 0.1);
        let decision = decide(&candidate, None, &PromotionConfig::default());
        assert_eq!(decision.verdict, Verdict::Promote);
        assert!(decision.incumbent.is_none());
        assert!(decision.rule.contains("no incumbent"));
    }

    #[test]
    fn test_strictly_better_promotes() {
        let candidate = record(4.0, 5.0, 0.9);
        let incumbent = record(5.0, 6.0, 0.8);
        let decision = decide(&candidate, Some(&incumbent), &PromotionConfig::default());
        assert_eq!(decision.verdict, Verdict::Promote);
    }

    #[test]
    fn test_small_regression_within_tolerance_promotes() {
        // 5.10 vs 5.00 at 5% tolerance: 2% regression
        let candidate = record(5.10, 6.0, 0.8);
        let incumbent = record(5.00, 6.0, 0.8);
        let decision = decide(&candidate, Some(&incumbent), &PromotionConfig::default());
        assert_eq!(decision.verdict, Verdict::Promote);
        assert!(decision.rule.contains("+2.00%"));
    }

    #[test]
    fn test_large_regression_rejects() {
        // 6.00 vs 5.00 at 5% tolerance: 20% regression
        let candidate = record(6.00, 7.0, 0.7);
        let incumbent = record(5.00, 6.0, 0.8);
        let decision = decide(&candidate, Some(&incumbent), &PromotionConfig::default());
        assert_eq!(decision.verdict, Verdict::Reject);
        assert!(decision.rule.contains("+20.00%"));
    }

    #[test]
    fn test_regression_at_exact_tolerance_promotes() {
        let candidate = record(5.25, 6.0, 0.8);
        let incumbent = record(5.00, 6.0, 0.8);
        let decision = decide(&candidate, Some(&incumbent), &PromotionConfig::default());
        assert_eq!(decision.verdict, Verdict::Promote);
    }

    #[test]
    fn test_higher_is_better_metric() {
        let config = PromotionConfig {
            primary_metric: PrimaryMetric::R2,
            tolerance: 0.05,
        };
        let candidate = record(5.0, 6.0, 0.70);
        let incumbent = record(5.0, 6.0, 0.80);
        // (0.80 - 0.70) / 0.80 = 12.5% regression
        let decision = decide(&candidate, Some(&incumbent), &config);
        assert_eq!(decision.verdict, Verdict::Reject);

        let candidate = record(5.0, 6.0, 0.79);
        // 1.25% regression, within tolerance
        let decision = decide(&candidate, Some(&incumbent), &config);
        assert_eq!(decision.verdict, Verdict::Promote);
    }

    #[test]
    fn test_zero_incumbent_metric() {
        let candidate = record(0.5, 1.0, 0.9);
        let incumbent = record(0.0, 0.0, 1.0);
        let decision = decide(&candidate, Some(&incumbent), &PromotionConfig::default());
        assert_eq!(decision.verdict, Verdict::Reject);

        let candidate = record(0.0, 0.0, 1.0);
        let decision = decide(&candidate, Some(&incumbent), &PromotionConfig::default());
        assert_eq!(decision.verdict, Verdict::Promote);
    }

    #[test]
    fn test_decision_preserves_records() {
        let candidate = record(4.0, 5.0, 0.9);
        let incumbent = record(5.0, 6.0, 0.8);
        let decision = decide(&candidate, Some(&incumbent), &PromotionConfig::default());
        assert_eq!(
            fingerprint_of(&decision.candidate),
            fingerprint_of(&candidate)
        );
        assert_eq!(
            decision.incumbent.as_ref().map(fingerprint_of),
            Some(fingerprint_of(&incumbent))
        );
    }
}
