//! Pipeline orchestration
//!
//! Sequences the retraining stages, owns run state, and enforces the
//! fail-fast versus fail-soft policy per stage:
//!
//! ```text
//! INIT → FINGERPRINTING → DRIFT_CHECK → MERGING → PREPROCESSING
//!      → TRAINING → EVALUATING → PROMOTION_DECISION → NOTIFYING
//!      → {PROMOTED, REJECTED, FAILED, SKIPPED}
//! ```
//!
//! `MERGING` through `EVALUATING` are fail-fast; a drift-check soft failure
//! (insufficient reference data) degrades to proceed-unverified. Notification
//! is the one stage always attempted on any terminal path, and a delivery
//! failure never changes the run's terminal classification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::dataset::{merge, DatasetSnapshot, Fingerprint};
use crate::drift::{DriftDetector, DriftReport};
use crate::error::{Error, Result};
use crate::eval::{evaluate, holdout_split};
use crate::notify::{render_report, DeliveryResult, Notifier};
use crate::preprocess::Preprocessor;
use crate::promote::{decide, PromotionDecision, Verdict};
use crate::registry::{DeployedState, ModelRegistry, RunOutcome};
use crate::train::Trainer;

/// Stages of one pipeline run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PipelineStage {
    Init,
    Fingerprinting,
    DriftCheck,
    Merging,
    Preprocessing,
    Training,
    Evaluating,
    PromotionDecision,
    Notifying,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineStage::Init => "init",
            PipelineStage::Fingerprinting => "fingerprinting",
            PipelineStage::DriftCheck => "drift_check",
            PipelineStage::Merging => "merging",
            PipelineStage::Preprocessing => "preprocessing",
            PipelineStage::Training => "training",
            PipelineStage::Evaluating => "evaluating",
            PipelineStage::PromotionDecision => "promotion_decision",
            PipelineStage::Notifying => "notifying",
        };
        write!(f, "{name}")
    }
}

/// Error captured on a failed run: kind plus message, for the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageError {
    pub kind: String,
    pub message: String,
}

impl From<&Error> for StageError {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// One finalized pipeline execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingRun {
    /// Trigger fingerprint prefix + start timestamp
    pub id: String,
    pub input_fingerprint: Option<Fingerprint>,
    /// Furthest stage the run entered
    pub stage_reached: PipelineStage,
    pub outcome: RunOutcome,
    pub drift: Option<DriftReport>,
    pub decision: Option<PromotionDecision>,
    pub error: Option<StageError>,
    pub skip_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Delivery result of the terminal notification
    pub notification: Option<DeliveryResult>,
}

enum Progress {
    Skipped(String),
    Finished {
        outcome: RunOutcome,
        decision: PromotionDecision,
    },
}

/// Sequences the retraining stages against a shared registry
pub struct PipelineOrchestrator<T: Trainer, N: Notifier> {
    config: PipelineConfig,
    registry: Arc<ModelRegistry>,
    trainer: T,
    notifier: N,
}

impl<T: Trainer, N: Notifier> PipelineOrchestrator<T, N> {
    pub fn new(
        config: PipelineConfig,
        registry: Arc<ModelRegistry>,
        trainer: T,
        notifier: N,
    ) -> Self {
        Self {
            config,
            registry,
            trainer,
            notifier,
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Execute one pipeline run.
    ///
    /// The only contract with the caller: new data (or `None` to retrain the
    /// current reference under `force`) plus the force flag. Returns the
    /// finalized run for every terminal state; the sole error path is
    /// `RunAlreadyInProgress` when another run holds the lock, in which case
    /// no stage is attempted.
    pub fn run(&self, new_data: Option<DatasetSnapshot>, force: bool) -> Result<TrainingRun> {
        let _guard = self.registry.try_acquire_run()?;
        let started_at = Utc::now();

        // Resolve the trigger snapshot
        let trigger = match new_data {
            Some(snapshot) => snapshot,
            None if force => match self.registry.deployed() {
                Some(deployed) => deployed.reference.clone(),
                None => {
                    let run = TrainingRun {
                        id: format!("no-input-{}", started_at.format("%Y%m%d%H%M%S")),
                        input_fingerprint: None,
                        stage_reached: PipelineStage::Init,
                        outcome: RunOutcome::Failed,
                        drift: None,
                        decision: None,
                        error: Some(StageError {
                            kind: "DataQualityError".to_string(),
                            message: "forced run without new data or a reference dataset"
                                .to_string(),
                        }),
                        skip_reason: None,
                        started_at,
                        finished_at: Utc::now(),
                        notification: None,
                    };
                    return Ok(self.notify(run));
                }
            },
            None => {
                let run = TrainingRun {
                    id: format!("no-input-{}", started_at.format("%Y%m%d%H%M%S")),
                    input_fingerprint: None,
                    stage_reached: PipelineStage::Fingerprinting,
                    outcome: RunOutcome::Skipped,
                    drift: None,
                    decision: None,
                    error: None,
                    skip_reason: Some("no new data arrived".to_string()),
                    started_at,
                    finished_at: Utc::now(),
                    notification: None,
                };
                return Ok(self.notify(run));
            }
        };

        let mut stage = PipelineStage::Fingerprinting;
        let fingerprint = trigger.fingerprint().clone();
        let run_id = format!(
            "{}-{}",
            fingerprint.short(),
            started_at.format("%Y%m%d%H%M%S")
        );

        // Idempotency guard: an already-finalized identical trigger
        // short-circuits unless forced.
        if !force {
            if let Some(previous) = self.registry.finalized_outcome(&fingerprint) {
                let run = TrainingRun {
                    id: run_id,
                    input_fingerprint: Some(fingerprint),
                    stage_reached: stage,
                    outcome: RunOutcome::Skipped,
                    drift: None,
                    decision: None,
                    error: None,
                    skip_reason: Some(format!(
                        "identical input already finalized as {previous}; use force to re-run"
                    )),
                    started_at,
                    finished_at: Utc::now(),
                    notification: None,
                };
                return Ok(self.notify(run));
            }
        }

        let mut drift = None;
        let result = self.execute(&trigger, force, &mut stage, &mut drift);

        let run = match result {
            Ok(Progress::Skipped(reason)) => TrainingRun {
                id: run_id,
                input_fingerprint: Some(fingerprint),
                stage_reached: stage,
                outcome: RunOutcome::Skipped,
                drift,
                decision: None,
                error: None,
                skip_reason: Some(reason),
                started_at,
                finished_at: Utc::now(),
                notification: None,
            },
            Ok(Progress::Finished { outcome, decision }) => {
                if let Err(err) = self.registry.record_outcome(&fingerprint, outcome) {
                    // History persistence is advisory; the run outcome stands
                    eprintln!("warning: failed to record run history: {err}");
                }
                TrainingRun {
                    id: run_id,
                    input_fingerprint: Some(fingerprint),
                    stage_reached: stage,
                    outcome,
                    drift,
                    decision: Some(decision),
                    error: None,
                    skip_reason: None,
                    started_at,
                    finished_at: Utc::now(),
                    notification: None,
                }
            }
            Err(err) => {
                if let Err(record_err) =
                    self.registry.record_outcome(&fingerprint, RunOutcome::Failed)
                {
                    eprintln!("warning: failed to record run history: {record_err}");
                }
                TrainingRun {
                    id: run_id,
                    input_fingerprint: Some(fingerprint),
                    stage_reached: stage,
                    outcome: RunOutcome::Failed,
                    drift,
                    decision: None,
                    error: Some(StageError::from(&err)),
                    skip_reason: None,
                    started_at,
                    finished_at: Utc::now(),
                    notification: None,
                }
            }
        };

        Ok(self.notify(run))
    }

    /// Fail-fast stage sequence from drift check through the promotion
    /// decision. The caller maps an `Err` to the `Failed` terminal state.
    fn execute(
        &self,
        trigger: &DatasetSnapshot,
        force: bool,
        stage: &mut PipelineStage,
        drift: &mut Option<DriftReport>,
    ) -> Result<Progress> {
        let label = self.config.label_column.as_str();
        let deployed = self.registry.deployed();

        *stage = PipelineStage::DriftCheck;
        if let Some(deployed) = &deployed {
            let detector = DriftDetector::new(self.config.drift.clone());
            *drift = Some(detector.detect(&deployed.reference, trigger, label));
        }
        // No deployed reference, or an insufficient one: proceed unverified.
        // Drift never blocks retraining on its own.

        *stage = PipelineStage::Merging;
        let candidate = match &deployed {
            Some(deployed) => {
                let candidate = merge(&deployed.reference, trigger, label)?;
                if candidate.fingerprint() == deployed.reference.fingerprint() && !force {
                    return Ok(Progress::Skipped(
                        "incoming batch contributed no new rows; retraining would be a no-op"
                            .to_string(),
                    ));
                }
                candidate
            }
            None => trigger.clone(),
        };

        *stage = PipelineStage::Preprocessing;
        let preprocessor = Preprocessor::new(self.config.preprocess.clone());
        let table = preprocessor.transform(&candidate, label)?;
        let (train, holdout) = holdout_split(&table, &self.config.split);

        *stage = PipelineStage::Training;
        let artifact = self.trainer.fit(&train)?;

        *stage = PipelineStage::Evaluating;
        let metrics = evaluate(&artifact, &holdout)?;

        *stage = PipelineStage::PromotionDecision;
        let incumbent = deployed.as_ref().map(|d| &d.metrics);
        let decision = decide(&metrics, incumbent, &self.config.promotion);

        let outcome = match decision.verdict {
            Verdict::Promote => {
                // Atomic swap of the (model, reference) pair
                self.registry.promote(DeployedState {
                    artifact,
                    metrics,
                    reference: candidate,
                })?;
                RunOutcome::Promoted
            }
            Verdict::Reject => RunOutcome::Rejected,
        };

        Ok(Progress::Finished { outcome, decision })
    }

    /// Always-attempted terminal notification; best effort by contract.
    fn notify(&self, mut run: TrainingRun) -> TrainingRun {
        // A failed or skipped run keeps the stage it stopped at in the report
        if run.error.is_none() && run.skip_reason.is_none() {
            run.stage_reached = PipelineStage::Notifying;
        }
        let (subject, body) = render_report(&run);
        let result = self.notifier.send(&subject, &body);
        if !result.delivered {
            eprintln!(
                "warning: notification delivery failed for run {}: {}",
                run.id,
                result.detail.as_deref().unwrap_or("unknown")
            );
        }
        run.notification = Some(result);
        run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{FailingNotifier, RecordingNotifier};
    use crate::train::LinearRegressionTrainer;
    use std::fmt::Write;

    fn orchestrator(
        registry: Arc<ModelRegistry>,
    ) -> PipelineOrchestrator<LinearRegressionTrainer, RecordingNotifier> {
        // Wide tolerance: these tests exercise run control flow, so the gate
        // must not flip on holdout sampling noise.
        let mut config = PipelineConfig::default();
        config.promotion.tolerance = 0.5;
        PipelineOrchestrator::new(
            config,
            registry,
            LinearRegressionTrainer::default(),
            RecordingNotifier::new(),
        )
    }

    // Linear salary with alternating +/-50 noise, so holdout MAE sits near 50
    // for any split instead of degenerating to float epsilon.
    fn linear_snapshot(n: usize, offset: f64) -> DatasetSnapshot {
        let mut csv = String::from("years_experience,salary\n");
        for i in 0..n {
            let years = (i % 40) as f64 + offset;
            let noise = if i % 2 == 0 { 50.0 } else { -50.0 };
            let _ = writeln!(csv, "{},{}", years, 2_000.0 * years + 30_000.0 + noise);
        }
        DatasetSnapshot::parse_csv(&csv).unwrap()
    }

    #[test]
    fn test_cold_start_promotes() {
        let registry = Arc::new(ModelRegistry::in_memory());
        let orchestrator = orchestrator(registry.clone());
        let run = orchestrator.run(Some(linear_snapshot(40, 0.0)), false).unwrap();

        assert_eq!(run.outcome, RunOutcome::Promoted);
        assert!(registry.deployed().is_some());
        assert!(run.drift.is_none(), "no reference on cold start");
        assert!(run.notification.as_ref().unwrap().delivered);
    }

    #[test]
    fn test_stage_reached_on_success_is_notifying() {
        let registry = Arc::new(ModelRegistry::in_memory());
        let orchestrator = orchestrator(registry);
        let run = orchestrator.run(Some(linear_snapshot(40, 0.0)), false).unwrap();
        assert_eq!(run.stage_reached, PipelineStage::Notifying);
    }

    #[test]
    fn test_no_new_data_without_force_skips() {
        let registry = Arc::new(ModelRegistry::in_memory());
        let orchestrator = orchestrator(registry);
        let run = orchestrator.run(None, false).unwrap();
        assert_eq!(run.outcome, RunOutcome::Skipped);
        assert!(run.skip_reason.as_ref().unwrap().contains("no new data"));
    }

    #[test]
    fn test_forced_run_without_any_data_fails() {
        let registry = Arc::new(ModelRegistry::in_memory());
        let orchestrator = orchestrator(registry);
        let run = orchestrator.run(None, true).unwrap();
        assert_eq!(run.outcome, RunOutcome::Failed);
        assert_eq!(run.error.as_ref().unwrap().kind, "DataQualityError");
    }

    #[test]
    fn test_data_quality_failure_is_notified() {
        let registry = Arc::new(ModelRegistry::in_memory());
        let orchestrator = orchestrator(registry);
        // Too few rows to train
        let run = orchestrator
            .run(Some(linear_snapshot(3, 0.0)), false)
            .unwrap();
        assert_eq!(run.outcome, RunOutcome::Failed);
        assert_eq!(run.error.as_ref().unwrap().kind, "DataQualityError");
        let sent = orchestrator.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].0.contains("FAILED"));
    }

    #[test]
    fn test_failure_leaves_registry_untouched() {
        let registry = Arc::new(ModelRegistry::in_memory());
        let orchestrator = orchestrator(registry.clone());
        orchestrator.run(Some(linear_snapshot(40, 0.0)), false).unwrap();
        let before = registry.deployed().unwrap().reference.fingerprint().clone();

        orchestrator.run(Some(linear_snapshot(3, 100.0)), false).unwrap();
        assert_eq!(
            registry.deployed().unwrap().reference.fingerprint(),
            &before
        );
    }

    #[test]
    fn test_idempotent_rerun_skips() {
        let registry = Arc::new(ModelRegistry::in_memory());
        let orchestrator = orchestrator(registry);
        let snapshot = linear_snapshot(40, 0.0);

        let first = orchestrator.run(Some(snapshot.clone()), false).unwrap();
        assert_eq!(first.outcome, RunOutcome::Promoted);

        let second = orchestrator.run(Some(snapshot), false).unwrap();
        assert_eq!(second.outcome, RunOutcome::Skipped);
        assert!(second
            .skip_reason
            .as_ref()
            .unwrap()
            .contains("already finalized as PROMOTED"));
    }

    #[test]
    fn test_force_overrides_idempotency() {
        let registry = Arc::new(ModelRegistry::in_memory());
        let orchestrator = orchestrator(registry);
        let snapshot = linear_snapshot(40, 0.0);

        orchestrator.run(Some(snapshot.clone()), false).unwrap();
        let rerun = orchestrator.run(Some(snapshot), true).unwrap();
        assert_ne!(rerun.outcome, RunOutcome::Skipped);
    }

    #[test]
    fn test_noop_merge_skips() {
        let registry = Arc::new(ModelRegistry::in_memory());
        let orchestrator = orchestrator(registry);
        let snapshot = linear_snapshot(40, 0.0);
        orchestrator.run(Some(snapshot.clone()), false).unwrap();

        // A strict subset of the reference contributes nothing new, and its
        // own fingerprint differs so the idempotency guard does not trip.
        let mut csv = String::from("years_experience,salary\n");
        let _ = writeln!(csv, "0,{}", 30_050.0);
        let subset = DatasetSnapshot::parse_csv(&csv).unwrap();
        let run = orchestrator.run(Some(subset), false).unwrap();
        assert_eq!(run.outcome, RunOutcome::Skipped);
        assert!(run.skip_reason.as_ref().unwrap().contains("no new rows"));
    }

    #[test]
    fn test_second_promotion_merges_and_updates_reference() {
        let registry = Arc::new(ModelRegistry::in_memory());
        let orchestrator = orchestrator(registry.clone());
        orchestrator.run(Some(linear_snapshot(40, 0.0)), false).unwrap();
        let first_rows = registry.deployed().unwrap().reference.n_rows();

        let run = orchestrator
            .run(Some(linear_snapshot(20, 0.5)), false)
            .unwrap();
        assert_eq!(run.outcome, RunOutcome::Promoted);
        assert!(registry.deployed().unwrap().reference.n_rows() > first_rows);
    }

    #[test]
    fn test_drift_report_present_when_reference_exists() {
        let registry = Arc::new(ModelRegistry::in_memory());
        let orchestrator = orchestrator(registry);
        orchestrator.run(Some(linear_snapshot(40, 0.0)), false).unwrap();

        let run = orchestrator
            .run(Some(linear_snapshot(20, 0.5)), false)
            .unwrap();
        assert!(run.drift.is_some());
    }

    #[test]
    fn test_notification_failure_does_not_change_outcome() {
        let registry = Arc::new(ModelRegistry::in_memory());
        let orchestrator = PipelineOrchestrator::new(
            PipelineConfig::default(),
            registry,
            LinearRegressionTrainer::default(),
            FailingNotifier,
        );
        let run = orchestrator.run(Some(linear_snapshot(40, 0.0)), false).unwrap();
        assert_eq!(run.outcome, RunOutcome::Promoted);
        assert!(!run.notification.as_ref().unwrap().delivered);
    }

    #[test]
    fn test_every_terminal_state_notifies_once() {
        let registry = Arc::new(ModelRegistry::in_memory());
        let orchestrator = orchestrator(registry);

        orchestrator.run(Some(linear_snapshot(40, 0.0)), false).unwrap(); // promoted
        orchestrator.run(None, false).unwrap(); // skipped
        orchestrator.run(Some(linear_snapshot(3, 0.0)), false).unwrap(); // failed

        assert_eq!(orchestrator.notifier.sent().len(), 3);
    }
}
