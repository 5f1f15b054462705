//! Deployed-state registry
//!
//! Holds the two process-wide mutable pointers: the current model (with its
//! metrics) and the reference dataset. Readers get immutable `Arc` snapshots;
//! the only mutator is the atomic swap performed on promotion, which replaces
//! both slots under one lock so no reader ever observes a half-updated pair.
//!
//! The registry also owns the run lock (at most one in-flight pipeline run)
//! and the history of finalized input fingerprints that drives idempotent
//! re-runs. When opened over a directory it persists the deployed record as
//! JSON and the reference dataset as CSV, restoring both on open.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use serde::{Deserialize, Serialize};

use crate::dataset::{DatasetSnapshot, Fingerprint};
use crate::error::{Error, Result};
use crate::eval::MetricsRecord;
use crate::train::ModelArtifact;

const MODEL_FILE: &str = "model.json";
const METRICS_FILE: &str = "metrics.json";
const REFERENCE_FILE: &str = "reference.csv";
const HISTORY_FILE: &str = "run_history.json";

/// Terminal classification of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    Promoted,
    Rejected,
    Failed,
    Skipped,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Promoted => write!(f, "PROMOTED"),
            RunOutcome::Rejected => write!(f, "REJECTED"),
            RunOutcome::Failed => write!(f, "FAILED"),
            RunOutcome::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// The deployed pair: current model + metrics and the reference dataset
#[derive(Debug, Clone)]
pub struct DeployedState {
    pub artifact: ModelArtifact,
    pub metrics: MetricsRecord,
    pub reference: DatasetSnapshot,
}

/// Guard proving exclusive ownership of the (model, reference) pair for the
/// duration of one pipeline run. Released on drop, including on panic, so a
/// crashed run never wedges future runs.
#[derive(Debug)]
pub struct RunGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

/// Process-wide registry of deployed state and run history
#[derive(Debug)]
pub struct ModelRegistry {
    deployed: Mutex<Option<Arc<DeployedState>>>,
    history: Mutex<HashMap<String, RunOutcome>>,
    run_lock: Mutex<()>,
    root: Option<PathBuf>,
}

impl ModelRegistry {
    /// In-memory registry with no persistence
    pub fn in_memory() -> Self {
        Self {
            deployed: Mutex::new(None),
            history: Mutex::new(HashMap::new()),
            run_lock: Mutex::new(()),
            root: None,
        }
    }

    /// Open a registry over a state directory, restoring any persisted
    /// deployed record, reference dataset, and run history.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let deployed = Self::load_deployed(&root)?;
        let history = Self::load_history(&root)?;

        Ok(Self {
            deployed: Mutex::new(deployed.map(Arc::new)),
            history: Mutex::new(history),
            run_lock: Mutex::new(()),
            root: Some(root),
        })
    }

    fn load_deployed(root: &Path) -> Result<Option<DeployedState>> {
        let model_path = root.join(MODEL_FILE);
        let metrics_path = root.join(METRICS_FILE);
        let reference_path = root.join(REFERENCE_FILE);
        if !model_path.exists() || !metrics_path.exists() || !reference_path.exists() {
            return Ok(None);
        }

        let artifact: ModelArtifact = serde_json::from_str(&fs::read_to_string(model_path)?)
            .map_err(|e| Error::Serialization(format!("deployed model: {e}")))?;
        let metrics: MetricsRecord = serde_json::from_str(&fs::read_to_string(metrics_path)?)
            .map_err(|e| Error::Serialization(format!("deployed metrics: {e}")))?;
        let reference = DatasetSnapshot::load_csv(reference_path)?;

        // The three files are only valid as a pair swap from one promotion;
        // refuse to restore a torn combination.
        if artifact.trained_on != *reference.fingerprint()
            || metrics.snapshot_fingerprint != *reference.fingerprint()
        {
            return Err(Error::Serialization(
                "deployed state directory is inconsistent: model, metrics, and reference \
                 dataset do not share a fingerprint"
                    .to_string(),
            ));
        }

        Ok(Some(DeployedState {
            artifact,
            metrics,
            reference,
        }))
    }

    fn load_history(root: &Path) -> Result<HashMap<String, RunOutcome>> {
        let path = root.join(HISTORY_FILE);
        if !path.exists() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&fs::read_to_string(path)?)
            .map_err(|e| Error::Serialization(format!("run history: {e}")))
    }

    /// Acquire exclusive run ownership, or fail immediately.
    ///
    /// Bounded wait: contention returns `RunAlreadyInProgress` rather than
    /// blocking behind the in-flight run.
    pub fn try_acquire_run(&self) -> Result<RunGuard<'_>> {
        match self.run_lock.try_lock() {
            Ok(guard) => Ok(RunGuard { _guard: guard }),
            Err(TryLockError::WouldBlock) => Err(Error::RunAlreadyInProgress),
            Err(TryLockError::Poisoned(poisoned)) => Ok(RunGuard {
                _guard: poisoned.into_inner(),
            }),
        }
    }

    /// Immutable snapshot of the deployed pair, if any
    pub fn deployed(&self) -> Option<Arc<DeployedState>> {
        self.deployed
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Atomically replace the deployed pair. The only mutator; called by the
    /// orchestrator on entry to the `Promoted` terminal state.
    pub fn promote(&self, state: DeployedState) -> Result<()> {
        if let Some(root) = &self.root {
            Self::persist(root, &state)?;
        }
        let mut slot = self.deployed.lock().unwrap_or_else(|p| p.into_inner());
        *slot = Some(Arc::new(state));
        Ok(())
    }

    fn persist(root: &Path, state: &DeployedState) -> Result<()> {
        let model = serde_json::to_string_pretty(&state.artifact)
            .map_err(|e| Error::Serialization(format!("deployed model: {e}")))?;
        let metrics = serde_json::to_string_pretty(&state.metrics)
            .map_err(|e| Error::Serialization(format!("deployed metrics: {e}")))?;

        // Stage all three files before renaming any of them into place, so a
        // failure mid-persist leaves the previous consistent pair on disk.
        let staged = [
            (root.join(MODEL_FILE), model),
            (root.join(METRICS_FILE), metrics),
            (root.join(REFERENCE_FILE), state.reference.to_csv()),
        ];
        for (path, content) in &staged {
            fs::write(Self::staging_path(path), content)?;
        }
        for (path, _) in &staged {
            fs::rename(Self::staging_path(path), path)?;
        }
        Ok(())
    }

    fn staging_path(path: &Path) -> PathBuf {
        let mut staged = path.as_os_str().to_os_string();
        staged.push(".tmp");
        PathBuf::from(staged)
    }

    /// Finalized outcome previously recorded for an input fingerprint
    pub fn finalized_outcome(&self, fingerprint: &Fingerprint) -> Option<RunOutcome> {
        self.history
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(fingerprint.as_str())
            .copied()
    }

    /// Record a terminal outcome for an input fingerprint. `Skipped` runs
    /// are not finalized outcomes and are never recorded.
    pub fn record_outcome(&self, fingerprint: &Fingerprint, outcome: RunOutcome) -> Result<()> {
        if outcome == RunOutcome::Skipped {
            return Ok(());
        }
        let snapshot = {
            let mut history = self.history.lock().unwrap_or_else(|p| p.into_inner());
            history.insert(fingerprint.as_str().to_string(), outcome);
            history.clone()
        };
        if let Some(root) = &self.root {
            let json = serde_json::to_string_pretty(&snapshot)
                .map_err(|e| Error::Serialization(format!("run history: {e}")))?;
            fs::write(root.join(HISTORY_FILE), json)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::Preprocessor;
    use crate::train::{LinearRegressionTrainer, Trainer};
    use crate::eval::{evaluate, holdout_split, SplitConfig};
    use tempfile::TempDir;

    fn deployed_state() -> DeployedState {
        deployed_state_with_base(500)
    }

    fn deployed_state_with_base(base: i64) -> DeployedState {
        let mut csv = String::from("years,salary\n");
        for y in 1..=15 {
            csv.push_str(&format!("{},{}\n", y, 1000 * y + base));
        }
        let reference = DatasetSnapshot::parse_csv(&csv).unwrap();
        let table = Preprocessor::default()
            .transform(&reference, "salary")
            .unwrap();
        let (train, holdout) = holdout_split(&table, &SplitConfig::default());
        let artifact = LinearRegressionTrainer::default().fit(&train).unwrap();
        let metrics = evaluate(&artifact, &holdout).unwrap();
        DeployedState {
            artifact,
            metrics,
            reference,
        }
    }

    #[test]
    fn test_in_memory_starts_empty() {
        let registry = ModelRegistry::in_memory();
        assert!(registry.deployed().is_none());
    }

    #[test]
    fn test_promote_replaces_pair() {
        let registry = ModelRegistry::in_memory();
        let state = deployed_state();
        let fingerprint = state.reference.fingerprint().clone();

        registry.promote(state).unwrap();
        let deployed = registry.deployed().unwrap();
        assert_eq!(deployed.reference.fingerprint(), &fingerprint);
    }

    #[test]
    fn test_reader_snapshot_survives_swap() {
        let registry = ModelRegistry::in_memory();
        registry.promote(deployed_state()).unwrap();

        let before = registry.deployed().unwrap();
        let mut second = deployed_state();
        second.artifact.model.intercept += 1.0;
        registry.promote(second).unwrap();

        // The earlier reader still holds a consistent pair
        assert_eq!(
            before.metrics.snapshot_fingerprint,
            registry.deployed().unwrap().metrics.snapshot_fingerprint
        );
    }

    #[test]
    fn test_run_lock_exclusive() {
        let registry = ModelRegistry::in_memory();
        let guard = registry.try_acquire_run().unwrap();
        let err = registry.try_acquire_run().unwrap_err();
        assert_eq!(err.kind(), "RunAlreadyInProgress");
        drop(guard);
        assert!(registry.try_acquire_run().is_ok());
    }

    #[test]
    fn test_history_roundtrip() {
        let registry = ModelRegistry::in_memory();
        let state = deployed_state();
        let fingerprint = state.reference.fingerprint();

        assert!(registry.finalized_outcome(fingerprint).is_none());
        registry
            .record_outcome(fingerprint, RunOutcome::Promoted)
            .unwrap();
        assert_eq!(
            registry.finalized_outcome(fingerprint),
            Some(RunOutcome::Promoted)
        );
    }

    #[test]
    fn test_skipped_never_recorded() {
        let registry = ModelRegistry::in_memory();
        let state = deployed_state();
        registry
            .record_outcome(state.reference.fingerprint(), RunOutcome::Skipped)
            .unwrap();
        assert!(registry
            .finalized_outcome(state.reference.fingerprint())
            .is_none());
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = TempDir::new().unwrap();
        let state = deployed_state();
        let fingerprint = state.reference.fingerprint().clone();

        {
            let registry = ModelRegistry::open(dir.path()).unwrap();
            registry.promote(state).unwrap();
            registry
                .record_outcome(&fingerprint, RunOutcome::Promoted)
                .unwrap();
        }

        let reopened = ModelRegistry::open(dir.path()).unwrap();
        let deployed = reopened.deployed().unwrap();
        assert_eq!(deployed.reference.fingerprint(), &fingerprint);
        assert_eq!(
            reopened.finalized_outcome(&fingerprint),
            Some(RunOutcome::Promoted)
        );
    }

    #[test]
    fn test_open_empty_dir() {
        let dir = TempDir::new().unwrap();
        let registry = ModelRegistry::open(dir.path()).unwrap();
        assert!(registry.deployed().is_none());
    }

    #[test]
    fn test_leftover_staging_files_do_not_shadow_committed_pair() {
        let dir = TempDir::new().unwrap();
        let state = deployed_state();
        let fingerprint = state.reference.fingerprint().clone();
        {
            let registry = ModelRegistry::open(dir.path()).unwrap();
            registry.promote(state).unwrap();
        }

        // A crash between staging and commit leaves *.tmp files behind;
        // reopening must restore the committed pair and overwrite the
        // leftovers on the next promotion.
        fs::write(dir.path().join("model.json.tmp"), "{ not json").unwrap();
        fs::write(dir.path().join("metrics.json.tmp"), "{ not json").unwrap();

        let reopened = ModelRegistry::open(dir.path()).unwrap();
        let deployed = reopened.deployed().unwrap();
        assert_eq!(deployed.reference.fingerprint(), &fingerprint);

        reopened.promote(deployed_state_with_base(900)).unwrap();
        let after = ModelRegistry::open(dir.path()).unwrap();
        assert_ne!(after.deployed().unwrap().reference.fingerprint(), &fingerprint);
    }

    #[test]
    fn test_torn_persisted_pair_is_refused_on_open() {
        let dir = TempDir::new().unwrap();
        {
            let registry = ModelRegistry::open(dir.path()).unwrap();
            registry.promote(deployed_state()).unwrap();
        }

        // Overwrite the model with one trained on different data, as a crash
        // between file writes could have. Reopening must not pair it with the
        // stale metrics and reference.
        let other = deployed_state_with_base(900);
        let model = serde_json::to_string_pretty(&other.artifact).unwrap();
        fs::write(dir.path().join("model.json"), model).unwrap();

        let err = ModelRegistry::open(dir.path()).unwrap_err();
        assert_eq!(err.kind(), "SerializationError");
    }
}
