//! # Reentrenar: Automated Model Retraining Pipeline
//!
//! Reentrenar keeps a deployed regression model current as new data arrives:
//! it fingerprints incoming batches, checks them for distribution drift
//! against the reference dataset, merges them in, retrains, evaluates on a
//! reproducible holdout, and promotes the candidate only when it does not
//! regress past tolerance. Every run ends in exactly one terminal state and
//! one operator notification.
//!
//! ## Architecture
//!
//! - **dataset**: Snapshots, CSV codec, canonical fingerprints, merging
//! - **drift**: Per-feature KS / total-variation drift detection
//! - **preprocess**: Cleaning, imputation, scaling, one-hot encoding
//! - **train**: Linear regression on the encoded feature table
//! - **eval**: Seeded holdout split and MAE/RMSE/R² metrics
//! - **promote**: Tolerance-gated promotion decision
//! - **registry**: Deployed (model, reference) pair, run lock, history
//! - **notify**: Terminal-state reports behind the `Notifier` trait
//! - **pipeline**: The stage orchestrator tying it all together
//! - **config**: Declarative YAML configuration and CLI

pub mod config;
pub mod dataset;
pub mod drift;
pub mod eval;
pub mod notify;
pub mod pipeline;
pub mod preprocess;
pub mod promote;
pub mod registry;
pub mod train;

pub mod error;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use dataset::{DatasetSnapshot, Fingerprint};
pub use error::{Error, Result};
pub use pipeline::{PipelineOrchestrator, TrainingRun};
pub use registry::{ModelRegistry, RunOutcome};
