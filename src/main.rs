//! Reentrenar CLI
//!
//! # Usage
//!
//! ```bash
//! # Run the pipeline on a new batch
//! reentrenar run config.yaml --new-data batch.csv
//!
//! # Force a retrain of the current reference
//! reentrenar run config.yaml --force
//!
//! # Compare two datasets for drift
//! reentrenar drift reference.csv incoming.csv
//!
//! # Validate config
//! reentrenar validate config.yaml
//!
//! # Show resolved config and deployed state
//! reentrenar info config.yaml
//! ```

use clap::Parser;
use reentrenar::config::{
    apply_overrides, Cli, Command, DriftArgs, InfoArgs, PipelineConfig, RunArgs, ValidateArgs,
};
use reentrenar::dataset::DatasetSnapshot;
use reentrenar::drift::DriftDetector;
use reentrenar::notify::ConsoleNotifier;
use reentrenar::pipeline::PipelineOrchestrator;
use reentrenar::registry::{ModelRegistry, RunOutcome};
use reentrenar::train::LinearRegressionTrainer;
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        LogLevel::Quiet
    } else if cli.verbose {
        LogLevel::Verbose
    } else {
        LogLevel::Normal
    };

    let result = match cli.command {
        Command::Run(args) => run_pipeline(args, log_level),
        Command::Drift(args) => run_drift(args, log_level),
        Command::Validate(args) => run_validate(args, log_level),
        Command::Info(args) => run_info(args, log_level),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum LogLevel {
    Quiet,
    Normal,
    Verbose,
}

fn log(level: LogLevel, required: LogLevel, msg: &str) {
    if level != LogLevel::Quiet && (level == required || required == LogLevel::Normal) {
        println!("{msg}");
    }
}

fn run_pipeline(args: RunArgs, level: LogLevel) -> Result<(), String> {
    log(
        level,
        LogLevel::Normal,
        &format!("Reentrenar: running pipeline from {}", args.config.display()),
    );

    let mut config =
        PipelineConfig::from_file(&args.config).map_err(|e| format!("Config error: {e}"))?;
    apply_overrides(&mut config, &args);

    let registry = match &config.state_dir {
        Some(dir) => ModelRegistry::open(dir).map_err(|e| format!("Registry error: {e}"))?,
        None => ModelRegistry::in_memory(),
    };

    let new_data = match &args.new_data {
        Some(path) => Some(
            DatasetSnapshot::load_csv(path)
                .map_err(|e| format!("Failed to load {}: {e}", path.display()))?,
        ),
        None => None,
    };

    let orchestrator = PipelineOrchestrator::new(
        config,
        Arc::new(registry),
        LinearRegressionTrainer::default(),
        ConsoleNotifier,
    );

    let run = orchestrator
        .run(new_data, args.force)
        .map_err(|e| e.to_string())?;

    log(
        level,
        LogLevel::Verbose,
        &format!("Run {} reached stage {}", run.id, run.stage_reached),
    );

    match run.outcome {
        RunOutcome::Failed => Err(match &run.error {
            Some(err) => format!("Run {} failed: {} ({})", run.id, err.message, err.kind),
            None => format!("Run {} failed", run.id),
        }),
        outcome => {
            log(
                level,
                LogLevel::Normal,
                &format!("Run {} finished: {outcome}", run.id),
            );
            Ok(())
        }
    }
}

fn run_drift(args: DriftArgs, level: LogLevel) -> Result<(), String> {
    let reference = DatasetSnapshot::load_csv(&args.reference)
        .map_err(|e| format!("Failed to load {}: {e}", args.reference.display()))?;
    let incoming = DatasetSnapshot::load_csv(&args.incoming)
        .map_err(|e| format!("Failed to load {}: {e}", args.incoming.display()))?;

    let detector = DriftDetector::default();
    let report = detector.detect(&reference, &incoming, &args.label_column);

    if level != LogLevel::Quiet {
        print!("{}", report.format_report());
    }
    Ok(())
}

fn run_validate(args: ValidateArgs, level: LogLevel) -> Result<(), String> {
    let config =
        PipelineConfig::from_file(&args.config).map_err(|e| format!("Config error: {e}"))?;
    log(
        level,
        LogLevel::Normal,
        &format!(
            "Config valid: label column '{}', primary metric {}",
            config.label_column,
            config.promotion.primary_metric.name()
        ),
    );
    Ok(())
}

fn run_info(args: InfoArgs, level: LogLevel) -> Result<(), String> {
    let config =
        PipelineConfig::from_file(&args.config).map_err(|e| format!("Config error: {e}"))?;

    log(level, LogLevel::Normal, "Configuration:");
    log(
        level,
        LogLevel::Normal,
        &format!("  Label column:     {}", config.label_column),
    );
    log(
        level,
        LogLevel::Normal,
        &format!(
            "  Drift:            significance {}, TVD threshold {}",
            config.drift.numeric_significance, config.drift.categorical_tvd_threshold
        ),
    );
    log(
        level,
        LogLevel::Normal,
        &format!(
            "  Holdout split:    ratio {}, seed {}",
            config.split.ratio, config.split.seed
        ),
    );
    log(
        level,
        LogLevel::Normal,
        &format!(
            "  Promotion:        {} within {:.1}% tolerance",
            config.promotion.primary_metric.name(),
            config.promotion.tolerance * 100.0
        ),
    );

    match &config.state_dir {
        Some(dir) => {
            let registry =
                ModelRegistry::open(dir).map_err(|e| format!("Registry error: {e}"))?;
            match registry.deployed() {
                Some(state) => {
                    log(level, LogLevel::Normal, "Deployed state:");
                    log(
                        level,
                        LogLevel::Normal,
                        &format!(
                            "  Reference:        {} rows, fingerprint {}",
                            state.reference.n_rows(),
                            state.reference.fingerprint()
                        ),
                    );
                    log(
                        level,
                        LogLevel::Normal,
                        &format!(
                            "  Model metrics:    MAE {:.4}  RMSE {:.4}  R² {:.4}",
                            state.metrics.mae, state.metrics.rmse, state.metrics.r2
                        ),
                    );
                    log(
                        level,
                        LogLevel::Normal,
                        &format!("  Trained at:       {}", state.artifact.trained_at),
                    );
                }
                None => log(level, LogLevel::Normal, "Deployed state: none"),
            }
        }
        None => log(
            level,
            LogLevel::Normal,
            "Deployed state: in-memory only (no state_dir)",
        ),
    }
    Ok(())
}
