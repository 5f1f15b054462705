//! CLI argument parsing
//!
//! # Usage
//!
//! ```bash
//! reentrenar run config.yaml --new-data batch.csv
//! reentrenar run config.yaml --force
//! reentrenar drift reference.csv incoming.csv
//! reentrenar validate config.yaml
//! reentrenar info config.yaml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Reentrenar: automated model retraining pipeline
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "reentrenar")]
#[command(version)]
#[command(about = "Automated retraining pipeline with drift gating and model promotion")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Execute one pipeline run from YAML configuration
    Run(RunArgs),

    /// Compare two datasets for drift without retraining
    Drift(DriftArgs),

    /// Validate a configuration file without running
    Validate(ValidateArgs),

    /// Display the resolved configuration and deployed state
    Info(InfoArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct RunArgs {
    /// Path to YAML configuration file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// CSV batch of newly arrived rows
    #[arg(short, long)]
    pub new_data: Option<PathBuf>,

    /// Re-run even when the input fingerprint was already finalized
    #[arg(short, long)]
    pub force: bool,

    /// Override the holdout split seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Override the promotion tolerance fraction
    #[arg(long)]
    pub tolerance: Option<f64>,
}

/// Arguments for the drift command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct DriftArgs {
    /// Reference dataset CSV
    #[arg(value_name = "REFERENCE")]
    pub reference: PathBuf,

    /// Incoming dataset CSV
    #[arg(value_name = "INCOMING")]
    pub incoming: PathBuf,

    /// Label column excluded from the comparison
    #[arg(short, long, default_value = "salary")]
    pub label_column: String,
}

/// Arguments for the validate command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ValidateArgs {
    /// Path to YAML configuration file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,
}

/// Arguments for the info command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct InfoArgs {
    /// Path to YAML configuration file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,
}

/// Parse CLI arguments from a string slice (for testing)
pub fn parse_args<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args)
}

/// Apply command-line overrides to a loaded configuration
pub fn apply_overrides(config: &mut super::PipelineConfig, args: &RunArgs) {
    if let Some(seed) = args.seed {
        config.split.seed = seed;
    }
    if let Some(tolerance) = args.tolerance {
        config.promotion.tolerance = tolerance;
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn config_path_strategy() -> impl Strategy<Value = String> {
        "[a-zA-Z][a-zA-Z0-9_-]{0,20}\\.(yaml|yml)"
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_run_command_parses(config in config_path_strategy()) {
            let result = parse_args(["reentrenar", "run", &config]);
            prop_assert!(result.is_ok());
            let cli = result.unwrap();
            match cli.command {
                Command::Run(args) => {
                    prop_assert_eq!(args.config.to_str().unwrap(), &config);
                }
                _ => prop_assert!(false, "Expected Run command"),
            }
        }

        #[test]
        fn prop_validate_command_parses(config in config_path_strategy()) {
            let result = parse_args(["reentrenar", "validate", &config]);
            prop_assert!(result.is_ok());
        }

        #[test]
        fn prop_seed_override(
            config in config_path_strategy(),
            seed in 0u64..u64::MAX
        ) {
            let seed_str = seed.to_string();
            let result = parse_args([
                "reentrenar", "run", &config,
                "--seed", &seed_str,
            ]);
            prop_assert!(result.is_ok());
            let cli = result.unwrap();
            match cli.command {
                Command::Run(args) => {
                    prop_assert_eq!(args.seed, Some(seed));
                }
                _ => prop_assert!(false, "Expected Run command"),
            }
        }

        #[test]
        fn prop_verbose_quiet_flags(config in config_path_strategy()) {
            let cli_v = parse_args(["reentrenar", "-v", "run", &config]).unwrap();
            let cli_q = parse_args(["reentrenar", "-q", "run", &config]).unwrap();

            prop_assert!(cli_v.verbose && !cli_v.quiet);
            prop_assert!(!cli_q.verbose && cli_q.quiet);
        }
    }
}
