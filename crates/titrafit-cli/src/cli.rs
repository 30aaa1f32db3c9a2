use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Titrafit Developers",
    version,
    about = "titrafit CLI - fit saturation models to titration data and quantify parameter uncertainty with Monte Carlo, profile, model-comparison and cross-validation analyses.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of worker threads used for refitting.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fit the saturation model to a CSV dataset and print the optimum.
    Fit(FitArgs),
    /// Fit the model, then run every job of a TOML job file against it.
    Analyze(AnalyzeArgs),
}

/// Where the data comes from and how the model is seeded.
#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// Path to the input CSV file (header row required).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Number of leading CSV columns holding independent variables.
    #[arg(long, default_value_t = 1, value_name = "INT")]
    pub independent_columns: usize,

    /// Initial guess for the decadic logarithm of the binding constant.
    #[arg(long, value_name = "FLOAT", allow_hyphen_values = true)]
    pub log_k: Option<f64>,
}

/// Arguments for the `fit` subcommand.
#[derive(Args, Debug)]
pub struct FitArgs {
    #[command(flatten)]
    pub data: DataArgs,
}

/// Arguments for the `analyze` subcommand.
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Path to the job file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Path for the JSON statistics report.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Seed every randomised job, overriding `defaults.seed` from the job file.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Set a default value, overriding the job file.
    /// Can be used multiple times. Example: -S defaults.confidence=90
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}
