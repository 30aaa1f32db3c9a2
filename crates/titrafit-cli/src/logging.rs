use crate::error::{CliError, Result};
use std::fs::File;
use std::path::PathBuf;
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    fmt::{self, format::FmtSpan},
    prelude::*,
};

/// Crates whose events follow the requested verbosity. Everything else is
/// held at WARN so solver internals of dependencies do not flood a run.
const OWN_TARGETS: [&str; 2] = ["titrafit", "titrafit_cli"];

/// Console level for `-v` repetitions, or ERROR under `--quiet`.
fn console_level(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::ERROR;
    }
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

fn targets(level: LevelFilter) -> Targets {
    OWN_TARGETS
        .iter()
        .fold(Targets::new().with_default(LevelFilter::WARN.min(level)), |t, target| {
            t.with_target(*target, level)
        })
}

/// Installs the global subscriber.
///
/// The console shows compact events at the requested level. A log file, when
/// given, always records DEBUG and above with worker thread names and the
/// duration of each `*_task` span, so a quiet terminal run still leaves a
/// full trace of every refit job.
pub fn setup_logging(verbosity: u8, quiet: bool, log_file: Option<PathBuf>) -> Result<()> {
    let level = console_level(verbosity, quiet);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .without_time()
        .compact()
        .with_filter(targets(level));

    let file_layer = match log_file {
        Some(path) => {
            let file = File::create(&path).map_err(CliError::Io)?;
            let layer = fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_thread_names(true)
                .with_target(true)
                .with_span_events(FmtSpan::CLOSE)
                .with_filter(targets(level.max(LevelFilter::DEBUG)));
            Some(layer)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| CliError::Other(anyhow::anyhow!("Failed to install logger: {e}")))
}
