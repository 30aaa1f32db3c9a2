use super::load_model;
use crate::cli::AnalyzeArgs;
use crate::config::PartialJobFile;
use crate::error::{CliError, Result};
use crate::report;
use crate::utils::progress::CliProgressHandler;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use titrafit::core::fit::minimizer::{FitOutcome, LevenbergMarquardt};
use titrafit::core::models::model::{Model, ParameterRecord};
use titrafit::engine::progress::ProgressReporter;
use titrafit::engine::state::StatisticsStore;
use titrafit::workflows::jobs::{AnalysedModel, JobDispatcher, JobStatus, run_jobs};
use tracing::{info, warn};

#[derive(Serialize)]
struct AnalysisReport<'a> {
    model: ParameterRecord,
    fit: &'a FitOutcome,
    statistics: &'a StatisticsStore,
}

pub fn run(args: AnalyzeArgs, threads: usize) -> Result<()> {
    let controllers = PartialJobFile::from_file(&args.config)?.merge_with_cli(&args)?;
    info!(jobs = controllers.len(), "Job file resolved.");

    let model = load_model(&args.data)?;
    let dispatcher = JobDispatcher::new(threads, Box::new(LevenbergMarquardt::default()))?;
    let mut analysed = AnalysedModel::new(Box::new(model));

    let fit = dispatcher.fit(&mut analysed);
    println!("{}\n", report::fit_summary(analysed.model.as_ref(), &fit));
    if !fit.converged {
        return Err(CliError::Data(
            "The initial fit did not converge; uncertainty analysis needs a fitted optimum."
                .to_string(),
        ));
    }

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());
    let outcomes = run_jobs(&dispatcher, &controllers, &mut analysed, &reporter);

    let mut stored = 0;
    for outcome in &outcomes {
        match &outcome.status {
            JobStatus::Stored(index) => {
                stored += 1;
                if let Some(run) = analysed.statistics.runs(outcome.method).get(*index) {
                    println!("{}\n", report::job_summary(&run.result));
                }
            }
            JobStatus::Failed(e) => {
                warn!(method = %outcome.method, "Job failed: {}", e);
                println!("⚠ {} failed: {}\n", outcome.method.label(), e);
            }
            JobStatus::Skipped => {
                println!("⚠ {} skipped after an interrupt\n", outcome.method.label());
            }
        }
    }

    if let Some(path) = &args.output {
        let report = AnalysisReport {
            model: analysed.model.export_parameters(),
            fit: &fit,
            statistics: &analysed.statistics,
        };
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &report).map_err(|e| CliError::FileParsing {
            path: path.clone(),
            source: e.into(),
        })?;
        info!("Statistics written to {:?}", path);
        println!("Statistics written to {}", path.display());
    }

    if stored == 0 {
        return Err(CliError::Other(anyhow::anyhow!(
            "None of the {} job(s) produced statistics.",
            outcomes.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::DataArgs;
    use crate::commands::testing::write_titration_csv;
    use std::fs;
    use tempfile::tempdir;

    fn analyze_args(dir: &std::path::Path, jobs: &str) -> AnalyzeArgs {
        let config = dir.join("jobs.toml");
        fs::write(&config, jobs).unwrap();
        AnalyzeArgs {
            data: DataArgs {
                input: write_titration_csv(dir, 15),
                independent_columns: 1,
                log_k: None,
            },
            config,
            output: Some(dir.join("results.json")),
            seed: Some(3),
            set_values: Vec::new(),
        }
    }

    #[test]
    fn analysis_writes_the_statistics_store() {
        let dir = tempdir().unwrap();
        let args = analyze_args(
            dir.path(),
            r#"
            [[job]]
            method = "monte-carlo"
            max-steps = 30

            [[job]]
            method = "cross-validation"
            leave-out = 40

            [[job]]
            method = "cross-validation"
            leave-out = 1
            "#,
        );
        let output = args.output.clone().unwrap();
        run(args, 2).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(output).unwrap()).unwrap();
        let runs = &json["statistics"]["runs"];
        assert_eq!(runs["monte-carlo"].as_array().unwrap().len(), 1);
        assert_eq!(runs["cross-validation"].as_array().unwrap().len(), 1);
        assert_eq!(
            runs["cross-validation"][0]["diagnostics"]["jobs"].as_u64(),
            Some(15)
        );
        assert!(json["fit"]["converged"].as_bool().unwrap());
        assert_eq!(json["model"]["names"][0], "lg K");
    }

    #[test]
    fn analysis_fails_when_every_job_fails() {
        let dir = tempdir().unwrap();
        let args = analyze_args(
            dir.path(),
            "[[job]]\nmethod = \"reduction\"\nminimum-rows = 40\n",
        );
        assert!(run(args, 1).is_err());
    }
}
