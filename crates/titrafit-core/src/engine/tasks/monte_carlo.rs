use super::seeded_rng;
use crate::core::data::table::DataTable;
use crate::core::models::model::Model;
use crate::engine::config::{Controller, Method, MonteCarloConfig, VarianceSource};
use crate::engine::context::{JobContext, NONE_CONVERGED};
use crate::engine::error::EngineError;
use crate::engine::progress::Progress;
use crate::engine::queue::{InterruptHandle, JobKey, WorkQueue};
use crate::engine::state::{Diagnostics, JobResult};
use crate::engine::statistics::{ResultSet, sampled_statistics};
use crate::engine::worker::{TablePair, batch_size, refit};
use rand::Rng;
use rand_distr::Normal;
use serde::Serialize;
use tracing::{info, instrument};

const METHOD: Method = Method::MonteCarlo;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonteCarloDiagnostics {
    /// Standard deviation of the gaussian noise, absent for bootstrap runs.
    pub sigma: Option<f64>,
    /// Number of residuals available to the bootstrap.
    pub bootstrap_pool: usize,
    pub samples: usize,
    pub converged: usize,
    pub batch_size: usize,
}

enum NoiseModel {
    Gaussian { normal: Normal<f64>, sigma: f64 },
    Bootstrap { residuals: Vec<f64> },
}

impl NoiseModel {
    fn select(model: &dyn Model, source: VarianceSource) -> Result<Self, String> {
        match source {
            VarianceSource::Explicit(sigma) => Self::gaussian(sigma),
            VarianceSource::StandardError => Self::gaussian(model.standard_error_of_y()),
            VarianceSource::StandardDeviation => Self::gaussian(model.standard_deviation()),
            VarianceSource::Bootstrap => {
                let residuals: Vec<f64> = model
                    .residuals()
                    .into_iter()
                    .filter(|r| r.is_finite())
                    .collect();
                if residuals.is_empty() {
                    Err("the model has no residuals to resample".to_string())
                } else {
                    Ok(Self::Bootstrap { residuals })
                }
            }
        }
    }

    fn gaussian(sigma: f64) -> Result<Self, String> {
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(format!("noise standard deviation {sigma} is not positive"));
        }
        let normal = Normal::new(0.0, sigma).map_err(|e| e.to_string())?;
        Ok(Self::Gaussian { normal, sigma })
    }

    fn perturb<R: Rng + ?Sized>(&self, table: &DataTable, rng: &mut R) -> DataTable {
        match self {
            Self::Gaussian { normal, .. } => table.perturb_gaussian(&[Some(*normal)], rng),
            Self::Bootstrap { residuals } => table.perturb_bootstrap(residuals, rng),
        }
    }
}

fn independent_noise(
    independent: &DataTable,
    sigmas: &[f64],
) -> Result<Vec<Option<Normal<f64>>>, String> {
    if sigmas.len() > independent.columns() {
        return Err(format!(
            "{} independent sigmas given for {} independent columns",
            sigmas.len(),
            independent.columns()
        ));
    }
    if sigmas.iter().all(|&s| s == 0.0) {
        return Ok(Vec::new());
    }
    (0..independent.columns())
        .map(|column| match sigmas.get(column) {
            Some(&s) if s > 0.0 => Normal::new(0.0, s).map(Some).map_err(|e| e.to_string()),
            _ => Ok(None),
        })
        .collect()
}

/// Monte Carlo confidence estimation.
///
/// Noise is added to the fitted model table (the ideal curve), every sample is
/// refitted from the optimum and each parameter's percentile interval over the
/// converged fits becomes its confidence bar.
pub struct MonteCarloEngine {
    queue: WorkQueue<TablePair>,
}

impl MonteCarloEngine {
    pub fn new(interrupt: InterruptHandle) -> Self {
        Self {
            queue: WorkQueue::with_interrupt(interrupt),
        }
    }

    #[instrument(skip_all, name = "monte_carlo_task", fields(steps = config.max_steps))]
    pub fn run(
        &self,
        context: &JobContext,
        config: &MonteCarloConfig,
    ) -> Result<JobResult, EngineError> {
        config
            .validate()
            .map_err(|e| context.reject(METHOD, e.to_string()))?;
        self.queue.clear();

        let model = context.model;
        let noise = NoiseModel::select(model, config.variance_source)
            .map_err(|reason| context.reject(METHOD, reason))?;
        let independent_noise = independent_noise(model.independent(), &config.independent_sigmas)
            .map_err(|reason| context.reject(METHOD, reason))?;

        context
            .reporter
            .report(Progress::PhaseStart { name: "Monte Carlo" });
        info!(
            samples = config.max_steps,
            source = ?config.variance_source,
            "Generating Monte Carlo samples."
        );

        let mut rng = seeded_rng(config.seed);
        let ideal = model.model_table();
        let samples: Vec<(JobKey, TablePair)> = (0..config.max_steps)
            .map(|key| {
                let dependent = noise.perturb(&ideal, &mut rng);
                let independent = if independent_noise.is_empty() {
                    model.independent().clone()
                } else {
                    model
                        .independent()
                        .perturb_gaussian(&independent_noise, &mut rng)
                };
                (
                    key,
                    TablePair {
                        independent,
                        dependent,
                    },
                )
            })
            .collect();

        let batch = batch_size(config.max_steps, context.pool.threads());
        self.queue.enqueue_chunked(samples, batch);

        context.reporter.report(Progress::TaskStart {
            total_steps: config.max_steps as u64,
        });
        let fits = context.pool.drain(
            model,
            &self.queue,
            &refit(context.fitter),
            context.reporter,
        );
        context.reporter.report(Progress::TaskFinish);
        let interrupted = self.queue.is_interrupted();

        let results: ResultSet = fits.into_values().collect();
        let converged = results.converged_count();
        if converged == 0 {
            context.reporter.report(Progress::PhaseFinish);
            return Err(context.empty(METHOD, results.len(), NONE_CONVERGED));
        }
        info!(
            total = results.len(),
            converged, "Aggregating Monte Carlo results."
        );

        let parameters =
            sampled_statistics(model, &results, config.confidence, !config.light_weight);
        let (sigma, bootstrap_pool) = match &noise {
            NoiseModel::Gaussian { sigma, .. } => (Some(*sigma), 0),
            NoiseModel::Bootstrap { residuals } => (None, residuals.len()),
        };
        let diagnostics = MonteCarloDiagnostics {
            sigma,
            bootstrap_pool,
            samples: results.len(),
            converged,
            batch_size: batch,
        };
        context.reporter.report(Progress::PhaseFinish);

        Ok(JobResult {
            controller: Controller::MonteCarlo(config.clone()),
            parameters,
            diagnostics: Diagnostics::MonteCarlo(diagnostics),
            interrupted,
            raw: (config.store_raw && !config.light_weight).then_some(results),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fit::minimizer::LevenbergMarquardt;
    use crate::core::models::fixtures::fitted_saturation;
    use crate::engine::config::MonteCarloConfigBuilder;
    use crate::engine::progress::ProgressReporter;
    use crate::engine::tasks::testing::{NeverConverges, recording};
    use crate::engine::worker::WorkerPool;
    use std::sync::Mutex;

    fn run_with(config: &MonteCarloConfig) -> Result<JobResult, EngineError> {
        let model = fitted_saturation(15, 1);
        let fitter = LevenbergMarquardt::default();
        let pool = WorkerPool::new(3).unwrap();
        let reporter = ProgressReporter::new();
        let context = JobContext::new(&model, &fitter, &pool, &reporter);
        MonteCarloEngine::new(InterruptHandle::new()).run(&context, config)
    }

    fn config(steps: usize) -> MonteCarloConfigBuilder {
        MonteCarloConfigBuilder::new().max_steps(steps).seed(42)
    }

    #[test]
    fn bars_bracket_the_point_estimates() {
        let result = run_with(
            &config(120)
                .variance_source(VarianceSource::StandardDeviation)
                .build()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(result.parameters.len(), 3);
        for p in &result.parameters {
            assert!(p.bar.contains(p.value), "{}: {:?} vs {}", p.name, p.bar, p.value);
            assert_eq!(p.samples.as_ref().map(Vec::len), Some(120));
            assert!(p.summary.is_some());
        }
        assert!(result.raw.is_none());
        assert!(!result.interrupted);
    }

    #[test]
    fn store_raw_keeps_one_record_per_sample() {
        let result = run_with(&config(40).store_raw(true).build().unwrap()).unwrap();
        let raw = result.raw.unwrap();
        assert_eq!(raw.len(), 40);
        assert_eq!(raw.converged_count(), 40);
        let Diagnostics::MonteCarlo(diagnostics) = result.diagnostics else {
            panic!("wrong diagnostics kind");
        };
        assert_eq!(diagnostics.samples, 40);
        assert_eq!(diagnostics.batch_size, 1);
        assert!(diagnostics.sigma.is_some_and(|s| s > 0.0));
    }

    #[test]
    fn light_weight_discards_samples() {
        let result = run_with(
            &config(30)
                .light_weight(true)
                .store_raw(true)
                .build()
                .unwrap(),
        )
        .unwrap();
        assert!(result.raw.is_none());
        assert!(result.parameters.iter().all(|p| p.samples.is_none()));
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let config = config(40).build().unwrap();
        let a = run_with(&config).unwrap();
        let b = run_with(&config).unwrap();
        assert_eq!(a.parameters, b.parameters);
    }

    #[test]
    fn bootstrap_and_explicit_sources_run() {
        let bootstrap = run_with(
            &config(30)
                .variance_source(VarianceSource::Bootstrap)
                .build()
                .unwrap(),
        )
        .unwrap();
        let Diagnostics::MonteCarlo(d) = &bootstrap.diagnostics else {
            panic!("wrong diagnostics kind");
        };
        assert_eq!(d.bootstrap_pool, 15);
        assert_eq!(d.sigma, None);

        let explicit = run_with(
            &config(30)
                .variance_source(VarianceSource::Explicit(0.02))
                .independent_sigmas(vec![1e-5])
                .build()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(explicit.parameters.len(), 3);
    }

    #[test]
    fn too_many_independent_sigmas_is_rejected() {
        let err = run_with(&config(10).independent_sigmas(vec![0.1, 0.1]).build().unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidConfiguration {
                method: Method::MonteCarlo,
                ..
            }
        ));
    }

    #[test]
    fn zero_converged_fits_is_an_empty_aggregation() {
        let model = fitted_saturation(10, 1);
        let pool = WorkerPool::new(2).unwrap();
        let reporter = ProgressReporter::new();
        let context = JobContext::new(&model, &NeverConverges, &pool, &reporter);
        let err = MonteCarloEngine::new(InterruptHandle::new())
            .run(&context, &config(8).build().unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::EmptyAggregation {
                method: Method::MonteCarlo,
                total: 8,
                ..
            }
        ));
    }

    #[test]
    fn progress_counts_every_sample() {
        let model = fitted_saturation(10, 1);
        let fitter = LevenbergMarquardt::default();
        let pool = WorkerPool::new(2).unwrap();
        let events = Mutex::new(Vec::new());
        let reporter = recording(&events);
        let context = JobContext::new(&model, &fitter, &pool, &reporter);
        MonteCarloEngine::new(InterruptHandle::new())
            .run(&context, &config(25).build().unwrap())
            .unwrap();
        drop(reporter);

        let events = events.into_inner().unwrap();
        assert!(events.contains(&Progress::TaskStart { total_steps: 25 }));
        let increments = events
            .iter()
            .filter(|e| **e == Progress::TaskIncrement)
            .count();
        assert_eq!(increments, 25);
    }

    #[test]
    fn template_model_is_left_untouched() {
        let model = fitted_saturation(12, 1);
        let before = model.parameters().to_vec();
        let fitter = LevenbergMarquardt::default();
        let pool = WorkerPool::new(2).unwrap();
        let reporter = ProgressReporter::new();
        let context = JobContext::new(&model, &fitter, &pool, &reporter);
        MonteCarloEngine::new(InterruptHandle::new())
            .run(&context, &config(20).build().unwrap())
            .unwrap();
        assert_eq!(model.parameters(), before.as_slice());
        assert_eq!(model.dependent().enabled_row_count(), 12);
    }
}
