use super::seeded_rng;
use crate::core::data::table::TableError;
use crate::core::models::model::Model;
use crate::engine::config::{
    Controller, CrossValidationConfig, CrossValidationKind, Method, ReductionConfig,
    ReductionRuntype, SubsetAlgorithm,
};
use crate::engine::context::{JobContext, NONE_CONVERGED};
use crate::engine::error::EngineError;
use crate::engine::progress::Progress;
use crate::engine::queue::{InterruptHandle, JobKey, JobKeyMap, WorkQueue};
use crate::engine::state::{Diagnostics, JobResult};
use crate::engine::statistics::{ResultSet, combinations_count, sampled_statistics};
use crate::engine::worker::{TablePair, refit};
use itertools::Itertools;
use rand::Rng;
use rand::seq::index;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, instrument};

/// Combination count above which full enumeration is avoided.
const ENUMERATION_LIMIT: f64 = 1e5;
/// Requested share of all combinations below which sampling wins.
const COVERAGE_RATIO: f64 = 0.75;
/// Leave counts above this always sample randomly.
const MAX_ENUMERATED_LEAVE_COUNT: usize = 10;
/// Draw attempts allowed per requested random subset.
const DRAWS_PER_SUBSET: usize = 100;

/// Resolves [`SubsetAlgorithm::Automatic`] from the size of the combinatorial space.
pub fn select_algorithm(
    rows: usize,
    leave_count: usize,
    requested: usize,
    algorithm: SubsetAlgorithm,
) -> SubsetAlgorithm {
    if algorithm != SubsetAlgorithm::Automatic {
        return algorithm;
    }
    let combinations = combinations_count(rows, leave_count);
    let sparse = requested as f64 / combinations < COVERAGE_RATIO;
    if (combinations > ENUMERATION_LIMIT && sparse) || leave_count > MAX_ENUMERATED_LEAVE_COUNT {
        SubsetAlgorithm::Random
    } else {
        SubsetAlgorithm::Precompute
    }
}

/// Every `leave_count`-subset of `0..rows`, or `requested` of them drawn
/// without replacement when there are more.
pub fn enumerated_subsets<R: Rng + ?Sized>(
    rows: usize,
    leave_count: usize,
    requested: usize,
    rng: &mut R,
) -> Vec<Vec<usize>> {
    let all: Vec<Vec<usize>> = (0..rows).combinations(leave_count).collect();
    if all.len() <= requested {
        return all;
    }
    let mut picked = index::sample(rng, all.len(), requested).into_vec();
    picked.sort_unstable();
    picked.into_iter().map(|i| all[i].clone()).collect()
}

/// Distinct random `leave_count`-subsets of `0..rows`, at most `requested`.
///
/// Stops early when the draw budget is spent, so small spaces may come back
/// short of full coverage.
pub fn random_subsets<R: Rng + ?Sized>(
    rows: usize,
    leave_count: usize,
    requested: usize,
    rng: &mut R,
) -> Vec<Vec<usize>> {
    if leave_count > rows {
        return Vec::new();
    }
    let target = (requested as f64).min(combinations_count(rows, leave_count)) as usize;
    let budget = target.saturating_mul(DRAWS_PER_SUBSET);
    let mut seen = HashSet::with_capacity(target);
    let mut subsets = Vec::with_capacity(target);
    let mut draws = 0;
    while subsets.len() < target && draws < budget {
        draws += 1;
        let mut subset = index::sample(rng, rows, leave_count).into_vec();
        subset.sort_unstable();
        if seen.insert(subset.clone()) {
            subsets.push(subset);
        }
    }
    subsets
}

/// Positions to leave out for one cross-validation run, plus the algorithm used.
///
/// Leave-one-out and leave-two-out are always exhaustive.
pub fn leave_out_subsets<R: Rng + ?Sized>(
    rows: usize,
    config: &CrossValidationConfig,
    rng: &mut R,
) -> (SubsetAlgorithm, Vec<Vec<usize>>) {
    let leave_count = config.kind.leave_count();
    match config.kind {
        CrossValidationKind::LeaveOneOut | CrossValidationKind::LeaveTwoOut => (
            SubsetAlgorithm::Precompute,
            (0..rows).combinations(leave_count).collect(),
        ),
        CrossValidationKind::LeaveXOut(_) => {
            match select_algorithm(rows, leave_count, config.max_steps, config.algorithm) {
                SubsetAlgorithm::Random => (
                    SubsetAlgorithm::Random,
                    random_subsets(rows, leave_count, config.max_steps, rng),
                ),
                _ => (
                    SubsetAlgorithm::Precompute,
                    enumerated_subsets(rows, leave_count, config.max_steps, rng),
                ),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReductionSide {
    End,
    Beginning,
}

/// Rows removed by each reduction step, ordered by side and then by count.
pub fn reduction_plan(
    enabled: &[usize],
    runtype: ReductionRuntype,
    minimum_rows: usize,
) -> Vec<(ReductionSide, Vec<usize>)> {
    let removable = enabled.len().saturating_sub(minimum_rows);
    let sides: &[ReductionSide] = match runtype {
        ReductionRuntype::FromEnd => &[ReductionSide::End],
        ReductionRuntype::FromBeginning => &[ReductionSide::Beginning],
        ReductionRuntype::Both => &[ReductionSide::End, ReductionSide::Beginning],
    };
    sides
        .iter()
        .flat_map(|&side| {
            (1..=removable).map(move |count| {
                let removed = match side {
                    ReductionSide::End => enabled[enabled.len() - count..].to_vec(),
                    ReductionSide::Beginning => enabled[..count].to_vec(),
                };
                (side, removed)
            })
        })
        .collect()
}

fn without_rows(model: &dyn Model, rows: &[usize]) -> Result<TablePair, TableError> {
    let mut dependent = model.dependent().clone();
    for &row in rows {
        dependent.disable_row(row)?;
    }
    let mut independent = model.independent().clone();
    independent.mirror_mask(&dependent)?;
    Ok(TablePair {
        independent,
        dependent,
    })
}

/// Observed and predicted values at the rows one job left out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeftOutPrediction {
    pub key: JobKey,
    pub rows: Vec<usize>,
    pub observed: Vec<Vec<f64>>,
    pub predicted: Vec<Vec<f64>>,
}

impl LeftOutPrediction {
    pub fn squared_error(&self) -> f64 {
        self.observed
            .iter()
            .flatten()
            .zip(self.predicted.iter().flatten())
            .map(|(o, p)| (o - p).powi(2))
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossValidationDiagnostics {
    pub scheme: CrossValidationKind,
    pub algorithm: SubsetAlgorithm,
    pub jobs: usize,
    pub converged: usize,
    /// Row indices disabled by each job.
    pub left_out: JobKeyMap,
    pub predictions: Vec<LeftOutPrediction>,
    /// Predicted residual sum of squares over converged jobs.
    pub press: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReductionPoint {
    pub key: JobKey,
    pub side: ReductionSide,
    pub removed: usize,
    pub remaining: usize,
    /// First independent value of the outermost row still enabled.
    pub cutoff: f64,
    pub parameters: Vec<f64>,
    pub sse: f64,
    pub converged: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReductionDiagnostics {
    pub runtype: ReductionRuntype,
    pub minimum_rows: usize,
    /// Row indices disabled by each step, keyed like `series`.
    pub left_out: JobKeyMap,
    pub series: Vec<ReductionPoint>,
}

/// Cross-validation and reduction analysis; both refit the model on copies of
/// the data with rows disabled.
pub struct ResampleEngine {
    queue: WorkQueue<TablePair>,
}

impl ResampleEngine {
    pub fn new(interrupt: InterruptHandle) -> Self {
        Self {
            queue: WorkQueue::with_interrupt(interrupt),
        }
    }

    #[instrument(skip_all, name = "cross_validation_task", fields(kind = ?config.kind))]
    pub fn cross_validation(
        &self,
        context: &JobContext,
        config: &CrossValidationConfig,
    ) -> Result<JobResult, EngineError> {
        const METHOD: Method = Method::CrossValidation;
        config
            .validate()
            .map_err(|e| context.reject(METHOD, e.to_string()))?;
        self.queue.clear();

        let model = context.model;
        let enabled: Vec<usize> = model.dependent().enabled_rows().collect();
        let leave_count = config.kind.leave_count();
        if leave_count >= enabled.len().saturating_sub(1) {
            return Err(context.reject(
                METHOD,
                format!(
                    "requested leave-count exceeds available data points ({leave_count} of {} enabled rows)",
                    enabled.len()
                ),
            ));
        }

        context
            .reporter
            .report(Progress::PhaseStart { name: "Cross Validation" });
        let mut rng = seeded_rng(config.seed);
        let (algorithm, subsets) = leave_out_subsets(enabled.len(), config, &mut rng);
        info!(
            jobs = subsets.len(),
            ?algorithm,
            "Generating leave-out subsets."
        );

        let mut left_out = JobKeyMap::new();
        let mut items = Vec::with_capacity(subsets.len());
        for (key, positions) in subsets.into_iter().enumerate() {
            let rows: Vec<usize> = positions.into_iter().map(|p| enabled[p]).collect();
            items.push((key, without_rows(model, &rows)?));
            left_out.insert(key, rows);
        }
        let jobs = items.len();
        self.queue.enqueue_chunked(items, 1);

        context.reporter.report(Progress::TaskStart {
            total_steps: jobs as u64,
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

        let mut evaluator = model.clone_model();
        let predictions: Vec<LeftOutPrediction> = results
            .converged()
            .filter_map(|record| {
                let rows = left_out.get(&record.key)?.clone();
                evaluator.set_parameters(&record.parameters);
                Some(LeftOutPrediction {
                    key: record.key,
                    observed: rows.iter().map(|&r| model.dependent().row(r)).collect(),
                    predicted: rows.iter().map(|&r| evaluator.predict(r)).collect(),
                    rows,
                })
            })
            .collect();
        let press: f64 = predictions.iter().map(LeftOutPrediction::squared_error).sum();
        info!(jobs, converged, press, "Aggregating cross-validation results.");

        let parameters = sampled_statistics(model, &results, config.confidence, false);
        context.reporter.report(Progress::PhaseFinish);

        Ok(JobResult {
            controller: Controller::CrossValidation(config.clone()),
            parameters,
            diagnostics: Diagnostics::CrossValidation(CrossValidationDiagnostics {
                scheme: config.kind,
                algorithm,
                jobs,
                converged,
                left_out,
                predictions,
                press,
            }),
            interrupted,
            raw: config.store_raw.then_some(results),
        })
    }

    #[instrument(skip_all, name = "reduction_task", fields(runtype = ?config.runtype))]
    pub fn reduction(
        &self,
        context: &JobContext,
        config: &ReductionConfig,
    ) -> Result<JobResult, EngineError> {
        const METHOD: Method = Method::Reduction;
        config
            .validate()
            .map_err(|e| context.reject(METHOD, e.to_string()))?;
        self.queue.clear();

        let model = context.model;
        let enabled: Vec<usize> = model.dependent().enabled_rows().collect();
        let plan = reduction_plan(&enabled, config.runtype, config.minimum_rows);
        if plan.is_empty() {
            return Err(context.reject(
                METHOD,
                format!(
                    "{} enabled rows leave nothing to remove above the minimum of {}",
                    enabled.len(),
                    config.minimum_rows
                ),
            ));
        }

        context
            .reporter
            .report(Progress::PhaseStart { name: "Reduction Analysis" });
        info!(jobs = plan.len(), "Generating reduced datasets.");
        let mut left_out = JobKeyMap::new();
        let mut items = Vec::with_capacity(plan.len());
        for (key, (_, removed)) in plan.iter().enumerate() {
            items.push((key, without_rows(model, removed)?));
            left_out.insert(key, removed.clone());
        }
        self.queue.enqueue_chunked(items, 1);

        context.reporter.report(Progress::TaskStart {
            total_steps: plan.len() as u64,
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
        if results.converged_count() == 0 {
            context.reporter.report(Progress::PhaseFinish);
            return Err(context.empty(METHOD, results.len(), NONE_CONVERGED));
        }

        let independent = model.independent();
        let series = plan
            .iter()
            .enumerate()
            .filter_map(|(key, (side, removed))| {
                let record = results.get(key)?;
                let remaining = enabled.len() - removed.len();
                let outermost = match side {
                    ReductionSide::End => enabled[remaining - 1],
                    ReductionSide::Beginning => enabled[removed.len()],
                };
                let cutoff = if independent.columns() > 0 {
                    independent.value(outermost, 0)
                } else {
                    f64::NAN
                };
                Some(ReductionPoint {
                    key,
                    side: *side,
                    removed: removed.len(),
                    remaining,
                    cutoff,
                    parameters: record.parameters.clone(),
                    sse: record.sse,
                    converged: record.converged,
                })
            })
            .collect();

        let parameters = sampled_statistics(model, &results, config.confidence, false);
        context.reporter.report(Progress::PhaseFinish);

        Ok(JobResult {
            controller: Controller::Reduction(config.clone()),
            parameters,
            diagnostics: Diagnostics::Reduction(ReductionDiagnostics {
                runtype: config.runtype,
                minimum_rows: config.minimum_rows,
                left_out,
                series,
            }),
            interrupted,
            raw: config.store_raw.then_some(results),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fit::minimizer::LevenbergMarquardt;
    use crate::core::models::fixtures::fitted_saturation;
    use crate::engine::progress::ProgressReporter;
    use crate::engine::tasks::testing::recording;
    use crate::engine::worker::WorkerPool;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::Mutex;

    fn cross_validation(kind: CrossValidationKind) -> CrossValidationConfig {
        CrossValidationConfig {
            kind,
            seed: Some(11),
            ..CrossValidationConfig::default()
        }
    }

    fn assert_distinct(subsets: &[Vec<usize>], size: usize) {
        let unique: HashSet<&Vec<usize>> = subsets.iter().collect();
        assert_eq!(unique.len(), subsets.len());
        for subset in subsets {
            assert_eq!(subset.len(), size);
            assert!(subset.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn automatic_selection_follows_combinatorial_size() {
        let auto = SubsetAlgorithm::Automatic;
        assert_eq!(select_algorithm(10, 3, 1000, auto), SubsetAlgorithm::Precompute);
        assert_eq!(select_algorithm(100, 5, 1000, auto), SubsetAlgorithm::Random);
        assert_eq!(select_algorithm(30, 11, 1000, auto), SubsetAlgorithm::Random);
        // Large space, but the request covers most of it.
        assert_eq!(
            select_algorithm(20, 8, 120_000, auto),
            SubsetAlgorithm::Precompute
        );
        assert_eq!(
            select_algorithm(100, 5, 10, SubsetAlgorithm::Precompute),
            SubsetAlgorithm::Precompute
        );
    }

    #[test]
    fn enumeration_runs_everything_when_the_request_covers_it() {
        let mut rng = StdRng::seed_from_u64(1);
        let all = enumerated_subsets(10, 3, 500, &mut rng);
        assert_eq!(all.len(), 120);
        assert_distinct(&all, 3);

        let sampled = enumerated_subsets(10, 3, 20, &mut rng);
        assert_eq!(sampled.len(), 20);
        assert_distinct(&sampled, 3);
    }

    #[test]
    fn random_subsets_are_distinct_and_capped_by_the_space() {
        let mut rng = StdRng::seed_from_u64(2);
        let subsets = random_subsets(6, 2, 100, &mut rng);
        assert_eq!(subsets.len(), 15);
        assert_distinct(&subsets, 2);

        let few = random_subsets(40, 12, 25, &mut rng);
        assert_eq!(few.len(), 25);
        assert_distinct(&few, 12);
    }

    #[test]
    fn leave_one_out_disables_each_row_once() {
        let model = fitted_saturation(10, 1);
        let fitter = LevenbergMarquardt::default();
        let pool = WorkerPool::new(3).unwrap();
        let events = Mutex::new(Vec::new());
        let reporter = recording(&events);
        let context = JobContext::new(&model, &fitter, &pool, &reporter);

        let result = ResampleEngine::new(InterruptHandle::new())
            .cross_validation(&context, &cross_validation(CrossValidationKind::LeaveOneOut))
            .unwrap();
        drop(reporter);

        let Diagnostics::CrossValidation(d) = &result.diagnostics else {
            panic!("wrong diagnostics kind");
        };
        assert_eq!(d.jobs, 10);
        assert_eq!(d.left_out.len(), 10);
        for (key, rows) in &d.left_out {
            assert_eq!(rows, &vec![*key]);
        }
        assert!(d.converged > 0);
        assert_eq!(d.predictions.len(), d.converged);
        assert!(d.press.is_finite() && d.press >= 0.0);
        assert!(
            events
                .into_inner()
                .unwrap()
                .contains(&Progress::TaskStart { total_steps: 10 })
        );
    }

    #[test]
    fn leave_two_out_runs_every_pair_of_enabled_rows() {
        let mut model = fitted_saturation(12, 1);
        let mut dependent = model.dependent().clone();
        dependent.disable_row(5).unwrap();
        dependent.disable_row(6).unwrap();
        model.override_dependent(dependent);

        let fitter = LevenbergMarquardt::default();
        let pool = WorkerPool::new(2).unwrap();
        let reporter = ProgressReporter::new();
        let context = JobContext::new(&model, &fitter, &pool, &reporter);
        let result = ResampleEngine::new(InterruptHandle::new())
            .cross_validation(&context, &cross_validation(CrossValidationKind::LeaveTwoOut))
            .unwrap();

        let Diagnostics::CrossValidation(d) = &result.diagnostics else {
            panic!("wrong diagnostics kind");
        };
        assert_eq!(d.jobs, 45);
        assert!(
            d.left_out
                .values()
                .flatten()
                .all(|&row| row != 5 && row != 6)
        );
    }

    #[test]
    fn leave_x_out_enumerates_every_subset_when_requested() {
        let model = fitted_saturation(10, 1);
        let fitter = LevenbergMarquardt::default();
        let pool = WorkerPool::new(3).unwrap();
        let events = Mutex::new(Vec::new());
        let reporter = recording(&events);
        let context = JobContext::new(&model, &fitter, &pool, &reporter);
        let config = CrossValidationConfig {
            max_steps: 500,
            ..cross_validation(CrossValidationKind::LeaveXOut(3))
        };

        let result = ResampleEngine::new(InterruptHandle::new())
            .cross_validation(&context, &config)
            .unwrap();
        drop(reporter);

        let Diagnostics::CrossValidation(d) = &result.diagnostics else {
            panic!("wrong diagnostics kind");
        };
        assert_eq!(d.algorithm, SubsetAlgorithm::Precompute);
        assert_eq!(d.jobs, 120);
        assert_eq!(d.left_out.len(), 120);
        let subsets: Vec<Vec<usize>> = d.left_out.values().cloned().collect();
        assert_distinct(&subsets, 3);
        assert!(
            events
                .into_inner()
                .unwrap()
                .contains(&Progress::TaskStart { total_steps: 120 })
        );
    }

    #[test]
    fn leave_x_out_stops_at_the_requested_job_count() {
        let model = fitted_saturation(12, 1);
        let fitter = LevenbergMarquardt::default();
        let pool = WorkerPool::new(2).unwrap();
        let reporter = ProgressReporter::new();
        let context = JobContext::new(&model, &fitter, &pool, &reporter);

        for algorithm in [SubsetAlgorithm::Random, SubsetAlgorithm::Precompute] {
            let config = CrossValidationConfig {
                algorithm,
                max_steps: 20,
                ..cross_validation(CrossValidationKind::LeaveXOut(3))
            };
            let result = ResampleEngine::new(InterruptHandle::new())
                .cross_validation(&context, &config)
                .unwrap();

            let Diagnostics::CrossValidation(d) = &result.diagnostics else {
                panic!("wrong diagnostics kind");
            };
            assert_eq!(d.algorithm, algorithm);
            assert_eq!(d.jobs, 20);
            assert_eq!(d.left_out.len(), 20);
            let subsets: Vec<Vec<usize>> = d.left_out.values().cloned().collect();
            assert_distinct(&subsets, 3);
            assert!(d.left_out.values().flatten().all(|&row| row < 12));
        }
    }

    #[test]
    fn oversized_leave_count_is_rejected_before_enqueueing() {
        let model = fitted_saturation(10, 1);
        let fitter = LevenbergMarquardt::default();
        let pool = WorkerPool::new(1).unwrap();
        let events = Mutex::new(Vec::new());
        let reporter = recording(&events);
        let context = JobContext::new(&model, &fitter, &pool, &reporter);

        let err = ResampleEngine::new(InterruptHandle::new())
            .cross_validation(&context, &cross_validation(CrossValidationKind::LeaveXOut(9)))
            .unwrap_err();
        drop(reporter);

        assert!(matches!(
            err,
            EngineError::InvalidConfiguration {
                method: Method::CrossValidation,
                ref reason,
            } if reason.contains("exceeds available data points")
        ));
        let events = events.into_inner().unwrap();
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, Progress::TaskStart { .. }))
        );
        assert!(events.iter().any(|e| matches!(e, Progress::Warning(_))));
    }

    #[test]
    fn reduction_plan_trims_from_both_ends() {
        let enabled: Vec<usize> = (0..8).collect();
        let plan = reduction_plan(&enabled, ReductionRuntype::Both, 4);
        assert_eq!(plan.len(), 8);
        assert_eq!(plan[0], (ReductionSide::End, vec![7]));
        assert_eq!(plan[3], (ReductionSide::End, vec![4, 5, 6, 7]));
        assert_eq!(plan[4], (ReductionSide::Beginning, vec![0]));
        assert!(reduction_plan(&enabled, ReductionRuntype::FromEnd, 8).is_empty());
    }

    #[test]
    fn reduction_series_tracks_the_cutoff() {
        let model = fitted_saturation(12, 1);
        let fitter = LevenbergMarquardt::default();
        let pool = WorkerPool::new(2).unwrap();
        let reporter = ProgressReporter::new();
        let context = JobContext::new(&model, &fitter, &pool, &reporter);
        let config = ReductionConfig {
            runtype: ReductionRuntype::FromEnd,
            minimum_rows: 6,
            ..ReductionConfig::default()
        };

        let result = ResampleEngine::new(InterruptHandle::new())
            .reduction(&context, &config)
            .unwrap();
        let Diagnostics::Reduction(d) = &result.diagnostics else {
            panic!("wrong diagnostics kind");
        };
        assert_eq!(d.series.len(), 6);
        assert_eq!(d.left_out.len(), 6);
        for (step, point) in d.series.iter().enumerate() {
            assert_eq!(point.removed, step + 1);
            assert_eq!(point.remaining, 11 - step);
            let last = point.remaining - 1;
            assert_eq!(point.cutoff, model.independent().value(last, 0));
            let expected: Vec<usize> = (12 - (step + 1)..12).collect();
            assert_eq!(d.left_out[&point.key], expected);
        }
    }

    #[test]
    fn reduction_records_rows_around_disabled_ones() {
        let mut model = fitted_saturation(12, 1);
        let mut dependent = model.dependent().clone();
        dependent.disable_row(1).unwrap();
        dependent.disable_row(10).unwrap();
        model.override_dependent(dependent);

        let fitter = LevenbergMarquardt::default();
        let pool = WorkerPool::new(2).unwrap();
        let reporter = ProgressReporter::new();
        let context = JobContext::new(&model, &fitter, &pool, &reporter);
        let config = ReductionConfig {
            runtype: ReductionRuntype::Both,
            minimum_rows: 8,
            ..ReductionConfig::default()
        };

        let result = ResampleEngine::new(InterruptHandle::new())
            .reduction(&context, &config)
            .unwrap();
        let Diagnostics::Reduction(d) = &result.diagnostics else {
            panic!("wrong diagnostics kind");
        };
        assert_eq!(d.left_out.len(), 4);
        assert_eq!(d.left_out[&0], vec![11]);
        assert_eq!(d.left_out[&1], vec![9, 11]);
        assert_eq!(d.left_out[&2], vec![0]);
        assert_eq!(d.left_out[&3], vec![0, 2]);
    }

    #[test]
    fn reduction_without_removable_rows_is_rejected() {
        let model = fitted_saturation(8, 1);
        let fitter = LevenbergMarquardt::default();
        let pool = WorkerPool::new(1).unwrap();
        let reporter = ProgressReporter::new();
        let context = JobContext::new(&model, &fitter, &pool, &reporter);
        let err = ResampleEngine::new(InterruptHandle::new())
            .reduction(
                &context,
                &ReductionConfig {
                    minimum_rows: 8,
                    ..ReductionConfig::default()
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidConfiguration {
                method: Method::Reduction,
                ..
            }
        ));
    }
}
