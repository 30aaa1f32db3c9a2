use super::grid_search::{Direction, ProfileTask};
use super::seeded_rng;
use crate::core::fit::minimizer::Fitter;
use crate::core::models::model::Model;
use crate::engine::config::{Controller, FastConfidenceConfig, Method, ModelComparisonConfig};
use crate::engine::context::{JobContext, NONE_CONVERGED};
use crate::engine::error::EngineError;
use crate::engine::progress::Progress;
use crate::engine::queue::{InterruptHandle, JobKey, WorkQueue};
use crate::engine::state::{Diagnostics, JobResult};
use crate::engine::statistics::{ConfidenceBar, ParameterStatistic, ResultSet};
use crate::engine::worker::{FitRecord, batch_size};
use rand::Rng;
use serde::Serialize;
use tracing::{info, instrument, warn};

/// Result of one bisection towards the threshold crossing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LimitOutcome {
    pub parameter: usize,
    pub direction: Direction,
    pub limit: f64,
    pub iterations: usize,
    pub converged: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FastConfidenceDiagnostics {
    pub threshold: f64,
    pub limits: Vec<LimitOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoxEdge {
    pub parameter: usize,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelComparisonDiagnostics {
    pub threshold: f64,
    pub sampling_box: Vec<BoxEdge>,
    pub box_area: f64,
    /// Box area scaled by the fraction of samples inside the region.
    pub ellipsoid_area: f64,
    pub inside: usize,
    pub total: usize,
    pub pre_pass: Vec<LimitOutcome>,
}

/// SSE with one parameter moved away from `base`, optionally refitting the rest.
fn evaluate_point(
    model: &mut dyn Model,
    fitter: &dyn Fitter,
    base: &[f64],
    locked: &[bool],
    relax: bool,
) -> (f64, bool) {
    model.set_parameters(base);
    if relax {
        let outcome = fitter.fit(model, locked);
        (outcome.sse, outcome.converged)
    } else {
        (model.sse(), true)
    }
}

/// Bisection for the value where the SSE crosses `threshold` along one
/// parameter, starting at the model's current parameters.
///
/// Steps outward with a constant step while the SSE stays below the threshold
/// and halves the step after every overshoot. When no crossing is located
/// within the iteration budget the last inside value is returned.
pub fn single_limit(
    model: &mut dyn Model,
    fitter: &dyn Fitter,
    task: ProfileTask,
    threshold: f64,
    config: &FastConfidenceConfig,
) -> LimitOutcome {
    let optimum = model.parameters().to_vec();
    let start = optimum[task.parameter];
    let sign = task.direction.sign();
    let tolerance = config.tolerance * threshold.abs().max(f64::MIN_POSITIVE);
    let resolution = f64::EPSILON * start.abs().max(1.0);
    let mut locked = vec![false; optimum.len()];
    locked[task.parameter] = true;

    let mut step = config.initial_step * start.abs().max(1.0);
    let mut inside = start;
    let mut candidate = start + sign * step;
    let mut crossing = None;
    let mut iterations = 0;

    while iterations < config.max_iterations {
        iterations += 1;
        let mut trial = optimum.clone();
        trial[task.parameter] = candidate;
        let (sse, _) = evaluate_point(model, fitter, &trial, &locked, config.relax);

        if (sse - threshold).abs() <= tolerance {
            crossing = Some(candidate);
            break;
        }
        if sse < threshold {
            inside = candidate;
        } else {
            step *= 0.5;
        }
        if step <= resolution {
            crossing = Some(inside);
            break;
        }
        candidate = inside + sign * step;
    }

    model.set_parameters(&optimum);
    LimitOutcome {
        parameter: task.parameter,
        direction: task.direction,
        limit: crossing.unwrap_or(inside),
        iterations,
        converged: crossing.is_some(),
    }
}

fn bars_from_limits(
    model: &dyn Model,
    selected: &[usize],
    limits: &[LimitOutcome],
    confidence: f64,
) -> Vec<ParameterStatistic> {
    let names = model.parameter_names();
    selected
        .iter()
        .map(|&index| {
            let value = model.parameters()[index];
            let limit = |direction| {
                limits
                    .iter()
                    .find(|l| l.parameter == index && l.direction == direction)
                    .map_or(value, |l| l.limit)
            };
            ParameterStatistic {
                index,
                name: names.get(index).cloned().unwrap_or_default(),
                value,
                confidence,
                bar: ConfidenceBar {
                    lower: limit(Direction::Downward),
                    upper: limit(Direction::Upward),
                },
                summary: None,
                samples: None,
            }
        })
        .collect()
}

/// Joint confidence region search and the fast single-parameter bisection.
pub struct ModelComparisonEngine {
    limits: WorkQueue<ProfileTask>,
    samples: WorkQueue<Vec<f64>>,
}

impl ModelComparisonEngine {
    pub fn new(interrupt: InterruptHandle) -> Self {
        Self {
            limits: WorkQueue::with_interrupt(interrupt.clone()),
            samples: WorkQueue::with_interrupt(interrupt),
        }
    }

    fn bracket(
        &self,
        context: &JobContext,
        selected: &[usize],
        threshold: f64,
        config: &FastConfidenceConfig,
    ) -> Vec<LimitOutcome> {
        let tasks: Vec<(JobKey, ProfileTask)> = selected
            .iter()
            .flat_map(|&parameter| {
                Direction::BOTH.map(|direction| ProfileTask {
                    parameter,
                    direction,
                })
            })
            .enumerate()
            .collect();
        self.limits.enqueue_chunked(tasks, 1);

        let fitter = context.fitter;
        let job = |m: &mut dyn Model, _: JobKey, task: ProfileTask| {
            single_limit(m, fitter, task, threshold, config)
        };
        let limits = context
            .pool
            .drain(context.model, &self.limits, &job, context.reporter);

        let limits: Vec<LimitOutcome> = limits.into_values().collect();
        let unresolved = limits.iter().filter(|l| !l.converged).count();
        if unresolved > 0 {
            warn!(unresolved, "Some limits did not reach the threshold crossing");
        }
        limits
    }

    #[instrument(skip_all, name = "fast_confidence_task")]
    pub fn fast_confidence(
        &self,
        context: &JobContext,
        config: &FastConfidenceConfig,
    ) -> Result<JobResult, EngineError> {
        const METHOD: Method = Method::FastConfidence;
        config
            .validate()
            .map_err(|e| context.reject(METHOD, e.to_string()))?;
        self.limits.clear();

        let selected = context.select_parameters(METHOD, config.parameters.as_deref(), true)?;
        let threshold = context.threshold(METHOD, config.confidence)?;
        context
            .reporter
            .report(Progress::PhaseStart { name: "Fast Confidence" });
        info!(
            parameters = selected.len(),
            threshold, "Bisecting single-parameter confidence limits."
        );

        context.reporter.report(Progress::TaskStart {
            total_steps: 2 * selected.len() as u64,
        });
        let limits = self.bracket(context, &selected, threshold, config);
        context.reporter.report(Progress::TaskFinish);
        let interrupted = self.limits.is_interrupted() || limits.len() < 2 * selected.len();
        let parameters = bars_from_limits(context.model, &selected, &limits, config.confidence);
        context.reporter.report(Progress::PhaseFinish);

        Ok(JobResult {
            controller: Controller::FastConfidence(config.clone()),
            parameters,
            diagnostics: Diagnostics::FastConfidence(FastConfidenceDiagnostics { threshold, limits }),
            interrupted,
            raw: None,
        })
    }

    #[instrument(skip_all, name = "model_comparison_task", fields(steps = config.max_steps))]
    pub fn run(
        &self,
        context: &JobContext,
        config: &ModelComparisonConfig,
    ) -> Result<JobResult, EngineError> {
        const METHOD: Method = Method::ModelComparison;
        config
            .validate()
            .map_err(|e| context.reject(METHOD, e.to_string()))?;
        self.limits.clear();
        self.samples.clear();

        let model = context.model;
        let selected = context.select_parameters(METHOD, config.parameters.as_deref(), true)?;
        let threshold = context.threshold(METHOD, config.confidence)?;
        context
            .reporter
            .report(Progress::PhaseStart { name: "Model Comparison" });
        info!(
            parameters = selected.len(),
            threshold, "Sizing the confidence box."
        );

        // One progress task covers the bracketing pre-pass and the box samples.
        context.reporter.report(Progress::TaskStart {
            total_steps: (2 * selected.len() + config.max_steps) as u64,
        });
        let pre_pass = self.bracket(context, &selected, threshold, &config.bracketing());
        let scale = config.box_scaling_factor;
        let sampling_box: Vec<BoxEdge> = bars_from_limits(model, &selected, &pre_pass, config.confidence)
            .into_iter()
            .map(|p| {
                let lower = p.value - scale * (p.value - p.bar.lower);
                let upper = p.value + scale * (p.bar.upper - p.value);
                BoxEdge {
                    parameter: p.index,
                    lower: lower.min(upper),
                    upper: lower.max(upper),
                }
            })
            .collect();
        let box_area: f64 = sampling_box.iter().map(|e| e.upper - e.lower).product();

        let mut rng = seeded_rng(config.seed);
        let points: Vec<(JobKey, Vec<f64>)> = (0..config.max_steps)
            .map(|key| {
                let point = sampling_box
                    .iter()
                    .map(|e| {
                        if e.upper > e.lower {
                            rng.gen_range(e.lower..=e.upper)
                        } else {
                            e.lower
                        }
                    })
                    .collect();
                (key, point)
            })
            .collect();
        self.samples
            .enqueue_chunked(points, batch_size(config.max_steps, context.pool.threads()));

        info!(samples = config.max_steps, box_area, "Sampling the confidence box.");
        let mut locked = vec![false; model.parameter_count()];
        for edge in &sampling_box {
            locked[edge.parameter] = true;
        }
        let fitter = context.fitter;
        let edges = &sampling_box;
        let job = |m: &mut dyn Model, key: JobKey, point: Vec<f64>| {
            let mut base = m.parameters().to_vec();
            for (edge, value) in edges.iter().zip(point) {
                base[edge.parameter] = value;
            }
            let (sse, converged) = evaluate_point(m, fitter, &base, &locked, config.relax);
            FitRecord {
                key,
                parameters: m.parameters().to_vec(),
                sse,
                converged,
            }
        };
        let records = context
            .pool
            .drain(model, &self.samples, &job, context.reporter);
        context.reporter.report(Progress::TaskFinish);
        let interrupted = self.samples.is_interrupted();

        let results: ResultSet = records.into_values().collect();
        let accepted: Vec<&FitRecord> = results
            .converged()
            .filter(|r| r.sse <= threshold)
            .collect();
        if accepted.is_empty() {
            context.reporter.report(Progress::PhaseFinish);
            let reason = if results.converged_count() == 0 {
                NONE_CONVERGED
            } else {
                "no converged sample fell inside the confidence region"
            };
            return Err(context.empty(METHOD, results.len(), reason));
        }

        let names = model.parameter_names();
        let parameters = selected
            .iter()
            .map(|&index| {
                let value = model.parameters()[index];
                let (lower, upper) = accepted
                    .iter()
                    .map(|r| r.parameters[index])
                    .fold((value, value), |(lo, hi), v| (lo.min(v), hi.max(v)));
                ParameterStatistic {
                    index,
                    name: names.get(index).cloned().unwrap_or_default(),
                    value,
                    confidence: config.confidence,
                    bar: ConfidenceBar { lower, upper },
                    summary: None,
                    samples: None,
                }
            })
            .collect();

        let inside = accepted.len();
        let total = results.len();
        let diagnostics = ModelComparisonDiagnostics {
            threshold,
            box_area,
            ellipsoid_area: inside as f64 / total as f64 * box_area,
            inside,
            total,
            sampling_box,
            pre_pass,
        };
        context.reporter.report(Progress::PhaseFinish);

        Ok(JobResult {
            controller: Controller::ModelComparison(config.clone()),
            parameters,
            diagnostics: Diagnostics::ModelComparison(diagnostics),
            interrupted,
            raw: config.store_raw.then_some(results),
        })
    }
}
