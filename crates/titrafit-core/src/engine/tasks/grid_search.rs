use crate::core::fit::minimizer::Fitter;
use crate::core::models::model::Model;
use crate::engine::config::{Controller, GridSearchConfig, Method};
use crate::engine::context::JobContext;
use crate::engine::error::EngineError;
use crate::engine::progress::Progress;
use crate::engine::queue::{InterruptHandle, JobKey, WorkQueue};
use crate::engine::state::{Diagnostics, JobResult};
use crate::engine::statistics::{ConfidenceBar, ParameterStatistic};
use serde::Serialize;
use tracing::{debug, info, instrument};

const METHOD: Method = Method::GridSearch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    Downward,
    Upward,
}

impl Direction {
    pub const BOTH: [Direction; 2] = [Direction::Downward, Direction::Upward];

    pub fn sign(self) -> f64 {
        match self {
            Direction::Downward => -1.0,
            Direction::Upward => 1.0,
        }
    }
}

/// One directional search along one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileTask {
    pub parameter: usize,
    pub direction: Direction,
}

/// Classification of the most recent step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepState {
    Stepping,
    Overshot,
    ErrorDecreasing,
    ErrorConverging,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Termination {
    /// The SSE stayed above the threshold long enough.
    Converged,
    MaxStepsReached,
    /// The error surface is flat or keeps decreasing.
    Stationary,
    Interrupted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub overshot: usize,
    pub error_decrease: usize,
    pub error_convergency: usize,
}

/// Grid spacing `10^ceil(log10|value| + scaling_exponent)`; a zero value is
/// treated as magnitude one.
pub fn step_size(value: f64, scaling_exponent: f64) -> f64 {
    let magnitude = if value != 0.0 && value.is_finite() {
        value.abs().log10()
    } else {
        0.0
    };
    10f64.powi((magnitude + scaling_exponent).ceil() as i32)
}

/// Termination bookkeeping of a directional profile search.
///
/// Counters are cumulative over the whole search. The limit is the last
/// observed value whose SSE did not exceed the threshold, starting at the
/// optimum itself.
#[derive(Debug, Clone)]
pub struct ProfileSearch {
    threshold: f64,
    max_steps: usize,
    maxima: Counters,
    epsilon: f64,
    previous_sse: f64,
    steps: usize,
    counters: Counters,
    limit: f64,
    state: StepState,
}

impl ProfileSearch {
    pub fn new(start: f64, start_sse: f64, threshold: f64, config: &GridSearchConfig) -> Self {
        Self {
            threshold,
            max_steps: config.max_steps,
            maxima: Counters {
                overshot: config.overshot_max,
                error_decrease: config.error_decrease_max,
                error_convergency: config.error_convergency_max,
            },
            epsilon: config.convergency_epsilon,
            previous_sse: start_sse,
            steps: 0,
            counters: Counters::default(),
            limit: start,
            state: StepState::Stepping,
        }
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn limit(&self) -> f64 {
        self.limit
    }

    pub fn state(&self) -> StepState {
        self.state
    }

    /// Records the refit SSE at `value` and reports whether the search ends.
    pub fn observe(&mut self, value: f64, sse: f64) -> Option<Termination> {
        self.steps += 1;
        self.state = StepState::Stepping;

        if sse <= self.threshold {
            self.limit = value;
        } else {
            self.counters.overshot += 1;
            self.state = StepState::Overshot;
        }

        let scale = self.previous_sse.abs().max(f64::MIN_POSITIVE);
        if sse < self.previous_sse {
            self.counters.error_decrease += 1;
            if self.state == StepState::Stepping {
                self.state = StepState::ErrorDecreasing;
            }
        }
        if (sse - self.previous_sse).abs() <= self.epsilon * scale {
            self.counters.error_convergency += 1;
            if self.state == StepState::Stepping {
                self.state = StepState::ErrorConverging;
            }
        }
        if sse.is_finite() {
            self.previous_sse = sse;
        }

        if self.counters.overshot > self.maxima.overshot {
            Some(Termination::Converged)
        } else if self.counters.error_decrease > self.maxima.error_decrease
            || self.counters.error_convergency > self.maxima.error_convergency
        {
            Some(Termination::Stationary)
        } else if self.steps >= self.max_steps {
            Some(Termination::MaxStepsReached)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TracePoint {
    pub value: f64,
    pub sse: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectionOutcome {
    pub parameter: usize,
    pub direction: Direction,
    pub limit: f64,
    pub termination: Termination,
    pub steps: usize,
    pub counters: Counters,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<TracePoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GridSearchDiagnostics {
    pub threshold: f64,
    pub directions: Vec<DirectionOutcome>,
}

struct SearchSettings<'a> {
    fitter: &'a dyn Fitter,
    config: &'a GridSearchConfig,
    threshold: f64,
    optimum_sse: f64,
    interrupt: &'a InterruptHandle,
}

fn profile(model: &mut dyn Model, task: ProfileTask, settings: &SearchSettings) -> DirectionOutcome {
    let mut parameters = model.parameters().to_vec();
    let start = parameters[task.parameter];
    let delta = step_size(start, settings.config.scaling_exponent) * task.direction.sign();
    let mut locked = vec![false; parameters.len()];
    locked[task.parameter] = true;

    let mut search = ProfileSearch::new(
        start,
        settings.optimum_sse,
        settings.threshold,
        settings.config,
    );
    let mut trace = Vec::new();

    let termination = loop {
        if settings.interrupt.is_interrupted() {
            break Termination::Interrupted;
        }
        let value = start + delta * (search.steps() + 1) as f64;
        parameters[task.parameter] = value;
        model.set_parameters(&parameters);
        let outcome = settings.fitter.fit(model, &locked);
        // Continue from the refitted point so the next step starts close by.
        if outcome.converged && outcome.parameters.iter().all(|p| p.is_finite()) {
            parameters = outcome.parameters;
        }
        if settings.config.store_raw {
            trace.push(TracePoint {
                value,
                sse: outcome.sse,
            });
        }
        if let Some(termination) = search.observe(value, outcome.sse) {
            break termination;
        }
    };

    debug!(
        parameter = task.parameter,
        direction = ?task.direction,
        ?termination,
        steps = search.steps(),
        "Profile search finished"
    );
    DirectionOutcome {
        parameter: task.parameter,
        direction: task.direction,
        limit: search.limit(),
        termination,
        steps: search.steps(),
        counters: search.counters(),
        trace,
    }
}

/// Profile-likelihood style confidence limits.
///
/// Each selected parameter is stepped away from the optimum in both directions
/// while the others are refitted; the last value still inside the F-statistic
/// threshold becomes the limit in that direction.
pub struct ProfileGridSearch {
    queue: WorkQueue<ProfileTask>,
}

impl ProfileGridSearch {
    pub fn new(interrupt: InterruptHandle) -> Self {
        Self {
            queue: WorkQueue::with_interrupt(interrupt),
        }
    }

    #[instrument(skip_all, name = "grid_search_task")]
    pub fn run(
        &self,
        context: &JobContext,
        config: &GridSearchConfig,
    ) -> Result<JobResult, EngineError> {
        config
            .validate()
            .map_err(|e| context.reject(METHOD, e.to_string()))?;
        self.queue.clear();

        let model = context.model;
        let selected = context.select_parameters(METHOD, config.parameters.as_deref(), false)?;
        let threshold = context.threshold(METHOD, config.confidence)?;

        context
            .reporter
            .report(Progress::PhaseStart { name: "Grid Search" });
        info!(
            parameters = selected.len(),
            threshold, "Starting profile grid search."
        );

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
        let total = tasks.len();
        self.queue.enqueue_chunked(tasks, 1);

        let interrupt = self.queue.interrupt_handle();
        let settings = SearchSettings {
            fitter: context.fitter,
            config,
            threshold,
            optimum_sse: model.sse(),
            interrupt: &interrupt,
        };
        let job = |m: &mut dyn Model, _: JobKey, task: ProfileTask| profile(m, task, &settings);

        context.reporter.report(Progress::TaskStart {
            total_steps: total as u64,
        });
        let outcomes = context
            .pool
            .drain(model, &self.queue, &job, context.reporter);
        context.reporter.report(Progress::TaskFinish);

        let directions: Vec<DirectionOutcome> = outcomes.into_values().collect();
        let interrupted = self.queue.is_interrupted()
            || directions.len() < total
            || directions
                .iter()
                .any(|d| d.termination == Termination::Interrupted);

        let names = model.parameter_names();
        let parameters = selected
            .iter()
            .map(|&index| {
                let value = model.parameters()[index];
                let limit = |direction| {
                    directions
                        .iter()
                        .find(|d| d.parameter == index && d.direction == direction)
                        .map_or(value, |d| d.limit)
                };
                ParameterStatistic {
                    index,
                    name: names.get(index).cloned().unwrap_or_default(),
                    value,
                    confidence: config.confidence,
                    bar: ConfidenceBar {
                        lower: limit(Direction::Downward),
                        upper: limit(Direction::Upward),
                    },
                    summary: None,
                    samples: None,
                }
            })
            .collect();
        context.reporter.report(Progress::PhaseFinish);

        Ok(JobResult {
            controller: Controller::GridSearch(config.clone()),
            parameters,
            diagnostics: Diagnostics::GridSearch(GridSearchDiagnostics {
                threshold,
                directions,
            }),
            interrupted,
            raw: None,
        })
    }
}
