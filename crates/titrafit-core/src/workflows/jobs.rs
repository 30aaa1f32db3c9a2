use crate::core::fit::minimizer::{FitOutcome, Fitter};
use crate::core::models::model::Model;
use crate::engine::config::{Controller, Method};
use crate::engine::context::JobContext;
use crate::engine::error::EngineError;
use crate::engine::progress::ProgressReporter;
use crate::engine::queue::InterruptHandle;
use crate::engine::state::{JobResult, StatisticsStore};
use crate::engine::tasks::grid_search::ProfileGridSearch;
use crate::engine::tasks::model_comparison::ModelComparisonEngine;
use crate::engine::tasks::monte_carlo::MonteCarloEngine;
use crate::engine::tasks::resample::ResampleEngine;
use crate::engine::worker::WorkerPool;
use tracing::{info, instrument, warn};

/// A model together with the statistics gathered for its current optimum.
#[derive(Debug, Clone)]
pub struct AnalysedModel {
    pub model: Box<dyn Model>,
    pub statistics: StatisticsStore,
}

impl AnalysedModel {
    pub fn new(model: Box<dyn Model>) -> Self {
        Self {
            model,
            statistics: StatisticsStore::new(),
        }
    }
}

/// Routes controllers to long-lived engines sharing one worker pool.
///
/// Every engine queue observes the dispatcher's interrupt flag, so a handle
/// obtained from [`JobDispatcher::interrupt_handle`] stops whichever run is
/// active. The flag stays raised, refusing further jobs, until
/// [`JobDispatcher::reset_interrupt`] lowers it.
pub struct JobDispatcher {
    pool: WorkerPool,
    fitter: Box<dyn Fitter>,
    interrupt: InterruptHandle,
    monte_carlo: MonteCarloEngine,
    grid_search: ProfileGridSearch,
    model_comparison: ModelComparisonEngine,
    resample: ResampleEngine,
}

impl JobDispatcher {
    pub fn new(threads: usize, fitter: Box<dyn Fitter>) -> Result<Self, EngineError> {
        let pool = WorkerPool::new(threads)?;
        let interrupt = InterruptHandle::new();
        info!(threads = pool.threads(), "Worker pool ready.");
        Ok(Self {
            pool,
            fitter,
            monte_carlo: MonteCarloEngine::new(interrupt.clone()),
            grid_search: ProfileGridSearch::new(interrupt.clone()),
            model_comparison: ModelComparisonEngine::new(interrupt.clone()),
            resample: ResampleEngine::new(interrupt.clone()),
            interrupt,
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.threads()
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    pub fn interrupt(&self) {
        self.interrupt.interrupt();
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_interrupted()
    }

    /// Lowers the interrupt flag so new jobs can start.
    pub fn reset_interrupt(&self) {
        if self.interrupt.is_interrupted() {
            info!("Interrupt cleared; accepting jobs again.");
        }
        self.interrupt.reset();
    }

    /// Fits every parameter of the model and drops statistics of the old optimum.
    pub fn fit(&self, analysed: &mut AnalysedModel) -> FitOutcome {
        let locked = vec![false; analysed.model.parameter_count()];
        let outcome = self.fitter.fit(analysed.model.as_mut(), &locked);
        if !analysed.statistics.is_empty() {
            info!(
                runs = analysed.statistics.len(),
                "Discarding statistics of the previous optimum."
            );
            analysed.statistics.clear();
        }
        outcome
    }

    /// Runs one job against `model` without storing the result.
    #[instrument(skip_all, name = "dispatch_job", fields(method = %controller.method()))]
    pub fn run(
        &self,
        controller: &Controller,
        model: &dyn Model,
        reporter: &ProgressReporter,
    ) -> Result<JobResult, EngineError> {
        let method = controller.method();
        if self.interrupt.is_interrupted() {
            warn!("Interrupt pending; job not started");
            return Err(EngineError::Interrupted { method });
        }
        info!("Dispatching job to its engine.");
        let context = JobContext::new(model, self.fitter.as_ref(), &self.pool, reporter);
        let result = match controller {
            Controller::MonteCarlo(config) => self.monte_carlo.run(&context, config),
            Controller::GridSearch(config) => self.grid_search.run(&context, config),
            Controller::ModelComparison(config) => self.model_comparison.run(&context, config),
            Controller::FastConfidence(config) => {
                self.model_comparison.fast_confidence(&context, config)
            }
            Controller::CrossValidation(config) => self.resample.cross_validation(&context, config),
            Controller::Reduction(config) => self.resample.reduction(&context, config),
        }?;
        if result.interrupted {
            warn!("Job was interrupted; its statistics cover a partial run");
        }
        Ok(result)
    }

    /// Runs one job and merges its result into the model's statistics store.
    ///
    /// Returns the position of the stored run within its method's list.
    pub fn submit(
        &self,
        controller: &Controller,
        analysed: &mut AnalysedModel,
        reporter: &ProgressReporter,
    ) -> Result<usize, EngineError> {
        let result = self.run(controller, analysed.model.as_ref(), reporter)?;
        Ok(analysed.statistics.merge(result))
    }
}

#[derive(Debug)]
pub enum JobStatus {
    Stored(usize),
    Failed(EngineError),
    /// Not started because an interrupt was pending.
    Skipped,
}

#[derive(Debug)]
pub struct JobOutcome {
    pub method: Method,
    pub status: JobStatus,
}

/// Submits a list of jobs in order.
///
/// A failed job does not stop the list. Once an interrupt is pending every
/// remaining job is skipped; the flag is not lowered here.
pub fn run_jobs(
    dispatcher: &JobDispatcher,
    controllers: &[Controller],
    analysed: &mut AnalysedModel,
    reporter: &ProgressReporter,
) -> Vec<JobOutcome> {
    let mut outcomes = Vec::with_capacity(controllers.len());
    for controller in controllers {
        let method = controller.method();
        let status = match dispatcher.submit(controller, analysed, reporter) {
            Ok(index) => JobStatus::Stored(index),
            Err(EngineError::Interrupted { .. }) => JobStatus::Skipped,
            Err(e) => JobStatus::Failed(e),
        };
        outcomes.push(JobOutcome { method, status });
    }

    let failed = outcomes
        .iter()
        .filter(|o| !matches!(o.status, JobStatus::Stored(_)))
        .count();
    info!(
        jobs = outcomes.len(),
        failed, "Job list complete."
    );
    outcomes
}
