use super::error::EngineError;
use super::progress::{Progress, ProgressReporter};
use super::queue::{JobKey, WorkQueue};
use crate::core::data::table::DataTable;
use crate::core::fit::minimizer::Fitter;
use crate::core::models::model::Model;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, trace};

/// Replacement tables for one refit.
#[derive(Debug, Clone, PartialEq)]
pub struct TablePair {
    pub independent: DataTable,
    pub dependent: DataTable,
}

/// Outcome of one job: the exported parameters and the convergence flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitRecord {
    pub key: JobKey,
    pub parameters: Vec<f64>,
    pub sse: f64,
    pub converged: bool,
}

/// Job that overrides both tables of the worker's model and refits it.
pub fn refit(fitter: &dyn Fitter) -> impl Fn(&mut dyn Model, JobKey, TablePair) -> FitRecord + Sync + '_ {
    move |model, key, tables| {
        model.override_independent(tables.independent);
        model.override_dependent(tables.dependent);
        let locked = vec![false; model.parameter_count()];
        let outcome = fitter.fit(model, &locked);
        FitRecord {
            key,
            parameters: outcome.parameters,
            sse: outcome.sse,
            converged: outcome.converged,
        }
    }
}

/// Batch size giving each thread roughly ten batches.
pub fn batch_size(total: usize, threads: usize) -> usize {
    (total / (threads.max(1) * 10)).max(1)
}

/// Drains a queue with a private clone of the template model.
///
/// Before every item the clone is reset to the template's parameters, so each
/// job starts from the fitted optimum regardless of what the previous job did.
pub struct Worker<'q, T> {
    model: Box<dyn Model>,
    seed: Vec<f64>,
    queue: &'q WorkQueue<T>,
}

impl<'q, T> Worker<'q, T> {
    pub fn new(template: &dyn Model, queue: &'q WorkQueue<T>) -> Self {
        Self {
            seed: template.parameters().to_vec(),
            model: template.clone_model(),
            queue,
        }
    }

    pub fn run<R, F>(mut self, job: &F, reporter: &ProgressReporter) -> Vec<(JobKey, R)>
    where
        F: Fn(&mut dyn Model, JobKey, T) -> R,
    {
        let mut results = Vec::new();
        while let Some(batch) = self.queue.demand() {
            for (key, item) in batch.into_items() {
                if self.queue.is_interrupted() {
                    trace!(key, "Worker observed interrupt");
                    return results;
                }
                self.model.set_parameters(&self.seed);
                results.push((key, job(self.model.as_mut(), key, item)));
                reporter.report(Progress::TaskIncrement);
            }
        }
        results
    }
}

/// Bounded pool of named threads shared by all engine runs.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    threads: usize,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Result<Self, EngineError> {
        let threads = threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("titrafit-worker-{i}"))
            .build()
            .map_err(|e| EngineError::ThreadPool(e.to_string()))?;
        Ok(Self { pool, threads })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Runs one worker per thread until `queue` is exhausted or interrupted.
    ///
    /// Blocks until every worker has returned. Results are keyed by job key; the
    /// order in which workers produced them is not observable.
    pub fn drain<T, R, F>(
        &self,
        template: &dyn Model,
        queue: &WorkQueue<T>,
        job: &F,
        reporter: &ProgressReporter,
    ) -> BTreeMap<JobKey, R>
    where
        T: Send,
        R: Send,
        F: Fn(&mut dyn Model, JobKey, T) -> R + Sync,
    {
        let partials = Mutex::new(Vec::with_capacity(self.threads));
        self.pool.scope(|scope| {
            for _ in 0..self.threads {
                scope.spawn(|_| {
                    let results = Worker::new(template, queue).run(job, reporter);
                    partials
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(results);
                });
            }
        });

        let collected: BTreeMap<JobKey, R> = partials
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_iter()
            .flatten()
            .collect();
        debug!(results = collected.len(), "Worker pool drained");
        collected
    }
}
