use super::config::Method;
use super::error::EngineError;
use super::progress::ProgressReporter;
use super::statistics::f_threshold;
use super::worker::WorkerPool;
use crate::core::fit::minimizer::Fitter;
use crate::core::models::model::Model;
use tracing::warn;

pub const NONE_CONVERGED: &str = "none of the fits converged";

/// Everything an engine run needs besides its controller.
///
/// The template model is only read; workers clone it before fitting.
#[derive(Clone, Copy)]
pub struct JobContext<'a> {
    pub model: &'a dyn Model,
    pub fitter: &'a dyn Fitter,
    pub pool: &'a WorkerPool,
    pub reporter: &'a ProgressReporter<'a>,
}

impl<'a> JobContext<'a> {
    pub fn new(
        model: &'a dyn Model,
        fitter: &'a dyn Fitter,
        pool: &'a WorkerPool,
        reporter: &'a ProgressReporter<'a>,
    ) -> Self {
        Self {
            model,
            fitter,
            pool,
            reporter,
        }
    }

    /// Rejects a run before any work is enqueued, warning the user.
    pub fn reject(&self, method: Method, reason: impl Into<String>) -> EngineError {
        let reason = reason.into();
        warn!(%method, %reason, "Job rejected");
        self.reporter.warn(format!("{method}: {reason}"));
        EngineError::InvalidConfiguration { method, reason }
    }

    /// Reports a run whose aggregation found nothing usable.
    pub fn empty(&self, method: Method, total: usize, reason: impl Into<String>) -> EngineError {
        let reason = reason.into();
        warn!(%method, total, %reason, "Nothing usable to aggregate");
        self.reporter.warn(format!("{method}: {reason}"));
        EngineError::EmptyAggregation {
            method,
            total,
            reason,
        }
    }

    /// F-statistic SSE threshold of the template model at `confidence`.
    pub fn threshold(&self, method: Method, confidence: f64) -> Result<f64, EngineError> {
        f_threshold(
            self.model.sse(),
            self.model.parameter_count(),
            self.model.data_points(),
            confidence,
        )
        .ok_or_else(|| {
            self.reject(
                method,
                "no degrees of freedom left for an F-statistic threshold",
            )
        })
    }

    /// Resolves the parameter indices a search should cover.
    ///
    /// Without a request the global parameters are selected when
    /// `prefer_globals` is set and the model has any, otherwise every
    /// parameter. An explicit empty request is rejected.
    pub fn select_parameters(
        &self,
        method: Method,
        requested: Option<&[usize]>,
        prefer_globals: bool,
    ) -> Result<Vec<usize>, EngineError> {
        let count = self.model.parameter_count();
        if let Some(bad) = requested.into_iter().flatten().find(|&&i| i >= count) {
            return Err(self.reject(
                method,
                format!("parameter index {bad} out of range for {count} parameters"),
            ));
        }
        let mut selected: Vec<usize> = if let Some(requested) = requested {
            requested.to_vec()
        } else if prefer_globals && self.model.global_parameter_count() > 0 {
            (0..self.model.global_parameter_count().min(count)).collect()
        } else {
            (0..count).collect()
        };
        selected.sort_unstable();
        selected.dedup();
        if selected.is_empty() {
            return Err(self.reject(method, "no parameters selected for testing"));
        }
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fit::minimizer::LevenbergMarquardt;
    use crate::core::models::fixtures::fitted_saturation;
    use crate::engine::progress::Progress;
    use std::sync::Mutex;

    #[test]
    fn select_parameters_defaults() {
        let model = fitted_saturation(10, 2);
        let fitter = LevenbergMarquardt::default();
        let pool = WorkerPool::new(1).unwrap();
        let reporter = ProgressReporter::new();
        let ctx = JobContext::new(&model, &fitter, &pool, &reporter);

        assert_eq!(
            ctx.select_parameters(Method::GridSearch, None, false).unwrap(),
            vec![0, 1, 2, 3, 4]
        );
        assert_eq!(
            ctx.select_parameters(Method::FastConfidence, None, true).unwrap(),
            vec![0]
        );
        assert_eq!(
            ctx.select_parameters(Method::GridSearch, Some(&[3, 1, 3]), false)
                .unwrap(),
            vec![1, 3]
        );
    }

    #[test]
    fn out_of_range_parameters_are_rejected_with_a_warning() {
        let model = fitted_saturation(10, 1);
        let fitter = LevenbergMarquardt::default();
        let pool = WorkerPool::new(1).unwrap();
        let warnings = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            if let Progress::Warning(message) = event {
                warnings.lock().unwrap().push(message);
            }
        }));
        let ctx = JobContext::new(&model, &fitter, &pool, &reporter);

        let err = ctx
            .select_parameters(Method::ModelComparison, Some(&[7]), true)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidConfiguration {
                method: Method::ModelComparison,
                ..
            }
        ));
        drop(reporter);
        assert_eq!(warnings.into_inner().unwrap().len(), 1);
    }

    #[test]
    fn threshold_is_above_the_optimum_sse() {
        let model = fitted_saturation(10, 1);
        let fitter = LevenbergMarquardt::default();
        let pool = WorkerPool::new(1).unwrap();
        let reporter = ProgressReporter::new();
        let ctx = JobContext::new(&model, &fitter, &pool, &reporter);
        let threshold = ctx.threshold(Method::GridSearch, 95.0).unwrap();
        assert!(threshold > model.sse());
    }

    #[test]
    fn explicit_empty_selection_is_rejected() {
        let model = fitted_saturation(10, 1);
        let fitter = LevenbergMarquardt::default();
        let pool = WorkerPool::new(1).unwrap();
        let reporter = ProgressReporter::new();
        let ctx = JobContext::new(&model, &fitter, &pool, &reporter);

        let err = ctx
            .select_parameters(Method::GridSearch, Some(&[]), false)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfiguration { .. }));
        assert_eq!(
            ctx.select_parameters(Method::GridSearch, None, false).unwrap(),
            vec![0, 1, 2]
        );
    }
}
