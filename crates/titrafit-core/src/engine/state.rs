use super::config::{Controller, Method};
use super::statistics::{ParameterStatistic, ResultSet};
use super::tasks::grid_search::GridSearchDiagnostics;
use super::tasks::model_comparison::{FastConfidenceDiagnostics, ModelComparisonDiagnostics};
use super::tasks::monte_carlo::MonteCarloDiagnostics;
use super::tasks::resample::{CrossValidationDiagnostics, ReductionDiagnostics};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Method specific by-products of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Diagnostics {
    MonteCarlo(MonteCarloDiagnostics),
    GridSearch(GridSearchDiagnostics),
    ModelComparison(ModelComparisonDiagnostics),
    FastConfidence(FastConfidenceDiagnostics),
    CrossValidation(CrossValidationDiagnostics),
    Reduction(ReductionDiagnostics),
}

/// Aggregated output of one engine run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobResult {
    pub controller: Controller,
    pub parameters: Vec<ParameterStatistic>,
    pub diagnostics: Diagnostics,
    /// True when the run was interrupted and aggregated from partial results.
    pub interrupted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<ResultSet>,
}

impl JobResult {
    pub fn method(&self) -> Method {
        self.controller.method()
    }

    pub fn parameter(&self, index: usize) -> Option<&ParameterStatistic> {
        self.parameters.iter().find(|p| p.index == index)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub fingerprint: String,
    #[serde(flatten)]
    pub result: JobResult,
}

/// Per-model record of every analysis run, keyed by method tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatisticsStore {
    runs: BTreeMap<Method, Vec<RunSummary>>,
}

impl StatisticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `result` and returns its position within its method's list.
    ///
    /// Repeatable methods keep one entry per controller fingerprint, replacing
    /// an entry with the same fingerprint. Other methods keep only the latest run.
    pub fn merge(&mut self, result: JobResult) -> usize {
        let method = result.method();
        let fingerprint = result.controller.fingerprint();
        let runs = self.runs.entry(method).or_default();
        let summary = RunSummary {
            fingerprint,
            result,
        };

        if !method.is_repeatable() {
            runs.clear();
            runs.push(summary);
            return 0;
        }
        match runs.iter().position(|r| r.fingerprint == summary.fingerprint) {
            Some(index) => {
                debug!(%method, index, "Replacing run with identical controller");
                runs[index] = summary;
                index
            }
            None => {
                runs.push(summary);
                runs.len() - 1
            }
        }
    }

    pub fn runs(&self, method: Method) -> &[RunSummary] {
        self.runs.get(&method).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn latest(&self, method: Method) -> Option<&RunSummary> {
        self.runs(method).last()
    }

    pub fn methods(&self) -> impl Iterator<Item = Method> + '_ {
        self.runs.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.runs.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.runs.clear();
    }
}
