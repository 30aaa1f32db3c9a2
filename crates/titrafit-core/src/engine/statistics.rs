use super::queue::JobKey;
use super::worker::FitRecord;
use crate::core::models::model::Model;
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, FisherSnedecor};
use statrs::statistics::{Data, OrderStatistics, Statistics};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceBar {
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceBar {
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Two-sided percentile interval of `values` at `confidence` percent.
///
/// Non-finite values are ignored. With `n` sorted values and the tail
/// `t = (100 - confidence) / 200`, the bounds are the values at indices
/// `floor(n t)` and `ceil(n (1 - t)) - 1`.
pub fn percentile_bar(values: &[f64], confidence: f64) -> Option<ConfidenceBar> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len() as f64;
    let tail = (100.0 - confidence.clamp(0.0, 100.0)) / 200.0;
    let last = sorted.len() - 1;
    let low = ((n * tail).floor() as usize).min(last);
    let high = ((n * (1.0 - tail)).ceil() as usize).saturating_sub(1).min(last);

    Some(ConfidenceBar {
        lower: sorted[low.min(high)],
        upper: sorted[low.max(high)],
    })
}

/// SSE cutoff of the joint confidence region from the F distribution:
/// `SSE * (1 + p / (n - p) * F(p, n - p; confidence))`.
pub fn f_threshold(sse: f64, parameters: usize, points: usize, confidence: f64) -> Option<f64> {
    if parameters == 0 || points <= parameters || !sse.is_finite() {
        return None;
    }
    let p = parameters as f64;
    let dof = (points - parameters) as f64;
    let quantile = FisherSnedecor::new(p, dof)
        .ok()?
        .inverse_cdf(confidence / 100.0);
    quantile
        .is_finite()
        .then(|| sse * (1.0 + p / dof * quantile))
}

/// Number of `k`-subsets of `n` items, as a float to survive large inputs.
pub fn combinations_count(n: usize, k: usize) -> f64 {
    if k > n {
        return 0.0;
    }
    statrs::function::factorial::binomial(n as u64, k as u64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleSummary {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub median: f64,
    pub lower_quartile: f64,
    pub upper_quartile: f64,
}

impl SampleSummary {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return None;
        }
        let mean = finite.iter().mean();
        let std_dev = if finite.len() > 1 {
            finite.iter().std_dev()
        } else {
            0.0
        };
        let count = finite.len();
        let mut data = Data::new(finite);
        Some(Self {
            count,
            mean,
            std_dev,
            median: OrderStatistics::median(&mut data),
            lower_quartile: data.lower_quartile(),
            upper_quartile: data.upper_quartile(),
        })
    }
}

/// Keyed collection of per-job fit records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    records: BTreeMap<JobKey, FitRecord>,
}

impl FromIterator<FitRecord> for ResultSet {
    fn from_iter<I: IntoIterator<Item = FitRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().map(|r| (r.key, r)).collect(),
        }
    }
}

impl ResultSet {
    pub fn insert(&mut self, record: FitRecord) {
        self.records.insert(record.key, record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: JobKey) -> Option<&FitRecord> {
        self.records.get(&key)
    }

    pub fn records(&self) -> impl Iterator<Item = &FitRecord> {
        self.records.values()
    }

    pub fn converged(&self) -> impl Iterator<Item = &FitRecord> {
        self.records.values().filter(|r| r.converged)
    }

    pub fn converged_count(&self) -> usize {
        self.converged().count()
    }

    /// Values of one parameter across converged records.
    pub fn parameter_values(&self, index: usize) -> Vec<f64> {
        self.converged()
            .filter_map(|r| r.parameters.get(index).copied())
            .collect()
    }
}

/// Interval estimate for one model parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterStatistic {
    pub index: usize,
    pub name: String,
    /// Point estimate of the fitted model.
    pub value: f64,
    pub confidence: f64,
    pub bar: ConfidenceBar,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<SampleSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples: Option<Vec<f64>>,
}

/// Percentile bars for every parameter over the converged records.
///
/// Parameters without any finite sample are skipped.
pub fn sampled_statistics(
    model: &dyn Model,
    results: &ResultSet,
    confidence: f64,
    keep_samples: bool,
) -> Vec<ParameterStatistic> {
    let names = model.parameter_names();
    model
        .parameters()
        .iter()
        .enumerate()
        .filter_map(|(index, &value)| {
            let values = results.parameter_values(index);
            let bar = percentile_bar(&values, confidence)?;
            Some(ParameterStatistic {
                index,
                name: names.get(index).cloned().unwrap_or_default(),
                value,
                confidence,
                bar,
                summary: SampleSummary::from_values(&values),
                samples: keep_samples.then_some(values),
            })
        })
        .collect()
}
