use crate::cli::AnalyzeArgs;
use crate::error::{CliError, Result};
use serde::Deserialize;
use std::path::Path;
use titrafit::engine::config::{self as core_config, Controller};
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialDefaults {
    confidence: Option<f64>,
    max_steps: Option<usize>,
    seed: Option<u64>,
    store_raw: Option<bool>,
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "kebab-case")]
enum PartialVarianceSource {
    #[serde(alias = "sigma")]
    Explicit,
    #[serde(alias = "sey")]
    StandardError,
    #[serde(alias = "sd")]
    StandardDeviation,
    Bootstrap,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialMonteCarlo {
    max_steps: Option<usize>,
    confidence: Option<f64>,
    variance_source: Option<PartialVarianceSource>,
    variance: Option<f64>,
    independent_sigmas: Option<Vec<f64>>,
    light_weight: Option<bool>,
    store_raw: Option<bool>,
    seed: Option<u64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialGridSearch {
    max_steps: Option<usize>,
    confidence: Option<f64>,
    scaling_exponent: Option<f64>,
    overshot_max: Option<usize>,
    error_decrease_max: Option<usize>,
    error_convergency_max: Option<usize>,
    convergency_epsilon: Option<f64>,
    parameters: Option<Vec<usize>>,
    store_raw: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialFastConfidence {
    confidence: Option<f64>,
    max_iterations: Option<usize>,
    tolerance: Option<f64>,
    initial_step: Option<f64>,
    parameters: Option<Vec<usize>>,
    relax: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialModelComparison {
    max_steps: Option<usize>,
    confidence: Option<f64>,
    box_scaling_factor: Option<f64>,
    parameters: Option<Vec<usize>>,
    relax: Option<bool>,
    store_raw: Option<bool>,
    seed: Option<u64>,
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "kebab-case")]
enum PartialSubsetAlgorithm {
    Precompute,
    Automatic,
    Random,
}

impl From<PartialSubsetAlgorithm> for core_config::SubsetAlgorithm {
    fn from(p: PartialSubsetAlgorithm) -> Self {
        match p {
            PartialSubsetAlgorithm::Precompute => Self::Precompute,
            PartialSubsetAlgorithm::Automatic => Self::Automatic,
            PartialSubsetAlgorithm::Random => Self::Random,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialCrossValidation {
    leave_out: Option<usize>,
    algorithm: Option<PartialSubsetAlgorithm>,
    max_steps: Option<usize>,
    confidence: Option<f64>,
    store_raw: Option<bool>,
    seed: Option<u64>,
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "kebab-case")]
enum PartialRuntype {
    FromEnd,
    FromBeginning,
    Both,
}

impl From<PartialRuntype> for core_config::ReductionRuntype {
    fn from(p: PartialRuntype) -> Self {
        match p {
            PartialRuntype::FromEnd => Self::FromEnd,
            PartialRuntype::FromBeginning => Self::FromBeginning,
            PartialRuntype::Both => Self::Both,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialReduction {
    runtype: Option<PartialRuntype>,
    minimum_rows: Option<usize>,
    confidence: Option<f64>,
    store_raw: Option<bool>,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "method", rename_all = "kebab-case")]
enum PartialJob {
    MonteCarlo(PartialMonteCarlo),
    GridSearch(PartialGridSearch),
    FastConfidence(PartialFastConfidence),
    ModelComparison(PartialModelComparison),
    CrossValidation(PartialCrossValidation),
    Reduction(PartialReduction),
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialJobFile {
    defaults: Option<PartialDefaults>,
    #[serde(default, rename = "job")]
    jobs: Vec<PartialJob>,
}

fn invalid(e: core_config::ConfigError) -> CliError {
    CliError::Config(e.to_string())
}

impl PartialJobFile {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading job file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    /// Resolves every job against the file defaults and the command line.
    pub fn merge_with_cli(mut self, args: &AnalyzeArgs) -> Result<Vec<Controller>> {
        self.apply_set_values(&args.set_values)?;

        let mut defaults = self.defaults.take().unwrap_or_default();
        defaults.seed = args.seed.or(defaults.seed);

        if self.jobs.is_empty() {
            return Err(CliError::Config(
                "The job file defines no `[[job]]` entries.".to_string(),
            ));
        }
        self.jobs
            .into_iter()
            .enumerate()
            .map(|(index, job)| {
                job.resolve(&defaults).map_err(|e| match e {
                    CliError::Config(message) => {
                        CliError::Config(format!("job {}: {}", index + 1, message))
                    }
                    other => other,
                })
            })
            .collect()
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let Some((key, value_str)) = kv_pair.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                )));
            };
            let defaults = self.defaults.get_or_insert_with(Default::default);
            let bad_value =
                |kind: &str| CliError::Config(format!("Invalid {kind} value for {key}: {value_str}"));
            match key {
                "defaults.confidence" => {
                    defaults.confidence = Some(value_str.parse().map_err(|_| bad_value("float"))?);
                }
                "defaults.max-steps" => {
                    defaults.max_steps = Some(value_str.parse().map_err(|_| bad_value("integer"))?);
                }
                "defaults.seed" => {
                    defaults.seed = Some(value_str.parse().map_err(|_| bad_value("integer"))?);
                }
                "defaults.store-raw" => {
                    defaults.store_raw = Some(value_str.parse().map_err(|_| bad_value("boolean"))?);
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }
}

impl PartialJob {
    fn resolve(self, defaults: &PartialDefaults) -> Result<Controller> {
        match self {
            PartialJob::MonteCarlo(p) => Self::monte_carlo(p, defaults),
            PartialJob::GridSearch(p) => Self::grid_search(p, defaults),
            PartialJob::FastConfidence(p) => Self::fast_confidence(p, defaults),
            PartialJob::ModelComparison(p) => Self::model_comparison(p, defaults),
            PartialJob::CrossValidation(p) => Self::cross_validation(p, defaults),
            PartialJob::Reduction(p) => Self::reduction(p, defaults),
        }
    }

    fn monte_carlo(p: PartialMonteCarlo, defaults: &PartialDefaults) -> Result<Controller> {
        let source = match (p.variance_source, p.variance) {
            (Some(PartialVarianceSource::Explicit) | None, Some(variance)) => {
                core_config::VarianceSource::Explicit(variance)
            }
            (Some(PartialVarianceSource::Explicit), None) => {
                return Err(CliError::Config(
                    "`variance-source = \"sigma\"` requires `variance`".to_string(),
                ));
            }
            (Some(PartialVarianceSource::StandardError) | None, None) => {
                core_config::VarianceSource::StandardError
            }
            (Some(PartialVarianceSource::StandardDeviation), None) => {
                core_config::VarianceSource::StandardDeviation
            }
            (Some(PartialVarianceSource::Bootstrap), None) => core_config::VarianceSource::Bootstrap,
            (Some(_), Some(_)) => {
                return Err(CliError::Config(
                    "`variance` is only used with `variance-source = \"sigma\"`".to_string(),
                ));
            }
        };

        let mut builder = core_config::MonteCarloConfigBuilder::new()
            .variance_source(source)
            .independent_sigmas(p.independent_sigmas.unwrap_or_default())
            .light_weight(p.light_weight.unwrap_or(false));
        if let Some(steps) = p.max_steps.or(defaults.max_steps) {
            builder = builder.max_steps(steps);
        }
        if let Some(confidence) = p.confidence.or(defaults.confidence) {
            builder = builder.confidence(confidence);
        }
        if let Some(store_raw) = p.store_raw.or(defaults.store_raw) {
            builder = builder.store_raw(store_raw);
        }
        if let Some(seed) = p.seed.or(defaults.seed) {
            builder = builder.seed(seed);
        }
        builder.build().map(Controller::MonteCarlo).map_err(invalid)
    }

    fn grid_search(p: PartialGridSearch, defaults: &PartialDefaults) -> Result<Controller> {
        let mut builder = core_config::GridSearchConfigBuilder::new();
        if let Some(parameters) = p.parameters {
            builder = builder.parameters(parameters);
        }
        if let Some(steps) = p.max_steps.or(defaults.max_steps) {
            builder = builder.max_steps(steps);
        }
        if let Some(confidence) = p.confidence.or(defaults.confidence) {
            builder = builder.confidence(confidence);
        }
        if let Some(exponent) = p.scaling_exponent {
            builder = builder.scaling_exponent(exponent);
        }
        if let Some(max) = p.overshot_max {
            builder = builder.overshot_max(max);
        }
        if let Some(max) = p.error_decrease_max {
            builder = builder.error_decrease_max(max);
        }
        if let Some(max) = p.error_convergency_max {
            builder = builder.error_convergency_max(max);
        }
        if let Some(epsilon) = p.convergency_epsilon {
            builder = builder.convergency_epsilon(epsilon);
        }
        if let Some(store_raw) = p.store_raw.or(defaults.store_raw) {
            builder = builder.store_raw(store_raw);
        }
        builder.build().map(Controller::GridSearch).map_err(invalid)
    }

    fn fast_confidence(p: PartialFastConfidence, defaults: &PartialDefaults) -> Result<Controller> {
        let base = core_config::FastConfidenceConfig::default();
        let config = core_config::FastConfidenceConfig {
            confidence: p.confidence.or(defaults.confidence).unwrap_or(base.confidence),
            max_iterations: p.max_iterations.unwrap_or(base.max_iterations),
            tolerance: p.tolerance.unwrap_or(base.tolerance),
            initial_step: p.initial_step.unwrap_or(base.initial_step),
            parameters: p.parameters,
            relax: p.relax.unwrap_or(base.relax),
        };
        config.validate().map_err(invalid)?;
        Ok(Controller::FastConfidence(config))
    }

    fn model_comparison(p: PartialModelComparison, defaults: &PartialDefaults) -> Result<Controller> {
        let base = core_config::ModelComparisonConfig::default();
        let config = core_config::ModelComparisonConfig {
            max_steps: p.max_steps.or(defaults.max_steps).unwrap_or(base.max_steps),
            confidence: p.confidence.or(defaults.confidence).unwrap_or(base.confidence),
            box_scaling_factor: p.box_scaling_factor.unwrap_or(base.box_scaling_factor),
            parameters: p.parameters,
            relax: p.relax.unwrap_or(base.relax),
            store_raw: p.store_raw.or(defaults.store_raw).unwrap_or(base.store_raw),
            seed: p.seed.or(defaults.seed),
        };
        config.validate().map_err(invalid)?;
        Ok(Controller::ModelComparison(config))
    }

    fn cross_validation(p: PartialCrossValidation, defaults: &PartialDefaults) -> Result<Controller> {
        let mut builder = core_config::CrossValidationConfigBuilder::new();
        if let Some(leave_out) = p.leave_out {
            builder = builder.kind(match leave_out {
                1 => core_config::CrossValidationKind::LeaveOneOut,
                2 => core_config::CrossValidationKind::LeaveTwoOut,
                x => core_config::CrossValidationKind::LeaveXOut(x),
            });
        }
        if let Some(algorithm) = p.algorithm {
            builder = builder.algorithm(algorithm.into());
        }
        if let Some(steps) = p.max_steps.or(defaults.max_steps) {
            builder = builder.max_steps(steps);
        }
        if let Some(confidence) = p.confidence.or(defaults.confidence) {
            builder = builder.confidence(confidence);
        }
        if let Some(store_raw) = p.store_raw.or(defaults.store_raw) {
            builder = builder.store_raw(store_raw);
        }
        if let Some(seed) = p.seed.or(defaults.seed) {
            builder = builder.seed(seed);
        }
        builder.build().map(Controller::CrossValidation).map_err(invalid)
    }

    fn reduction(p: PartialReduction, defaults: &PartialDefaults) -> Result<Controller> {
        let base = core_config::ReductionConfig::default();
        let config = core_config::ReductionConfig {
            runtype: p.runtype.map_or(base.runtype, Into::into),
            minimum_rows: p.minimum_rows.unwrap_or(base.minimum_rows),
            confidence: p.confidence.or(defaults.confidence).unwrap_or(base.confidence),
            store_raw: p.store_raw.or(defaults.store_raw).unwrap_or(base.store_raw),
        };
        config.validate().map_err(invalid)?;
        Ok(Controller::Reduction(config))
    }
}
