use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid value for '{parameter}': {reason}")]
    InvalidValue {
        parameter: &'static str,
        reason: String,
    },
}

fn check_confidence(confidence: f64) -> Result<(), ConfigError> {
    if confidence > 0.0 && confidence < 100.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            parameter: "confidence",
            reason: format!("{confidence} is not a percentage strictly between 0 and 100"),
        })
    }
}

fn check_nonzero(parameter: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::InvalidValue {
            parameter,
            reason: "must be at least 1".to_string(),
        })
    } else {
        Ok(())
    }
}

fn check_selection(parameters: &Option<Vec<usize>>) -> Result<(), ConfigError> {
    match parameters {
        Some(list) if list.is_empty() => Err(ConfigError::InvalidValue {
            parameter: "parameters",
            reason: "an explicit parameter list must name at least one parameter".to_string(),
        }),
        _ => Ok(()),
    }
}

fn check_positive(parameter: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            parameter,
            reason: format!("{value} is not a finite positive number"),
        })
    }
}

/// Tag identifying which engine handles a job and how its results are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    MonteCarlo,
    GridSearch,
    ModelComparison,
    FastConfidence,
    CrossValidation,
    Reduction,
}

impl Method {
    /// Repeatable methods keep one stored run per distinct controller.
    pub fn is_repeatable(self) -> bool {
        matches!(
            self,
            Method::MonteCarlo | Method::CrossValidation | Method::Reduction
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            Method::MonteCarlo => "Monte Carlo",
            Method::GridSearch => "Grid Search",
            Method::ModelComparison => "Model Comparison",
            Method::FastConfidence => "Fast Confidence",
            Method::CrossValidation => "Cross Validation",
            Method::Reduction => "Reduction Analysis",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Origin of the noise added to Monte Carlo samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VarianceSource {
    /// A user supplied standard deviation.
    Explicit(f64),
    /// The fitted model's standard error of the estimate.
    StandardError,
    /// The standard deviation of the fitted model's residuals.
    StandardDeviation,
    /// Residuals resampled with replacement.
    Bootstrap,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonteCarloConfig {
    pub max_steps: usize,
    pub confidence: f64,
    pub variance_source: VarianceSource,
    /// Standard deviation per independent column; zero leaves a column untouched.
    pub independent_sigmas: Vec<f64>,
    pub light_weight: bool,
    pub store_raw: bool,
    pub seed: Option<u64>,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            max_steps: 1000,
            confidence: 95.0,
            variance_source: VarianceSource::StandardError,
            independent_sigmas: Vec::new(),
            light_weight: false,
            store_raw: false,
            seed: None,
        }
    }
}

impl MonteCarloConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_nonzero("max_steps", self.max_steps)?;
        check_confidence(self.confidence)?;
        if let VarianceSource::Explicit(sigma) = self.variance_source {
            check_positive("variance", sigma)?;
        }
        if let Some(bad) = self
            .independent_sigmas
            .iter()
            .find(|s| !(s.is_finite() && **s >= 0.0))
        {
            return Err(ConfigError::InvalidValue {
                parameter: "independent_sigmas",
                reason: format!("{bad} is not a finite non-negative number"),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MonteCarloConfigBuilder {
    max_steps: Option<usize>,
    confidence: Option<f64>,
    variance_source: Option<VarianceSource>,
    independent_sigmas: Option<Vec<f64>>,
    light_weight: Option<bool>,
    store_raw: Option<bool>,
    seed: Option<u64>,
}

impl MonteCarloConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_steps(mut self, steps: usize) -> Self {
        self.max_steps = Some(steps);
        self
    }
    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
    pub fn variance_source(mut self, source: VarianceSource) -> Self {
        self.variance_source = Some(source);
        self
    }
    pub fn independent_sigmas(mut self, sigmas: Vec<f64>) -> Self {
        self.independent_sigmas = Some(sigmas);
        self
    }
    pub fn light_weight(mut self, enabled: bool) -> Self {
        self.light_weight = Some(enabled);
        self
    }
    pub fn store_raw(mut self, enabled: bool) -> Self {
        self.store_raw = Some(enabled);
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<MonteCarloConfig, ConfigError> {
        let defaults = MonteCarloConfig::default();
        let config = MonteCarloConfig {
            max_steps: self.max_steps.unwrap_or(defaults.max_steps),
            confidence: self.confidence.unwrap_or(defaults.confidence),
            variance_source: self.variance_source.unwrap_or(defaults.variance_source),
            independent_sigmas: self.independent_sigmas.unwrap_or_default(),
            light_weight: self.light_weight.unwrap_or(defaults.light_weight),
            store_raw: self.store_raw.unwrap_or(defaults.store_raw),
            seed: self.seed,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridSearchConfig {
    /// Maximum number of steps per direction.
    pub max_steps: usize,
    pub confidence: f64,
    /// Added to the parameter's decimal magnitude before taking the step size.
    pub scaling_exponent: f64,
    pub overshot_max: usize,
    pub error_decrease_max: usize,
    pub error_convergency_max: usize,
    /// Relative SSE change regarded as no change at all.
    pub convergency_epsilon: f64,
    /// Parameter indices to profile; `None` profiles every parameter.
    pub parameters: Option<Vec<usize>>,
    pub store_raw: bool,
}

impl Default for GridSearchConfig {
    fn default() -> Self {
        Self {
            max_steps: 1000,
            confidence: 95.0,
            scaling_exponent: -4.0,
            overshot_max: 5,
            error_decrease_max: 50,
            error_convergency_max: 10,
            convergency_epsilon: 1e-10,
            parameters: None,
            store_raw: false,
        }
    }
}

impl GridSearchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_nonzero("max_steps", self.max_steps)?;
        check_confidence(self.confidence)?;
        if !self.scaling_exponent.is_finite() {
            return Err(ConfigError::InvalidValue {
                parameter: "scaling_exponent",
                reason: "must be finite".to_string(),
            });
        }
        check_selection(&self.parameters)?;
        check_positive("convergency_epsilon", self.convergency_epsilon)
    }
}

#[derive(Default)]
pub struct GridSearchConfigBuilder {
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

impl GridSearchConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_steps(mut self, steps: usize) -> Self {
        self.max_steps = Some(steps);
        self
    }
    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
    pub fn scaling_exponent(mut self, exponent: f64) -> Self {
        self.scaling_exponent = Some(exponent);
        self
    }
    pub fn overshot_max(mut self, max: usize) -> Self {
        self.overshot_max = Some(max);
        self
    }
    pub fn error_decrease_max(mut self, max: usize) -> Self {
        self.error_decrease_max = Some(max);
        self
    }
    pub fn error_convergency_max(mut self, max: usize) -> Self {
        self.error_convergency_max = Some(max);
        self
    }
    pub fn convergency_epsilon(mut self, epsilon: f64) -> Self {
        self.convergency_epsilon = Some(epsilon);
        self
    }
    pub fn parameters(mut self, parameters: Vec<usize>) -> Self {
        self.parameters = Some(parameters);
        self
    }
    pub fn store_raw(mut self, enabled: bool) -> Self {
        self.store_raw = Some(enabled);
        self
    }

    pub fn build(self) -> Result<GridSearchConfig, ConfigError> {
        let defaults = GridSearchConfig::default();
        let config = GridSearchConfig {
            max_steps: self.max_steps.unwrap_or(defaults.max_steps),
            confidence: self.confidence.unwrap_or(defaults.confidence),
            scaling_exponent: self.scaling_exponent.unwrap_or(defaults.scaling_exponent),
            overshot_max: self.overshot_max.unwrap_or(defaults.overshot_max),
            error_decrease_max: self
                .error_decrease_max
                .unwrap_or(defaults.error_decrease_max),
            error_convergency_max: self
                .error_convergency_max
                .unwrap_or(defaults.error_convergency_max),
            convergency_epsilon: self
                .convergency_epsilon
                .unwrap_or(defaults.convergency_epsilon),
            parameters: self.parameters,
            store_raw: self.store_raw.unwrap_or(defaults.store_raw),
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FastConfidenceConfig {
    pub confidence: f64,
    pub max_iterations: usize,
    /// Relative distance to the threshold at which a limit is accepted.
    pub tolerance: f64,
    /// Initial outward step, relative to `max(|value|, 1)`.
    pub initial_step: f64,
    /// Parameter indices to bracket; `None` brackets the global parameters.
    pub parameters: Option<Vec<usize>>,
    /// Refit the remaining parameters at every evaluated point instead of only re-evaluating.
    pub relax: bool,
}

impl Default for FastConfidenceConfig {
    fn default() -> Self {
        Self {
            confidence: 95.0,
            max_iterations: 100,
            tolerance: 1e-7,
            initial_step: 0.1,
            parameters: None,
            relax: false,
        }
    }
}

impl FastConfidenceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_confidence(self.confidence)?;
        check_nonzero("max_iterations", self.max_iterations)?;
        check_positive("tolerance", self.tolerance)?;
        check_selection(&self.parameters)?;
        check_positive("initial_step", self.initial_step)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelComparisonConfig {
    /// Number of candidate points sampled in the box.
    pub max_steps: usize,
    pub confidence: f64,
    pub box_scaling_factor: f64,
    /// Parameter indices spanning the box; `None` uses the global parameters.
    pub parameters: Option<Vec<usize>>,
    pub relax: bool,
    pub store_raw: bool,
    pub seed: Option<u64>,
}

impl Default for ModelComparisonConfig {
    fn default() -> Self {
        Self {
            max_steps: 1000,
            confidence: 95.0,
            box_scaling_factor: 1.5,
            parameters: None,
            relax: true,
            store_raw: false,
            seed: None,
        }
    }
}

impl ModelComparisonConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_nonzero("max_steps", self.max_steps)?;
        check_confidence(self.confidence)?;
        check_selection(&self.parameters)?;
        check_positive("box_scaling_factor", self.box_scaling_factor)
    }

    /// Settings of the single-parameter pre-pass that sizes the box.
    pub fn bracketing(&self) -> FastConfidenceConfig {
        FastConfidenceConfig {
            confidence: self.confidence,
            parameters: self.parameters.clone(),
            relax: self.relax,
            ..FastConfidenceConfig::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CrossValidationKind {
    LeaveOneOut,
    LeaveTwoOut,
    LeaveXOut(usize),
}

impl CrossValidationKind {
    pub fn leave_count(self) -> usize {
        match self {
            CrossValidationKind::LeaveOneOut => 1,
            CrossValidationKind::LeaveTwoOut => 2,
            CrossValidationKind::LeaveXOut(x) => x,
        }
    }
}

/// How leave-X-out subsets are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubsetAlgorithm {
    /// Enumerate every combination, sampling from the enumeration if needed.
    Precompute,
    /// Choose between the other two from the combinatorial size.
    Automatic,
    /// Draw distinct random subsets.
    Random,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossValidationConfig {
    pub kind: CrossValidationKind,
    pub algorithm: SubsetAlgorithm,
    /// Requested number of leave-X-out subsets; ignored for leave-one/two-out.
    pub max_steps: usize,
    pub confidence: f64,
    pub store_raw: bool,
    pub seed: Option<u64>,
}

impl Default for CrossValidationConfig {
    fn default() -> Self {
        Self {
            kind: CrossValidationKind::LeaveOneOut,
            algorithm: SubsetAlgorithm::Automatic,
            max_steps: 1000,
            confidence: 95.0,
            store_raw: false,
            seed: None,
        }
    }
}

impl CrossValidationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_nonzero("max_steps", self.max_steps)?;
        check_confidence(self.confidence)?;
        check_nonzero("leave_count", self.kind.leave_count())
    }
}

#[derive(Default)]
pub struct CrossValidationConfigBuilder {
    kind: Option<CrossValidationKind>,
    algorithm: Option<SubsetAlgorithm>,
    max_steps: Option<usize>,
    confidence: Option<f64>,
    store_raw: Option<bool>,
    seed: Option<u64>,
}

impl CrossValidationConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: CrossValidationKind) -> Self {
        self.kind = Some(kind);
        self
    }
    pub fn algorithm(mut self, algorithm: SubsetAlgorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }
    pub fn max_steps(mut self, steps: usize) -> Self {
        self.max_steps = Some(steps);
        self
    }
    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
    pub fn store_raw(mut self, enabled: bool) -> Self {
        self.store_raw = Some(enabled);
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<CrossValidationConfig, ConfigError> {
        let defaults = CrossValidationConfig::default();
        let config = CrossValidationConfig {
            kind: self.kind.ok_or(ConfigError::MissingParameter("kind"))?,
            algorithm: self.algorithm.unwrap_or(defaults.algorithm),
            max_steps: self.max_steps.unwrap_or(defaults.max_steps),
            confidence: self.confidence.unwrap_or(defaults.confidence),
            store_raw: self.store_raw.unwrap_or(defaults.store_raw),
            seed: self.seed,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReductionRuntype {
    FromEnd,
    FromBeginning,
    Both,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReductionConfig {
    pub runtype: ReductionRuntype,
    /// Trimming stops once this many enabled rows remain.
    pub minimum_rows: usize,
    pub confidence: f64,
    pub store_raw: bool,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self {
            runtype: ReductionRuntype::Both,
            minimum_rows: 4,
            confidence: 95.0,
            store_raw: false,
        }
    }
}

impl ReductionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_nonzero("minimum_rows", self.minimum_rows)?;
        check_confidence(self.confidence)
    }
}

/// A complete job descriptor: the method tag plus its typed settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", rename_all = "kebab-case")]
pub enum Controller {
    MonteCarlo(MonteCarloConfig),
    GridSearch(GridSearchConfig),
    ModelComparison(ModelComparisonConfig),
    FastConfidence(FastConfidenceConfig),
    CrossValidation(CrossValidationConfig),
    Reduction(ReductionConfig),
}

impl Controller {
    pub fn method(&self) -> Method {
        match self {
            Controller::MonteCarlo(_) => Method::MonteCarlo,
            Controller::GridSearch(_) => Method::GridSearch,
            Controller::ModelComparison(_) => Method::ModelComparison,
            Controller::FastConfidence(_) => Method::FastConfidence,
            Controller::CrossValidation(_) => Method::CrossValidation,
            Controller::Reduction(_) => Method::Reduction,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Controller::MonteCarlo(c) => c.validate(),
            Controller::GridSearch(c) => c.validate(),
            Controller::ModelComparison(c) => c.validate(),
            Controller::FastConfidence(c) => c.validate(),
            Controller::CrossValidation(c) => c.validate(),
            Controller::Reduction(c) => c.validate(),
        }
    }

    /// Canonical JSON rendering, equal for equal controllers.
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}
