use super::model::{Model, ModelError};
use crate::core::data::table::DataTable;

/// Single-site hyperbolic binding isotherm.
///
/// For every dependent column `j` the signal follows
/// `y_j = y0_j + delta_j * K x / (1 + K x)` where `x` is the first independent
/// column. The parameter layout is `[lg K, y0_1, delta_1, y0_2, delta_2, ...]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SaturationModel {
    independent: DataTable,
    dependent: DataTable,
    parameters: Vec<f64>,
}

impl SaturationModel {
    /// Builds the model with a data-driven initial guess.
    pub fn new(independent: DataTable, dependent: DataTable) -> Result<Self, ModelError> {
        if independent.rows() != dependent.rows() {
            return Err(ModelError::RowMismatch {
                independent: independent.rows(),
                dependent: dependent.rows(),
            });
        }
        let parameters = initial_guess(&independent, &dependent);
        Ok(Self {
            independent,
            dependent,
            parameters,
        })
    }

    pub fn with_parameters(mut self, parameters: Vec<f64>) -> Result<Self, ModelError> {
        let expected = 1 + 2 * self.dependent.columns();
        if parameters.len() != expected {
            return Err(ModelError::ParameterCount {
                expected,
                found: parameters.len(),
            });
        }
        self.parameters = parameters;
        Ok(self)
    }

    pub fn with_log_k(mut self, log_k: f64) -> Self {
        self.parameters[0] = log_k;
        self
    }

    #[inline]
    fn bound_fraction(&self, row: usize) -> f64 {
        let k = 10f64.powf(self.parameters[0]);
        let x = self.independent.value(row, 0);
        k * x / (1.0 + k * x)
    }
}

fn initial_guess(independent: &DataTable, dependent: &DataTable) -> Vec<f64> {
    let rows: Vec<usize> = dependent.enabled_rows().collect();
    let (first, last) = match (rows.first(), rows.last()) {
        (Some(&f), Some(&l)) => (f, l),
        _ => (0, dependent.rows().saturating_sub(1)),
    };

    let mut xs: Vec<f64> = rows
        .iter()
        .map(|&r| independent.value(r, 0))
        .filter(|x| *x > 0.0)
        .collect();
    xs.sort_by(f64::total_cmp);
    let log_k = xs.get(xs.len() / 2).map(|x| -x.log10()).unwrap_or(0.0);

    let mut parameters = vec![log_k];
    for column in 0..dependent.columns() {
        let y0 = dependent.value(first, column);
        let y_end = dependent.value(last, column);
        parameters.push(y0);
        parameters.push(y_end - y0);
    }
    parameters
}

impl Model for SaturationModel {
    fn name(&self) -> &str {
        "1:1 saturation"
    }

    fn clone_model(&self) -> Box<dyn Model> {
        Box::new(self.clone())
    }

    fn independent(&self) -> &DataTable {
        &self.independent
    }

    fn dependent(&self) -> &DataTable {
        &self.dependent
    }

    fn override_independent(&mut self, table: DataTable) {
        self.independent = table;
    }

    fn override_dependent(&mut self, table: DataTable) {
        self.dependent = table;
    }

    fn parameters(&self) -> &[f64] {
        &self.parameters
    }

    fn set_parameters(&mut self, parameters: &[f64]) {
        let n = self.parameters.len().min(parameters.len());
        self.parameters[..n].copy_from_slice(&parameters[..n]);
    }

    fn parameter_names(&self) -> Vec<String> {
        let mut names = vec!["lg K".to_string()];
        for header in self.dependent.headers() {
            names.push(format!("y0 [{header}]"));
            names.push(format!("delta [{header}]"));
        }
        names
    }

    fn global_parameter_count(&self) -> usize {
        1
    }

    fn predict(&self, row: usize) -> Vec<f64> {
        let fraction = self.bound_fraction(row);
        self.parameters[1..]
            .chunks_exact(2)
            .map(|local| local[0] + local[1] * fraction)
            .collect()
    }
}
