use crate::core::data::table::{DataTable, TableError};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ModelError {
    #[error("Independent and dependent tables differ in row count ({independent} vs {dependent})")]
    RowMismatch { independent: usize, dependent: usize },

    #[error("Expected {expected} parameters, got {found}")]
    ParameterCount { expected: usize, found: usize },

    #[error("Table error: {source}")]
    Table {
        #[from]
        source: TableError,
    },
}

/// Snapshot of a model's parameters, as exported for reports and re-import.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterRecord {
    pub names: Vec<String>,
    pub values: Vec<f64>,
    pub sse: f64,
}

/// A fitted nonlinear model over an independent and a dependent table.
///
/// Implementors provide the table storage, the parameter vector and a row
/// prediction. Residual statistics are derived from those in the provided
/// methods and only consider enabled rows of the dependent table.
pub trait Model: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn clone_model(&self) -> Box<dyn Model>;

    fn independent(&self) -> &DataTable;
    fn dependent(&self) -> &DataTable;
    fn override_independent(&mut self, table: DataTable);
    fn override_dependent(&mut self, table: DataTable);

    fn parameters(&self) -> &[f64];
    fn set_parameters(&mut self, parameters: &[f64]);
    fn parameter_names(&self) -> Vec<String>;

    /// Number of leading parameters shared by all dependent columns.
    fn global_parameter_count(&self) -> usize;

    /// Predicted dependent values for `row`, one per dependent column.
    fn predict(&self, row: usize) -> Vec<f64>;

    fn parameter_count(&self) -> usize {
        self.parameters().len()
    }

    /// The dependent table with every row replaced by the model prediction.
    fn model_table(&self) -> DataTable {
        let mut table = self.dependent().clone();
        for row in 0..table.rows() {
            for (column, value) in self.predict(row).into_iter().enumerate() {
                table.set_value(row, column, value);
            }
        }
        table
    }

    /// Observed minus predicted for every enabled cell, row-major.
    fn residuals(&self) -> Vec<f64> {
        let dependent = self.dependent();
        dependent
            .enabled_rows()
            .flat_map(|row| {
                self.predict(row)
                    .into_iter()
                    .enumerate()
                    .map(move |(column, predicted)| dependent.value(row, column) - predicted)
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn sse(&self) -> f64 {
        self.residuals().iter().map(|r| r * r).sum()
    }

    fn data_points(&self) -> usize {
        self.dependent().enabled_row_count() * self.dependent().columns()
    }

    fn degrees_of_freedom(&self) -> usize {
        self.data_points().saturating_sub(self.parameter_count())
    }

    /// Sample standard deviation of the residuals.
    fn standard_deviation(&self) -> f64 {
        let residuals = self.residuals();
        let n = residuals.len();
        if n < 2 {
            return f64::NAN;
        }
        let mean = residuals.iter().sum::<f64>() / n as f64;
        let ss: f64 = residuals.iter().map(|r| (r - mean).powi(2)).sum();
        (ss / (n - 1) as f64).sqrt()
    }

    /// Standard error of the estimate, `sqrt(SSE / dof)`.
    fn standard_error_of_y(&self) -> f64 {
        match self.degrees_of_freedom() {
            0 => f64::NAN,
            dof => (self.sse() / dof as f64).sqrt(),
        }
    }

    fn export_parameters(&self) -> ParameterRecord {
        ParameterRecord {
            names: self.parameter_names(),
            values: self.parameters().to_vec(),
            sse: self.sse(),
        }
    }

    fn import_parameters(&mut self, record: &ParameterRecord) -> Result<(), ModelError> {
        if record.values.len() != self.parameter_count() {
            return Err(ModelError::ParameterCount {
                expected: self.parameter_count(),
                found: record.values.len(),
            });
        }
        self.set_parameters(&record.values);
        Ok(())
    }
}

impl Clone for Box<dyn Model> {
    fn clone(&self) -> Self {
        self.clone_model()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::fixtures::{noisy_saturation, TRUE_LOG_K};

    #[test]
    fn residuals_skip_disabled_rows() {
        let mut model = noisy_saturation(10, 2);
        let full = model.residuals().len();
        let mut dependent = model.dependent().clone();
        dependent.disable_row(0).unwrap();
        dependent.disable_row(5).unwrap();
        model.override_dependent(dependent);
        assert_eq!(full, 20);
        assert_eq!(model.residuals().len(), 16);
        assert_eq!(model.data_points(), 16);
    }

    #[test]
    fn degrees_of_freedom_never_underflow() {
        let mut model = noisy_saturation(4, 1);
        let mut dependent = model.dependent().clone();
        for row in 0..4 {
            dependent.disable_row(row).unwrap();
        }
        model.override_dependent(dependent);
        assert_eq!(model.degrees_of_freedom(), 0);
        assert!(model.standard_error_of_y().is_nan());
    }

    #[test]
    fn model_table_reproduces_predictions_and_mask() {
        let mut model = noisy_saturation(8, 1);
        let mut dependent = model.dependent().clone();
        dependent.disable_row(3).unwrap();
        model.override_dependent(dependent);

        let table = model.model_table();
        assert!(!table.is_enabled(3));
        for row in 0..table.rows() {
            assert_eq!(table.row(row), model.predict(row));
        }
    }

    #[test]
    fn export_then_import_restores_parameters() {
        let mut model = noisy_saturation(8, 1);
        let record = model.export_parameters();
        let mut shifted = record.values.clone();
        shifted[0] += 1.0;
        model.set_parameters(&shifted);
        model.import_parameters(&record).unwrap();
        assert_eq!(model.parameters()[0], TRUE_LOG_K);
    }

    #[test]
    fn import_rejects_wrong_parameter_count() {
        let mut model = noisy_saturation(8, 1);
        let record = ParameterRecord {
            names: vec!["lg K".into()],
            values: vec![1.0],
            sse: 0.0,
        };
        assert_eq!(
            model.import_parameters(&record),
            Err(ModelError::ParameterCount {
                expected: 3,
                found: 1
            })
        );
    }

    #[test]
    fn boxed_models_clone_independently() {
        let model: Box<dyn Model> = Box::new(noisy_saturation(6, 1));
        let mut copy = model.clone();
        copy.set_parameters(&[0.0, 0.0, 0.0]);
        assert_eq!(model.parameters()[0], TRUE_LOG_K);
        assert_eq!(copy.parameters()[0], 0.0);
    }
}
