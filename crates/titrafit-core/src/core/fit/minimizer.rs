use crate::core::models::model::Model;
use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use tracing::trace;

const MAX_DAMPING: f64 = 1e16;
const MIN_DAMPING: f64 = 1e-12;
const STALL_LIMIT: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitOutcome {
    pub parameters: Vec<f64>,
    pub sse: f64,
    pub converged: bool,
    pub degrees_of_freedom: usize,
    pub iterations: usize,
}

/// Minimizes a model's sum of squared residuals in place.
///
/// `locked[i] == true` holds parameter `i` at its current value. On return the
/// model carries the best parameters found, whether or not the fit converged.
pub trait Fitter: Send + Sync {
    fn fit(&self, model: &mut dyn Model, locked: &[bool]) -> FitOutcome;
}

#[derive(Debug, Clone, PartialEq)]
pub struct LevenbergMarquardt {
    pub max_iterations: usize,
    /// Relative SSE improvement below which the fit is considered converged.
    pub tolerance: f64,
    pub initial_damping: f64,
    /// Relative forward-difference step for the numerical Jacobian.
    pub derivative_step: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-10,
            initial_damping: 1e-3,
            derivative_step: 1e-7,
        }
    }
}

impl LevenbergMarquardt {
    fn jacobian(
        &self,
        model: &mut dyn Model,
        parameters: &[f64],
        free: &[usize],
        base: &[f64],
    ) -> DMatrix<f64> {
        let mut jacobian = DMatrix::zeros(base.len(), free.len());
        let mut trial = parameters.to_vec();
        for (column, &p) in free.iter().enumerate() {
            let h = self.derivative_step * parameters[p].abs().max(1e-3);
            trial[p] = parameters[p] + h;
            model.set_parameters(&trial);
            for (row, (shifted, reference)) in model.residuals().iter().zip(base).enumerate() {
                jacobian[(row, column)] = (shifted - reference) / h;
            }
            trial[p] = parameters[p];
        }
        model.set_parameters(parameters);
        jacobian
    }
}

fn sum_of_squares(residuals: &[f64]) -> f64 {
    residuals.iter().map(|r| r * r).sum()
}

impl Fitter for LevenbergMarquardt {
    fn fit(&self, model: &mut dyn Model, locked: &[bool]) -> FitOutcome {
        let free: Vec<usize> = (0..model.parameter_count())
            .filter(|&i| !locked.get(i).copied().unwrap_or(false))
            .collect();
        let degrees_of_freedom = model.degrees_of_freedom();
        let mut parameters = model.parameters().to_vec();
        let mut residuals = model.residuals();
        let mut sse = sum_of_squares(&residuals);

        if !sse.is_finite() {
            return FitOutcome {
                parameters,
                sse,
                converged: false,
                degrees_of_freedom,
                iterations: 0,
            };
        }
        if free.is_empty() || residuals.is_empty() {
            return FitOutcome {
                parameters,
                sse,
                converged: true,
                degrees_of_freedom,
                iterations: 0,
            };
        }

        let mut damping = self.initial_damping;
        let mut converged = false;
        let mut iterations = 0;
        let mut stalled = 0;

        'outer: while iterations < self.max_iterations {
            iterations += 1;
            let jacobian = self.jacobian(model, &parameters, &free, &residuals);
            let jtj = jacobian.transpose() * &jacobian;
            let gradient = jacobian.transpose() * DVector::from_column_slice(&residuals);

            loop {
                let mut normal = jtj.clone();
                for d in 0..free.len() {
                    normal[(d, d)] += damping * jtj[(d, d)].max(MIN_DAMPING);
                }
                let Some(step) = normal.cholesky().map(|c| c.solve(&gradient)) else {
                    damping *= 10.0;
                    if damping > MAX_DAMPING {
                        converged = true;
                        break 'outer;
                    }
                    continue;
                };

                let mut trial = parameters.clone();
                for (d, &p) in free.iter().enumerate() {
                    trial[p] -= step[d];
                }
                model.set_parameters(&trial);
                let trial_residuals = model.residuals();
                let trial_sse = sum_of_squares(&trial_residuals);

                if trial_sse.is_finite() && trial_sse <= sse {
                    let previous = sse;
                    parameters = trial;
                    residuals = trial_residuals;
                    sse = trial_sse;
                    damping = (damping / 10.0).max(MIN_DAMPING);
                    if previous - sse <= self.tolerance * previous.max(f64::MIN_POSITIVE) {
                        stalled += 1;
                        if stalled >= STALL_LIMIT {
                            converged = true;
                            break 'outer;
                        }
                    } else {
                        stalled = 0;
                    }
                    break;
                }

                damping *= 10.0;
                if damping > MAX_DAMPING {
                    // No descent direction left at this point.
                    converged = true;
                    break 'outer;
                }
            }
        }

        model.set_parameters(&parameters);
        trace!(iterations, sse, converged, "Levenberg-Marquardt finished");

        FitOutcome {
            parameters,
            sse,
            converged,
            degrees_of_freedom,
            iterations,
        }
    }
}
