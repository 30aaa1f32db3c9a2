use super::model::Model;
use super::saturation::SaturationModel;
use crate::core::data::table::DataTable;
use crate::core::fit::minimizer::{Fitter, LevenbergMarquardt};

pub const TRUE_LOG_K: f64 = 3.0;
pub const NOISE_AMPLITUDE: f64 = 0.01;

pub fn true_parameters(columns: usize) -> Vec<f64> {
    let mut parameters = vec![TRUE_LOG_K];
    for j in 0..columns {
        parameters.push(1.0 + j as f64);
        parameters.push(2.0 - 0.5 * j as f64);
    }
    parameters
}

/// Synthetic titration with deterministic pseudo-noise, parameters set to the
/// generating values.
pub fn noisy_saturation(rows: usize, columns: usize) -> SaturationModel {
    let x: Vec<f64> = (0..rows).map(|i| i as f64 * 4e-4).collect();
    let independent = DataTable::from_columns(&[x.clone()]).unwrap();
    let truth = SaturationModel::new(independent.clone(), independent.clone())
        .unwrap()
        .with_parameters(vec![TRUE_LOG_K, 0.0, 1.0])
        .unwrap();

    let dependent_columns: Vec<Vec<f64>> = (0..columns)
        .map(|j| {
            let y0 = 1.0 + j as f64;
            let delta = 2.0 - 0.5 * j as f64;
            (0..rows)
                .map(|i| {
                    let fraction = truth.predict(i)[0];
                    let noise = NOISE_AMPLITUDE * (1.3 * i as f64 + 0.7 * j as f64).sin();
                    y0 + delta * fraction + noise
                })
                .collect()
        })
        .collect();
    let dependent = DataTable::from_columns(&dependent_columns).unwrap();

    SaturationModel::new(independent, dependent)
        .unwrap()
        .with_parameters(true_parameters(columns))
        .unwrap()
}

/// The synthetic titration after a full least-squares fit.
pub fn fitted_saturation(rows: usize, columns: usize) -> SaturationModel {
    let mut model = noisy_saturation(rows, columns);
    let locked = vec![false; model.parameter_count()];
    let outcome = LevenbergMarquardt::default().fit(&mut model, &locked);
    assert!(outcome.converged, "fixture fit did not converge");
    model
}
