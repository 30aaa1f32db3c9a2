use titrafit::core::fit::minimizer::FitOutcome;
use titrafit::core::models::model::Model;
use titrafit::engine::state::{Diagnostics, JobResult};
use titrafit::engine::tasks::grid_search::Termination;

pub fn fit_summary(model: &dyn Model, outcome: &FitOutcome) -> String {
    let status = if outcome.converged {
        "converged"
    } else {
        "did NOT converge"
    };
    let mut lines = vec![
        format!(
            "Model '{}': {} data points, {} parameters",
            model.name(),
            model.data_points(),
            model.parameter_count()
        ),
        format!("Fit {} after {} iterations", status, outcome.iterations),
        format!(
            "  SSE = {:.6e}   SEy = {:.6e}   dof = {}",
            outcome.sse,
            model.standard_error_of_y(),
            outcome.degrees_of_freedom
        ),
    ];
    for (name, value) in model.parameter_names().iter().zip(model.parameters()) {
        lines.push(format!("  {:<16} {:>14.6}", name, value));
    }
    lines.join("\n")
}

fn diagnostics_line(diagnostics: &Diagnostics) -> String {
    match diagnostics {
        Diagnostics::MonteCarlo(d) => match d.sigma {
            Some(sigma) => format!(
                "{} of {} samples converged (gaussian noise, sigma = {:.4e})",
                d.converged, d.samples, sigma
            ),
            None => format!(
                "{} of {} samples converged (bootstrap over {} residuals)",
                d.converged, d.samples, d.bootstrap_pool
            ),
        },
        Diagnostics::GridSearch(d) => {
            let converged = d
                .directions
                .iter()
                .filter(|o| o.termination == Termination::Converged)
                .count();
            format!(
                "{} of {} directions crossed the SSE threshold {:.4e}",
                converged,
                d.directions.len(),
                d.threshold
            )
        }
        Diagnostics::ModelComparison(d) => format!(
            "{} of {} samples inside the region; box area {:.4e}, region area {:.4e}",
            d.inside, d.total, d.box_area, d.ellipsoid_area
        ),
        Diagnostics::FastConfidence(d) => format!(
            "{} of {} limits located at SSE threshold {:.4e}",
            d.limits.iter().filter(|l| l.converged).count(),
            d.limits.len(),
            d.threshold
        ),
        Diagnostics::CrossValidation(d) => format!(
            "{} of {} subsets converged ({:?} subsets), PRESS = {:.4e}",
            d.converged, d.jobs, d.algorithm, d.press
        ),
        Diagnostics::Reduction(d) => format!(
            "{} reduced datasets, trimming to at least {} rows",
            d.series.len(),
            d.minimum_rows
        ),
    }
}

/// Confidence table and one diagnostics line for a stored run.
pub fn job_summary(result: &JobResult) -> String {
    let confidence = result
        .parameters
        .first()
        .map(|p| format!(" ({}% confidence)", p.confidence))
        .unwrap_or_default();
    let mut lines = vec![format!("{}{}", result.method().label(), confidence)];
    if result.interrupted {
        lines.push("  ⚠ interrupted: statistics cover a partial run".to_string());
    }
    lines.push(format!(
        "  {:<16} {:>14} {:>14} {:>14}",
        "parameter", "value", "lower", "upper"
    ));
    for p in &result.parameters {
        lines.push(format!(
            "  {:<16} {:>14.6} {:>14.6} {:>14.6}",
            p.name, p.value, p.bar.lower, p.bar.upper
        ));
    }
    lines.push(format!("  {}", diagnostics_line(&result.diagnostics)));
    lines.join("\n")
}
