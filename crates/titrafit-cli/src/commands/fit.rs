use super::load_model;
use crate::cli::FitArgs;
use crate::error::Result;
use crate::report;
use titrafit::core::fit::minimizer::{Fitter, LevenbergMarquardt};
use titrafit::core::models::model::Model;
use tracing::{info, warn};

pub fn run(args: FitArgs) -> Result<()> {
    let mut model = load_model(&args.data)?;

    info!(
        parameters = model.parameter_count(),
        points = model.data_points(),
        "Fitting the saturation model."
    );
    let locked = vec![false; model.parameter_count()];
    let outcome = LevenbergMarquardt::default().fit(&mut model, &locked);
    if !outcome.converged {
        warn!(
            iterations = outcome.iterations,
            "Fit stopped without converging"
        );
    }

    println!("{}", report::fit_summary(&model, &outcome));
    Ok(())
}
