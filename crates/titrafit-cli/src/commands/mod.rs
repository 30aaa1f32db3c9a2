pub mod analyze;
pub mod fit;

use crate::cli::DataArgs;
use crate::data::load_csv;
use crate::error::Result;
use titrafit::core::models::saturation::SaturationModel;
use tracing::info;

/// Loads the dataset and builds the saturation model with its initial guess.
pub(crate) fn load_model(args: &DataArgs) -> Result<SaturationModel> {
    let dataset = load_csv(&args.input, args.independent_columns)?;
    let model = SaturationModel::new(dataset.independent, dataset.dependent)?;
    Ok(match args.log_k {
        Some(log_k) => {
            info!(log_k, "Using the initial binding constant from the command line.");
            model.with_log_k(log_k)
        }
        None => model,
    })
}
