use thiserror::Error;

use super::config::{ConfigError, Method};
use crate::core::data::table::TableError;
use crate::core::models::model::ModelError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid {method} job: {reason}")]
    InvalidConfiguration { method: Method, reason: String },

    #[error("{method} produced no usable results from {total} fits: {reason}")]
    EmptyAggregation {
        method: Method,
        total: usize,
        reason: String,
    },

    #[error("{method} job not started: an interrupt is pending")]
    Interrupted { method: Method },

    #[error("Controller rejected: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("Model error: {source}")]
    Model {
        #[from]
        source: ModelError,
    },

    #[error("Data table error: {source}")]
    Table {
        #[from]
        source: TableError,
    },

    #[error("Internal logic error: {0}")]
    Internal(String),
}
