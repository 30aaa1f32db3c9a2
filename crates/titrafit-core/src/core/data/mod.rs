//! Tabular data consumed and produced by models.

pub mod table;
