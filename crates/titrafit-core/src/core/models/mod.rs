//! # Core Models Module
//!
//! A model owns its independent and dependent tables plus a flat parameter
//! vector. Global parameters come first, followed by the local (per dependent
//! column) parameters.
//!
//! - [`model`] - The `Model` trait and the exported `ParameterRecord`
//! - [`saturation`] - Hyperbolic saturation model used by the CLI and the tests

pub mod model;
pub mod saturation;

#[cfg(test)]
pub(crate) mod fixtures;
