//! # Core Module
//!
//! The collaborators the uncertainty engine is built on. None of them know about
//! resampling or concurrency; the engine only relies on the contracts below.
//!
//! - **Data** ([`data`]) - Two-dimensional numeric tables with a per-row enable mask
//!   and the perturbation primitives used for Monte Carlo and bootstrap sampling.
//! - **Models** ([`models`]) - The object-safe `Model` trait, derived goodness-of-fit
//!   statistics and a reference hyperbolic saturation model.
//! - **Fitting** ([`fit`]) - The `Fitter` contract and a Levenberg–Marquardt
//!   minimizer that supports holding parameters fixed.

pub mod data;
pub mod fit;
pub mod models;
