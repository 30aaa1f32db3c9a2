//! # Titrafit Core Library
//!
//! Uncertainty quantification for nonlinear models fitted to titration data.
//! Given a fitted model and its dataset, the library estimates confidence
//! intervals and cross-validation diagnostics by refitting the model many times
//! over perturbed, stepped or reduced copies of the data on a bounded worker pool.
//!
//! ## Architectural Philosophy
//!
//! The crate follows a strict three-layer split:
//!
//! - **[`core`]: The Collaborators.** Data tables with a per-row enable mask, the
//!   object-safe [`Model`](core::models::model::Model) trait with a reference
//!   nonlinear model, and the [`Fitter`](core::fit::minimizer::Fitter) trait with a
//!   Levenberg–Marquardt implementation.
//!
//! - **[`engine`]: The Uncertainty Engine.** Controllers, the shared work queue,
//!   the generic worker pool and the four statistical engines (Monte Carlo,
//!   profile grid search, model comparison, resampling).
//!
//! - **[`workflows`]: The Public API.** The [`JobDispatcher`](workflows::jobs::JobDispatcher)
//!   routes job descriptors to engines and merges their results into the owning
//!   model's statistics store.

pub mod core;
pub mod engine;
pub mod workflows;
