//! # Engine Module
//!
//! The uncertainty-quantification machinery. Every statistical method is
//! expressed as a set of independent refits of a cloned model, scheduled through
//! one shared queue and drained by a bounded worker pool.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Typed controllers for each method, with
//!   defaults, validation and builders
//! - **Scheduling** ([`queue`], [`worker`]) - A mutex-protected batch queue with a
//!   cooperative interrupt flag, and workers that own private model clones
//! - **Statistics** ([`statistics`]) - Percentile bars, the F-statistic SSE
//!   threshold, order-statistic summaries and result sets
//! - **Tasks** ([`tasks`]) - The Monte Carlo, profile grid search, model comparison
//!   and resampling engines
//! - **State** ([`state`]) - Aggregated job results and the per-model statistics
//!   store they are merged into
//! - **Infrastructure** ([`context`], [`progress`], [`error`]) - Shared run context,
//!   progress callbacks and error types
//!
//! Engines never mutate the caller's model. Workers clone it once and reset the
//! parameters to the fitted optimum before every job.

pub mod config;
pub mod context;
pub mod error;
pub mod progress;
pub mod queue;
pub mod state;
pub mod statistics;
pub mod tasks;
pub mod worker;
