//! The statistical engines.
//!
//! Each engine is a long-lived struct owning the work queue it fills on every
//! run. A run validates its controller, generates keyed work items, lets the
//! shared [`WorkerPool`](crate::engine::worker::WorkerPool) drain them and
//! aggregates the keyed results into a [`JobResult`](crate::engine::state::JobResult).
//!
//! - [`monte_carlo`] - perturbation and bootstrap resampling of the dependent data
//! - [`grid_search`] - directional profile searches along single parameters
//! - [`model_comparison`] - joint confidence box sampling and fast bisection limits
//! - [`resample`] - leave-X-out cross-validation and data-reduction analysis

pub mod grid_search;
pub mod model_comparison;
pub mod monte_carlo;
pub mod resample;

use rand::SeedableRng;
use rand::rngs::StdRng;

pub(crate) fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}
