//! Nonlinear least-squares fitting.

pub mod minimizer;
