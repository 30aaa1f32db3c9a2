//! # Workflows Module
//!
//! High-level entry points that tie the collaborators and the engines together.
//!
//! ## Overview
//!
//! Callers hold an [`AnalysedModel`](jobs::AnalysedModel) (a fitted model plus
//! its statistics store) and a long-lived [`JobDispatcher`](jobs::JobDispatcher).
//! Submitting a [`Controller`](crate::engine::config::Controller) routes it to the
//! matching engine, blocks until the shared worker pool has drained, and merges
//! the result into the store under the controller's method tag.
//!
//! - **Job dispatch** ([`jobs`]) - engine routing, result merging, batch job lists
//!   and cooperative interruption from other threads.

pub mod jobs;
