//! Domain-agnostic evolutionary optimization over DAG-structured individuals.
//!
//! The crate has two tightly coupled halves:
//!
//! - **Engine**: a small state-machine scheduler. Named operations
//!   ("nodes") are wired by a routing table ("scheme") and driven in rounds
//!   by a sequential or parallel runner until a stop condition holds; the
//!   finished tasks are folded back into the shared run parameters.
//! - **Genetic operators**: elitism, selection, crossover, mutation,
//!   inheritance, regularization and evaluation, expressed as engine nodes
//!   and composed into a generational loop, plus a Pareto archive.
//!
//! Individuals are arbitrary DAGs (computational pipelines, synthetic
//! graphs, molecular structures) whose structural invariants are enforced
//! by a pluggable constraint rule set.
//!
//! # Modules
//!
//! - [`graph`]: the DAG model, checked edits and constraint rules
//! - [`fitness`]: fitness values, Pareto ranking and the archive
//! - [`population`]: individuals and population helpers
//! - [`engine`]: tasks, nodes, schemes, runners and stages
//! - [`ga`]: genetic operators, configuration and the optimizer
//!
//! # Conventions
//!
//! Fitness values are stored in minimization space: lower is better for
//! every objective, and maximized metrics are negated by the
//! [`Objective`](ga::Objective). "Best first" orderings follow that
//! convention everywhere.

pub mod engine;
pub mod error;
pub mod fitness;
pub mod ga;
pub mod graph;
pub mod population;

pub use error::{EvoError, Result};
