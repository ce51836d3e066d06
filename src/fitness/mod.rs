//! Fitness values, comparison, Pareto ranking and the best-individual archive.
//!
//! All objective values are stored so that **lower is better**; see
//! [`Fitness`] for the convention and [`FitnessMode`] for the two comparison
//! modes.
//!
//! # Submodules
//!
//! - [`non_dominated_sort`] / [`crowding_distance`]: NSGA-II utilities
//! - [`rank_order`]: best-first ordering under either mode
//! - [`Archive`]: bounded hall of fame / Pareto front

mod archive;
mod pareto;
mod types;

pub use archive::Archive;
pub use pareto::{crowding_distance, non_dominated_sort, rank_order, Fronts};
pub use types::{Fitness, FitnessMode};
