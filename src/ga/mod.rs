//! Genetic operators, configuration and the optimizer loop.
//!
//! Every operator is exposed as an engine [`Node`](crate::engine::Node)
//! working on a [`Task`](crate::engine::Task); the default pipeline wires
//! them into three stages (see [`default_stages`]). [`Optimizer`] runs
//! the stages once per generation and keeps the [`Archive`](crate::fitness::Archive).
//!
//! # Core Traits
//!
//! - [`MutationOperator`] / [`CrossoverOperator`]: structural edits on graphs
//! - [`OperatorAgent`]: picks the mutation operator and learns from rewards
//! - [`HistorySink`]: per-generation observer
//!
//! # Key Types
//!
//! - [`GraphRequirements`], [`GraphGenerationParams`], [`AlgorithmParams`]: configuration
//! - [`Objective`]: named metrics turned into a [`Fitness`](crate::fitness::Fitness)
//! - [`Optimizer`] / [`optimize`]: entry points
//! - [`OptimizationResult`]: final population with run statistics
//!
//! # References
//!
//! - Holland (1975), *Adaptation in Natural and Artificial Systems*
//! - Koza (1992), *Genetic Programming*
//! - Deb et al. (2002), *A Fast and Elitist Multiobjective GA: NSGA-II*

pub mod agent;
mod config;
pub mod crossover;
pub mod elitism;
pub mod evaluator;
mod history;
pub mod inheritance;
pub mod mutation;
mod objective;
mod optimizer;
pub mod pipeline;
pub mod population_size;
pub mod regularization;
pub mod selection;
mod types;

pub use agent::{AdaptiveAgent, RandomAgent, WeightedAgent};
pub use config::{AlgorithmParams, GraphGenerationParams, GraphRequirements};
pub use crossover::CrossoverType;
pub use elitism::ElitismType;
pub use history::{GenerationSnapshot, HistorySink, MemoryHistory};
pub use inheritance::InheritanceType;
pub use mutation::MutationType;
pub use objective::{Direction, EvaluationCache, Metric, MetricFn, Objective};
pub use optimizer::{optimize, OptimizationResult, Optimizer, StageFactory};
pub use pipeline::default_stages;
pub use population_size::PopulationSizePolicy;
pub use regularization::RegularizationType;
pub use selection::Selection;
pub use types::{CrossoverOperator, MutationOperator, OperatorAgent, OperatorSet};
