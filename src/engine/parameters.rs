//! Run state shared by every task of a stage.

use crate::fitness::FitnessMode;
use crate::ga::{AlgorithmParams, GraphGenerationParams, GraphRequirements};
use crate::population::Population;

/// Configuration plus evolving population state.
///
/// Tasks see a read-only snapshot; only stage parameter updaters (and the
/// optimizer between generations) produce new values.
#[derive(Debug, Clone, Default)]
pub struct Parameters {
    /// Run-level limits.
    pub requirements: GraphRequirements,
    /// Graph generation settings (rules, node vocabulary).
    pub graph: GraphGenerationParams,
    /// Genetic algorithm settings.
    pub algorithm: AlgorithmParams,
    /// Current population.
    pub population: Population,
    /// Offspring collected by the evolution stage.
    pub new_population: Population,
    /// Top individuals of the previous generation (archive members).
    pub best_individuals: Population,
    /// Completed generations.
    pub generation: usize,
    /// Whether the last generation improved the archive.
    pub improved: bool,
}

impl Parameters {
    /// Creates parameters around an initial population.
    pub fn new(
        requirements: GraphRequirements,
        graph: GraphGenerationParams,
        algorithm: AlgorithmParams,
        population: Population,
    ) -> Self {
        Self {
            requirements,
            graph,
            algorithm,
            population,
            ..Self::default()
        }
    }

    /// Comparison mode implied by the algorithm settings.
    pub fn fitness_mode(&self) -> FitnessMode {
        if self.algorithm.multi_objective {
            FitnessMode::Pareto
        } else {
            FitnessMode::Single
        }
    }
}
