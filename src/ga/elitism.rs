//! Elitism: carrying the best individuals of the previous generation over.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::RngCore;

use super::config::AlgorithmParams;
use crate::engine::{Node, NodeOutput, Task};
use crate::error::{EvoError, Result};
use crate::fitness::FitnessMode;
use crate::population::{sorted_best_first, Individual, Population};

/// Node name used in schemes.
pub const NODE: &str = "elitism";

/// Elitism policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ElitismType {
    /// Shuffle the new population and overwrite its first slots with the
    /// elites.
    #[default]
    KeepNBest,
    /// Merge elites into the new population and keep the best, same size.
    ReplaceWorst,
    /// No elitism.
    None,
}

impl fmt::Display for ElitismType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ElitismType::KeepNBest => "keep_n_best",
            ElitismType::ReplaceWorst => "replace_worst",
            ElitismType::None => "none",
        };
        f.write_str(s)
    }
}

impl FromStr for ElitismType {
    type Err = EvoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "keep_n_best" => Ok(ElitismType::KeepNBest),
            "replace_worst" => Ok(ElitismType::ReplaceWorst),
            "none" => Ok(ElitismType::None),
            other => Err(EvoError::config(format!("unknown elitism type: {other}"))),
        }
    }
}

/// Elitism is off in multi-objective mode and for populations below
/// `min_pop_size_with_elitism`.
pub fn is_applicable(params: &AlgorithmParams) -> bool {
    !params.multi_objective && params.pop_size >= params.min_pop_size_with_elitism
}

/// Applies the configured policy.
///
/// Returns `new_population` unchanged when elitism does not apply.
pub fn apply(
    best_individuals: &[Individual],
    new_population: Population,
    params: &AlgorithmParams,
    rng: &mut dyn RngCore,
) -> Population {
    if !is_applicable(params) {
        return new_population;
    }
    match params.elitism {
        ElitismType::KeepNBest => keep_n_best(best_individuals, new_population, rng),
        ElitismType::ReplaceWorst => replace_worst(best_individuals, new_population),
        ElitismType::None => new_population,
    }
}

/// Shuffles `new_population` and overwrites its first
/// `min(len(best), len(new))` slots with the elites.
pub fn keep_n_best(
    best_individuals: &[Individual],
    mut new_population: Population,
    rng: &mut dyn RngCore,
) -> Population {
    new_population.shuffle(rng);
    for (slot, elite) in new_population.iter_mut().zip(best_individuals) {
        *slot = elite.clone();
    }
    new_population
}

/// Merges the elites into `new_population` and keeps the best
/// `len(new_population)` individuals, best first.
///
/// Elites already present (same individual id) are not added twice.
pub fn replace_worst(best_individuals: &[Individual], new_population: Population) -> Population {
    let target = new_population.len();
    let present: HashSet<_> = new_population.iter().map(Individual::id).collect();
    let merged: Population = best_individuals
        .iter()
        .filter(|elite| !present.contains(&elite.id()))
        .cloned()
        .chain(new_population)
        .collect();
    let mut sorted = sorted_best_first(&merged, FitnessMode::Single);
    sorted.truncate(target);
    sorted
}

/// Applies elitism to the task's `generation`.
pub fn node() -> Node {
    Node::new(NODE, |mut task: Task| {
        let params = Arc::clone(task.parameters());
        let survivors = std::mem::take(&mut task.generation);
        task.generation = apply(
            &params.best_individuals,
            survivors,
            &params.algorithm,
            &mut task.rng,
        );
        NodeOutput::from(task.succeed())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitness::Fitness;
    use crate::graph::{ConstraintRules, Graph, NodeContent};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn individual(name: &str, fitness: f64) -> Individual {
        let graph = Graph::chain([NodeContent::new(name)], Arc::new(ConstraintRules::dag())).unwrap();
        Individual::new(graph).with_fitness(Fitness::single(fitness))
    }

    fn params(elitism: ElitismType, pop_size: usize, threshold: usize) -> AlgorithmParams {
        AlgorithmParams::default()
            .with_elitism(elitism)
            .with_pop_size(pop_size)
            .with_min_pop_size_with_elitism(threshold)
    }

    #[test]
    fn test_replace_worst_scenario() {
        // previous generation top-2 are the elites
        let elites = vec![individual("e1", 1.0), individual("e2", 2.0)];
        let new_population = vec![
            individual("a", 5.0),
            individual("b", 3.0),
            individual("c", 7.0),
            individual("d", 4.0),
        ];
        let mut rng = StdRng::seed_from_u64(0);
        let out = apply(
            &elites,
            new_population,
            &params(ElitismType::ReplaceWorst, 4, 4),
            &mut rng,
        );
        assert_eq!(out.len(), 4);
        let names: Vec<&str> = out.iter().map(|i| i.descriptive_id()).collect();
        assert_eq!(names, vec!["/e1", "/e2", "/b", "/d"]);
    }

    #[test]
    fn test_replace_worst_no_duplicate_elite() {
        let elite = individual("e", 1.0);
        let new_population = vec![elite.clone(), individual("a", 5.0)];
        let out = replace_worst(&[elite.clone()], new_population);
        assert_eq!(out.len(), 2);
        assert_eq!(out.iter().filter(|i| i.id() == elite.id()).count(), 1);
    }

    #[test]
    fn test_keep_n_best_contains_elites() {
        let elites = vec![individual("e1", 1.0), individual("e2", 2.0)];
        let new_population: Vec<_> = (0..6).map(|i| individual(&format!("n{i}"), 10.0)).collect();
        let mut rng = StdRng::seed_from_u64(7);
        let out = keep_n_best(&elites, new_population, &mut rng);
        assert_eq!(out.len(), 6);
        for elite in &elites {
            assert!(out.iter().any(|i| i.id() == elite.id()));
        }
    }

    #[test]
    fn test_keep_n_best_more_elites_than_slots() {
        let elites: Vec<_> = (0..3).map(|i| individual(&format!("e{i}"), i as f64)).collect();
        let mut rng = StdRng::seed_from_u64(7);
        let out = keep_n_best(&elites, vec![individual("n", 9.0)], &mut rng);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id(), elites[0].id());
    }

    #[test]
    fn test_disabled_below_threshold() {
        let elites = vec![individual("e", 0.0)];
        let new_population = vec![individual("a", 5.0), individual("b", 6.0)];
        let ids: Vec<_> = new_population.iter().map(Individual::id).collect();
        let mut rng = StdRng::seed_from_u64(0);
        let out = apply(&elites, new_population, &params(ElitismType::KeepNBest, 4, 5), &mut rng);
        assert_eq!(out.iter().map(Individual::id).collect::<Vec<_>>(), ids);
    }

    #[test]
    fn test_disabled_in_multi_objective() {
        let p = params(ElitismType::ReplaceWorst, 10, 2).with_multi_objective(true);
        assert!(!is_applicable(&p));
    }

    #[test]
    fn test_parse() {
        assert_eq!("replace_worst".parse::<ElitismType>(), Ok(ElitismType::ReplaceWorst));
        let err = "keep_best".parse::<ElitismType>().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(ElitismType::KeepNBest.to_string(), "keep_n_best");
    }
}
