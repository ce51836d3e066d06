//! Individuals and population helpers.
//!
//! An [`Individual`] owns an immutable graph snapshot, an optional fitness
//! that is frozen once set, and [`Lineage`] metadata for provenance. A
//! population is a plain `Vec<Individual>`; the free functions here rank,
//! deduplicate and filter it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::fitness::{rank_order, Fitness, FitnessMode};
use crate::graph::Graph;

/// An ordered sequence of individuals.
pub type Population = Vec<Individual>;

static NEXT_INDIVIDUAL: AtomicU64 = AtomicU64::new(0);

/// Process-unique individual identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndividualId(pub u64);

impl IndividualId {
    fn next() -> Self {
        IndividualId(NEXT_INDIVIDUAL.fetch_add(1, Ordering::Relaxed))
    }
}

/// Where an individual came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Lineage {
    /// Generation the individual was created in.
    pub generation: usize,
    /// Individuals it was derived from.
    pub parents: Vec<IndividualId>,
    /// Name of the operator that produced it (`None` for initial individuals).
    pub operator: Option<String>,
}

/// A candidate solution: graph snapshot, fitness and lineage.
#[derive(Debug, Clone)]
pub struct Individual {
    id: IndividualId,
    graph: Arc<Graph>,
    graph_id: Arc<str>,
    fitness: Option<Fitness>,
    lineage: Lineage,
}

impl Individual {
    /// Wraps a graph as an initial (generation 0) individual.
    pub fn new(graph: Graph) -> Self {
        Self::with_lineage(graph, Lineage::default())
    }

    /// Wraps a graph produced by `operator` from `parents`.
    pub fn offspring(graph: Graph, parents: &[&Individual], operator: &str, generation: usize) -> Self {
        Self::with_lineage(
            graph,
            Lineage {
                generation,
                parents: parents.iter().map(|p| p.id).collect(),
                operator: Some(operator.to_string()),
            },
        )
    }

    fn with_lineage(graph: Graph, lineage: Lineage) -> Self {
        let graph_id: Arc<str> = graph.descriptive_id().into();
        Self {
            id: IndividualId::next(),
            graph: Arc::new(graph),
            graph_id,
            fitness: None,
            lineage,
        }
    }

    /// Unique id.
    pub fn id(&self) -> IndividualId {
        self.id
    }

    /// The graph snapshot.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Canonical structural id of the graph (cached at creation).
    pub fn descriptive_id(&self) -> &str {
        &self.graph_id
    }

    /// Fitness, if evaluated successfully.
    pub fn fitness(&self) -> Option<&Fitness> {
        self.fitness.as_ref()
    }

    /// `true` once a fitness has been stored.
    pub fn is_evaluated(&self) -> bool {
        self.fitness.is_some()
    }

    /// Provenance metadata.
    pub fn lineage(&self) -> &Lineage {
        &self.lineage
    }

    /// Stores the fitness. A fitness is frozen once set: later calls leave it
    /// unchanged and return `false`.
    pub fn set_fitness(&mut self, fitness: Fitness) -> bool {
        if self.fitness.is_some() {
            return false;
        }
        self.fitness = Some(fitness);
        true
    }

    /// Builder form of [`set_fitness`](Self::set_fitness).
    pub fn with_fitness(mut self, fitness: Fitness) -> Self {
        self.set_fitness(fitness);
        self
    }
}

/// Indices of `population` ordered best first (unevaluated last).
pub fn ranked_indices(population: &[Individual], mode: FitnessMode) -> Vec<usize> {
    let fitness: Vec<Option<&Fitness>> = population.iter().map(Individual::fitness).collect();
    rank_order(&fitness, mode)
}

/// A copy of `population` sorted best first.
pub fn sorted_best_first(population: &[Individual], mode: FitnessMode) -> Population {
    ranked_indices(population, mode)
        .into_iter()
        .map(|i| population[i].clone())
        .collect()
}

/// The best evaluated individual, if any.
pub fn best(population: &[Individual], mode: FitnessMode) -> Option<&Individual> {
    ranked_indices(population, mode)
        .first()
        .map(|&i| &population[i])
        .filter(|ind| ind.is_evaluated())
}

/// Keeps the first individual of each distinct graph.
pub fn unique_by_graph(population: impl IntoIterator<Item = Individual>) -> Population {
    let mut seen = std::collections::HashSet::new();
    population
        .into_iter()
        .filter(|ind| seen.insert(ind.graph_id.clone()))
        .collect()
}

/// Only the evaluated individuals.
pub fn evaluated(population: &[Individual]) -> Population {
    population.iter().filter(|i| i.is_evaluated()).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ConstraintRules, NodeContent};

    fn graph(names: &[&str]) -> Graph {
        Graph::chain(
            names.iter().map(|n| NodeContent::new(*n)),
            Arc::new(ConstraintRules::dag()),
        )
        .unwrap()
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Individual::new(graph(&["a"]));
        let b = Individual::new(graph(&["a"]));
        assert_ne!(a.id(), b.id());
        assert_eq!(a.descriptive_id(), b.descriptive_id());
    }

    #[test]
    fn test_fitness_frozen() {
        let mut ind = Individual::new(graph(&["a"]));
        assert!(!ind.is_evaluated());
        assert!(ind.set_fitness(Fitness::single(1.0)));
        assert!(!ind.set_fitness(Fitness::single(0.0)));
        assert_eq!(ind.fitness(), Some(&Fitness::single(1.0)));
    }

    #[test]
    fn test_offspring_lineage() {
        let p1 = Individual::new(graph(&["a"]));
        let p2 = Individual::new(graph(&["b"]));
        let child = Individual::offspring(graph(&["a", "b"]), &[&p1, &p2], "subtree", 3);
        assert_eq!(child.lineage().generation, 3);
        assert_eq!(child.lineage().parents, vec![p1.id(), p2.id()]);
        assert_eq!(child.lineage().operator.as_deref(), Some("subtree"));
    }

    #[test]
    fn test_best_and_sorting() {
        let pop = vec![
            Individual::new(graph(&["a"])).with_fitness(Fitness::single(3.0)),
            Individual::new(graph(&["b"])),
            Individual::new(graph(&["c"])).with_fitness(Fitness::single(1.0)),
        ];
        let best = best(&pop, FitnessMode::Single).unwrap();
        assert_eq!(best.descriptive_id(), "/c");
        let sorted = sorted_best_first(&pop, FitnessMode::Single);
        assert_eq!(sorted[2].descriptive_id(), "/b");
    }

    #[test]
    fn test_best_of_unevaluated() {
        let pop = vec![Individual::new(graph(&["a"]))];
        assert!(best(&pop, FitnessMode::Single).is_none());
    }

    #[test]
    fn test_unique_by_graph() {
        let pop = vec![
            Individual::new(graph(&["a", "b"])),
            Individual::new(graph(&["a", "b"])),
            Individual::new(graph(&["b"])),
        ];
        assert_eq!(unique_by_graph(pop).len(), 2);
    }
}
