//! Bounded archive of the best individuals seen so far.

use std::collections::HashSet;

use super::pareto::{crowding_distance, non_dominated_sort};
use super::types::{Fitness, FitnessMode};
use crate::population::{unique_by_graph, Individual};

/// Capacity-bounded store of the best individuals across generations.
///
/// - [`FitnessMode::Pareto`]: members are mutually non-dominated; when the
///   front exceeds the capacity, the most crowded members are evicted.
/// - [`FitnessMode::Single`]: a hall of fame holding the `capacity` best
///   individuals by scalar order.
///
/// Members are unique by graph and kept best first. Individuals without a
/// fitness are never admitted.
#[derive(Debug, Clone)]
pub struct Archive {
    mode: FitnessMode,
    capacity: usize,
    members: Vec<Individual>,
}

impl Archive {
    /// Creates an empty archive. A capacity of 0 is raised to 1.
    pub fn new(mode: FitnessMode, capacity: usize) -> Self {
        Self {
            mode,
            capacity: capacity.max(1),
            members: Vec::new(),
        }
    }

    /// Comparison mode.
    pub fn mode(&self) -> FitnessMode {
        self.mode
    }

    /// Maximum number of members.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current members, best first.
    pub fn members(&self) -> &[Individual] {
        &self.members
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// `true` when nothing has been admitted yet.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The first member (best scalar fitness, or the most isolated point of
    /// the Pareto front).
    pub fn best(&self) -> Option<&Individual> {
        self.members.first()
    }

    /// Merges `candidates` into the archive.
    ///
    /// Returns `true` when the member set changed.
    pub fn update(&mut self, candidates: &[Individual]) -> bool {
        let before: HashSet<String> = self
            .members
            .iter()
            .map(|m| m.descriptive_id().to_string())
            .collect();

        let pool = unique_by_graph(
            self.members
                .iter()
                .chain(candidates)
                .filter(|c| c.fitness().is_some_and(Fitness::is_valid))
                .cloned(),
        );

        self.members = match self.mode {
            FitnessMode::Single => self.hall_of_fame(pool),
            FitnessMode::Pareto => self.pareto_front(pool),
        };

        self.members.len() != before.len()
            || self.members.iter().any(|m| !before.contains(m.descriptive_id()))
    }

    fn hall_of_fame(&self, mut pool: Vec<Individual>) -> Vec<Individual> {
        pool.sort_by(|a, b| match (a.fitness(), b.fitness()) {
            (Some(fa), Some(fb)) => fa.cmp_scalar(fb),
            _ => std::cmp::Ordering::Equal,
        });
        pool.truncate(self.capacity);
        pool
    }

    fn pareto_front(&self, pool: Vec<Individual>) -> Vec<Individual> {
        let fitness: Vec<&Fitness> = pool.iter().filter_map(Individual::fitness).collect();
        let sorted = non_dominated_sort(&fitness);
        let Some(front) = sorted.fronts.first() else {
            return Vec::new();
        };

        let front_fitness: Vec<&Fitness> = front.iter().map(|&i| fitness[i]).collect();
        let distance = crowding_distance(&front_fitness);
        let mut positions: Vec<usize> = (0..front.len()).collect();
        positions.sort_by(|&a, &b| distance[b].total_cmp(&distance[a]));
        positions.truncate(self.capacity);
        positions.into_iter().map(|p| pool[front[p]].clone()).collect()
    }
}
