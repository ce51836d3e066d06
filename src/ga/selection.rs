//! Parent selection.
//!
//! Selection determines which individuals of a task's population become
//! parents. All strategies work on the best-first order produced by
//! [`rank_order`](crate::fitness::rank_order), so they respect the
//! minimization convention and either [`FitnessMode`].
//!
//! # References
//!
//! - Blickle & Thiele (1996), "A Comparison of Selection Schemes used in
//!   Evolutionary Algorithms"
//! - Goldberg & Deb (1991), "A Comparative Analysis of Selection Schemes
//!   Used in Genetic Algorithms"

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rand::{Rng, RngCore};

use crate::engine::{Node, NodeOutput, Task};
use crate::error::{EvoError, Result};
use crate::fitness::FitnessMode;
use crate::population::{ranked_indices, Individual};

/// Node name used in schemes.
pub const NODE: &str = "selection";

/// Selection strategy for choosing parents.
///
/// # Examples
///
/// ```
/// use u_evograph::ga::Selection;
///
/// // Tournament with size 3 (moderate selection pressure)
/// let sel = Selection::Tournament(3);
///
/// // Parsed from configuration
/// let sel: Selection = "rank".parse().unwrap();
/// assert_eq!(sel, Selection::Rank);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Selection {
    /// Tournament selection: pick `k` individuals at random, select the best.
    ///
    /// Higher `k` = stronger selection pressure.
    /// - k=2: light pressure (good for diversity)
    /// - k=3-5: moderate pressure (typical default)
    /// - k>5: strong pressure (risk of premature convergence)
    ///
    /// # Complexity
    /// O(k) per selection
    Tournament(usize),

    /// Fitness-proportionate (roulette wheel) selection.
    ///
    /// In single-objective mode the weight is the inverted primary value
    /// (`max - value + ε`); in Pareto mode there is no scalar to invert and
    /// rank weights are used instead.
    ///
    /// # Complexity
    /// O(n) per selection (linear scan)
    Roulette,

    /// Rank-based selection: weight `n - rank`, best rank 0.
    ///
    /// Reference: Baker (1985), "Adaptive Selection Methods for Genetic
    /// Algorithms"
    Rank,
}

impl Default for Selection {
    fn default() -> Self {
        Selection::Tournament(3)
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::Tournament(k) => write!(f, "tournament:{k}"),
            Selection::Roulette => f.write_str("roulette"),
            Selection::Rank => f.write_str("rank"),
        }
    }
}

impl FromStr for Selection {
    type Err = EvoError;

    /// Parses `tournament`, `tournament:<k>`, `roulette` or `rank`.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tournament" => Ok(Selection::default()),
            "roulette" => Ok(Selection::Roulette),
            "rank" => Ok(Selection::Rank),
            other => other
                .strip_prefix("tournament:")
                .and_then(|k| k.parse::<usize>().ok())
                .filter(|&k| k > 0)
                .map(Selection::Tournament)
                .ok_or_else(|| EvoError::config(format!("unknown selection type: {other}"))),
        }
    }
}

impl Selection {
    /// Selects `count` parent indices (with replacement) from `population`.
    ///
    /// # Errors
    ///
    /// [`EvoError::EmptyPopulation`] when there is nothing to select from.
    pub fn select_many(
        &self,
        population: &[Individual],
        mode: FitnessMode,
        count: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<usize>> {
        if population.is_empty() {
            return Err(EvoError::EmptyPopulation);
        }
        let order = ranked_indices(population, mode);
        let mut position = vec![0usize; order.len()];
        for (rank, &index) in order.iter().enumerate() {
            position[index] = rank;
        }

        let picks = (0..count)
            .map(|_| match self {
                Selection::Tournament(k) => tournament(&position, *k, rng),
                Selection::Roulette => roulette(population, &order, mode, rng),
                Selection::Rank => rank(&order, rng),
            })
            .collect();
        Ok(picks)
    }
}

/// Tournament selection: pick k random individuals, return the best ranked.
fn tournament(position: &[usize], k: usize, rng: &mut dyn RngCore) -> usize {
    let k = k.max(1);
    let n = position.len();

    let mut best_idx = rng.random_range(0..n);
    for _ in 1..k {
        let idx = rng.random_range(0..n);
        if position[idx] < position[best_idx] {
            best_idx = idx;
        }
    }
    best_idx
}

/// Roulette wheel selection using inverse fitness transformation.
///
/// weight_i = max_fitness - fitness_i + epsilon, so the lowest value gets
/// the highest weight. Unevaluated individuals get epsilon.
fn roulette(
    population: &[Individual],
    order: &[usize],
    mode: FitnessMode,
    rng: &mut dyn RngCore,
) -> usize {
    let n = population.len();
    if n == 1 {
        return 0;
    }
    if mode == FitnessMode::Pareto {
        return rank(order, rng);
    }

    let epsilon = 1e-10;
    let primaries: Vec<Option<f64>> = population
        .iter()
        .map(|ind| ind.fitness().map(|f| f.primary()).filter(|v| v.is_finite()))
        .collect();
    let max_fitness = primaries
        .iter()
        .flatten()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);

    let weights: Vec<f64> = primaries
        .iter()
        .map(|p| match p {
            Some(f) => (max_fitness - f + epsilon).max(epsilon),
            None => epsilon,
        })
        .collect();

    let total: f64 = weights.iter().sum();
    if !(total > 0.0 && total.is_finite()) {
        return rng.random_range(0..n);
    }

    let threshold = rng.random_range(0.0..total);
    let mut cumulative = 0.0;
    for (i, &w) in weights.iter().enumerate() {
        cumulative += w;
        if cumulative > threshold {
            return i;
        }
    }

    n - 1 // floating-point fallback
}

/// Rank-based selection using linear ranking over a best-first order.
fn rank(order: &[usize], rng: &mut dyn RngCore) -> usize {
    let n = order.len();
    if n == 1 {
        return order[0];
    }

    // weight_i = n - rank_i
    let total: f64 = (n * (n + 1)) as f64 / 2.0;
    let threshold = rng.random_range(0.0..total);
    let mut cumulative = 0.0;

    for (rank, &original_idx) in order.iter().enumerate() {
        cumulative += (n - rank) as f64;
        if cumulative > threshold {
            return original_idx;
        }
    }

    order[n - 1] // fallback
}

/// Picks two parents from the task population.
pub fn node() -> Node {
    Node::new(NODE, |mut task: Task| {
        let params = Arc::clone(task.parameters());
        let selected = params.algorithm.selection.select_many(
            &task.population,
            params.fitness_mode(),
            2,
            &mut task.rng,
        );
        let task = match selected {
            Ok(picked) => {
                task.parents = picked.iter().map(|&i| task.population[i].clone()).collect();
                task.succeed()
            }
            Err(e) => task.fail(e.to_string()),
        };
        NodeOutput::from(task)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitness::Fitness;
    use crate::graph::{ConstraintRules, Graph, NodeContent};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn make_population(fitnesses: &[f64]) -> Vec<Individual> {
        let rules = Arc::new(ConstraintRules::dag());
        fitnesses
            .iter()
            .enumerate()
            .map(|(i, &f)| {
                let graph = Graph::chain([NodeContent::new(format!("n{i}"))], Arc::clone(&rules)).unwrap();
                Individual::new(graph).with_fitness(Fitness::single(f))
            })
            .collect()
    }

    fn counts(sel: Selection, pop: &[Individual], mode: FitnessMode) -> Vec<u32> {
        let mut rng = StdRng::seed_from_u64(42);
        let mut counts = vec![0u32; pop.len()];
        for idx in sel.select_many(pop, mode, 10_000, &mut rng).unwrap() {
            counts[idx] += 1;
        }
        counts
    }

    #[test]
    fn test_tournament_favors_best() {
        let pop = make_population(&[10.0, 5.0, 1.0, 8.0]);
        let counts = counts(Selection::Tournament(4), &pop, FitnessMode::Single);
        // Index 2 (fitness=1.0) should dominate
        assert!(
            counts[2] > 6000,
            "expected best to be selected >60% of the time, got {counts:?}"
        );
    }

    #[test]
    fn test_tournament_size_1_is_random() {
        let pop = make_population(&[10.0, 5.0, 1.0, 8.0]);
        let counts = counts(Selection::Tournament(1), &pop, FitnessMode::Single);
        for &c in &counts {
            assert!(c > 1500, "expected uniform, got counts: {counts:?}");
        }
    }

    #[test]
    fn test_roulette_favors_best() {
        let pop = make_population(&[100.0, 50.0, 1.0, 80.0]);
        let counts = counts(Selection::Roulette, &pop, FitnessMode::Single);
        assert!(
            counts[2] > counts[0],
            "best should be selected more often: {counts:?}"
        );
    }

    #[test]
    fn test_rank_favors_best() {
        let pop = make_population(&[100.0, 50.0, 1.0, 80.0]);
        let counts = counts(Selection::Rank, &pop, FitnessMode::Single);
        assert!(counts[2] > counts[0], "best should be selected more: {counts:?}");
    }

    #[test]
    fn test_unevaluated_rarely_wins_tournament() {
        let mut pop = make_population(&[3.0, 2.0]);
        let rules = Arc::new(ConstraintRules::dag());
        pop.push(Individual::new(
            Graph::chain([NodeContent::new("fresh")], rules).unwrap(),
        ));
        let counts = counts(Selection::Tournament(3), &pop, FitnessMode::Single);
        assert!(counts[2] < counts[1]);
    }

    #[test]
    fn test_single_individual() {
        let pop = make_population(&[5.0]);
        let mut rng = StdRng::seed_from_u64(42);
        for sel in [Selection::Tournament(3), Selection::Roulette, Selection::Rank] {
            assert_eq!(sel.select_many(&pop, FitnessMode::Single, 2, &mut rng).unwrap(), vec![0, 0]);
        }
    }

    #[test]
    fn test_deterministic_given_seed() {
        let pop = make_population(&[4.0, 3.0, 2.0, 1.0]);
        let a = counts(Selection::Tournament(2), &pop, FitnessMode::Single);
        let b = counts(Selection::Tournament(2), &pop, FitnessMode::Single);
        assert_eq!(a, b);
    }

    #[test]
    fn test_roulette_pareto_uses_ranks() {
        let rules = Arc::new(ConstraintRules::dag());
        let pop: Vec<Individual> = [[1.0, 1.0], [5.0, 5.0]]
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let g = Graph::chain([NodeContent::new(format!("p{i}"))], Arc::clone(&rules)).unwrap();
                Individual::new(g).with_fitness(Fitness::new(v.to_vec()))
            })
            .collect();
        let counts = counts(Selection::Roulette, &pop, FitnessMode::Pareto);
        assert!(counts[0] > counts[1]);
    }

    #[test]
    fn test_empty_population() {
        let mut rng = StdRng::seed_from_u64(42);
        let err = Selection::Rank
            .select_many(&[], FitnessMode::Single, 2, &mut rng)
            .unwrap_err();
        assert_eq!(err, EvoError::EmptyPopulation);
    }

    #[test]
    fn test_parse() {
        assert_eq!("tournament:5".parse::<Selection>(), Ok(Selection::Tournament(5)));
        assert_eq!("tournament".parse::<Selection>(), Ok(Selection::Tournament(3)));
        assert!("tournament:0".parse::<Selection>().is_err());
        assert!("wheel".parse::<Selection>().is_err());
        assert_eq!(Selection::Tournament(2).to_string(), "tournament:2");
    }
}
