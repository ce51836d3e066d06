//! Pareto ranking utilities.
//!
//! - [`non_dominated_sort`]: Fast non-dominated sorting (Deb et al., 2002)
//! - [`crowding_distance`]: Crowding distance for diversity preservation
//! - [`rank_order`]: Total best-first order under either [`FitnessMode`]
//!
//! # References
//!
//! - Deb et al. (2002), "A Fast and Elitist Multiobjective Genetic Algorithm: NSGA-II"
//! - IEEE Transactions on Evolutionary Computation, 6(2), 182-197

use std::cmp::Ordering;

use super::types::{Fitness, FitnessMode};

/// Result of non-dominated sorting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fronts {
    /// Pareto rank for each solution (0 = non-dominated front).
    pub ranks: Vec<usize>,

    /// Indices grouped by front: `fronts[0]` holds the rank-0 indices, etc.
    pub fronts: Vec<Vec<usize>>,
}

/// Fast non-dominated sorting.
///
/// Assigns every fitness its Pareto rank using [`Fitness::dominates`]
/// (lower values better). Identical fitnesses never dominate each other and
/// share a front.
///
/// # Complexity
///
/// O(m · n²) where m = number of objectives, n = number of solutions
///
/// # Example
///
/// ```
/// use u_evograph::fitness::{non_dominated_sort, Fitness};
///
/// let points = [
///     Fitness::new(vec![1.0, 5.0]),
///     Fitness::new(vec![3.0, 3.0]),
///     Fitness::new(vec![5.0, 1.0]),
///     Fitness::new(vec![4.0, 4.0]), // dominated by (3, 3)
/// ];
/// let refs: Vec<&Fitness> = points.iter().collect();
/// let sorted = non_dominated_sort(&refs);
/// assert_eq!(sorted.ranks, vec![0, 0, 0, 1]);
/// ```
pub fn non_dominated_sort(fitness: &[&Fitness]) -> Fronts {
    let n = fitness.len();
    if n == 0 {
        return Fronts::default();
    }

    let mut domination_count = vec![0usize; n];
    let mut dominates: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut ranks = vec![0usize; n];

    for i in 0..n {
        for j in (i + 1)..n {
            if fitness[i].dominates(fitness[j]) {
                dominates[i].push(j);
                domination_count[j] += 1;
            } else if fitness[j].dominates(fitness[i]) {
                dominates[j].push(i);
                domination_count[i] += 1;
            }
        }
    }

    let mut current: Vec<usize> = (0..n).filter(|&i| domination_count[i] == 0).collect();
    let mut fronts = Vec::new();
    while !current.is_empty() {
        let mut next = Vec::new();
        for &i in &current {
            for &j in &dominates[i] {
                domination_count[j] -= 1;
                if domination_count[j] == 0 {
                    ranks[j] = fronts.len() + 1;
                    next.push(j);
                }
            }
        }
        fronts.push(current);
        current = next;
    }

    Fronts { ranks, fronts }
}

/// Crowding distance of each solution within one front.
///
/// Boundary solutions of any objective get `f64::INFINITY`; interior
/// solutions accumulate the normalized gap between their neighbours.
/// Fronts of one or two solutions are all boundary.
pub fn crowding_distance(fitness: &[&Fitness]) -> Vec<f64> {
    let n = fitness.len();
    if n <= 2 {
        return vec![f64::INFINITY; n];
    }

    let m = fitness.iter().map(|f| f.values().len()).min().unwrap_or(0);
    let mut distances = vec![0.0f64; n];

    for obj in 0..m {
        let value = |i: usize| fitness[i].values()[obj];
        let mut indices: Vec<usize> = (0..n).collect();
        indices.sort_by(|&a, &b| value(a).total_cmp(&value(b)));

        distances[indices[0]] = f64::INFINITY;
        distances[indices[n - 1]] = f64::INFINITY;

        let range = value(indices[n - 1]) - value(indices[0]);
        if range > 0.0 && range.is_finite() {
            for w in indices.windows(3) {
                distances[w[1]] += (value(w[2]) - value(w[0])) / range;
            }
        }
    }

    distances
}

/// Indices of `fitness` ordered best first.
///
/// - [`FitnessMode::Single`]: by [`Fitness::cmp_scalar`], stable.
/// - [`FitnessMode::Pareto`]: by front, then by descending crowding distance
///   within a front.
///
/// Entries without a fitness (unevaluated or failed evaluation) come last
/// in their original order.
pub fn rank_order(fitness: &[Option<&Fitness>], mode: FitnessMode) -> Vec<usize> {
    let evaluated: Vec<usize> = (0..fitness.len()).filter(|&i| fitness[i].is_some()).collect();
    let unevaluated = (0..fitness.len()).filter(|&i| fitness[i].is_none());
    let values: Vec<&Fitness> = evaluated.iter().filter_map(|&i| fitness[i]).collect();

    let mut order: Vec<usize> = match mode {
        FitnessMode::Single => {
            let mut local: Vec<usize> = (0..values.len()).collect();
            local.sort_by(|&a, &b| values[a].cmp_scalar(values[b]));
            local
        }
        FitnessMode::Pareto => {
            let sorted = non_dominated_sort(&values);
            let mut local = Vec::with_capacity(values.len());
            for front in &sorted.fronts {
                let members: Vec<&Fitness> = front.iter().map(|&i| values[i]).collect();
                let distance = crowding_distance(&members);
                let mut positions: Vec<usize> = (0..front.len()).collect();
                positions.sort_by(|&a, &b| {
                    distance[b]
                        .partial_cmp(&distance[a])
                        .unwrap_or(Ordering::Equal)
                });
                local.extend(positions.into_iter().map(|p| front[p]));
            }
            local
        }
    }
    .into_iter()
    .map(|local| evaluated[local])
    .collect();

    order.extend(unevaluated);
    order
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn points(values: &[&[f64]]) -> Vec<Fitness> {
        values.iter().map(|v| Fitness::new(v.to_vec())).collect()
    }

    // ---- Non-dominated sort ----

    #[test]
    fn test_empty() {
        assert_eq!(non_dominated_sort(&[]), Fronts::default());
    }

    #[test]
    fn test_clear_dominance() {
        let pts = points(&[&[1.0, 1.0], &[2.0, 2.0], &[3.0, 3.0]]);
        let refs: Vec<&Fitness> = pts.iter().collect();
        let sorted = non_dominated_sort(&refs);
        assert_eq!(sorted.ranks, vec![0, 1, 2]);
        assert_eq!(sorted.fronts, vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn test_mixed_fronts() {
        let pts = points(&[
            &[1.0, 5.0],
            &[3.0, 3.0],
            &[5.0, 1.0],
            &[4.0, 4.0], // dominated by (3,3)
            &[6.0, 6.0], // dominated by (4,4)
        ]);
        let refs: Vec<&Fitness> = pts.iter().collect();
        let sorted = non_dominated_sort(&refs);
        assert_eq!(sorted.ranks, vec![0, 0, 0, 1, 2]);
    }

    #[test]
    fn test_identical_share_front() {
        let pts = points(&[&[2.0, 2.0], &[2.0, 2.0]]);
        let refs: Vec<&Fitness> = pts.iter().collect();
        assert_eq!(non_dominated_sort(&refs).fronts, vec![vec![0, 1]]);
    }

    // ---- Crowding distance ----

    #[test]
    fn test_crowding_evenly_spaced() {
        let pts = points(&[&[0.0, 4.0], &[1.0, 3.0], &[2.0, 2.0], &[3.0, 1.0], &[4.0, 0.0]]);
        let refs: Vec<&Fitness> = pts.iter().collect();
        let d = crowding_distance(&refs);
        assert!(d[0].is_infinite());
        assert!(d[4].is_infinite());
        assert!((d[1] - d[2]).abs() < 1e-10, "expected equal: {} vs {}", d[1], d[2]);
        assert!((d[2] - d[3]).abs() < 1e-10);
    }

    #[test]
    fn test_crowding_zero_range() {
        let pts = points(&[&[1.0, 5.0], &[2.0, 5.0], &[3.0, 5.0]]);
        let refs: Vec<&Fitness> = pts.iter().collect();
        let d = crowding_distance(&refs);
        assert!(d[1].is_finite());
    }

    // ---- Rank order ----

    #[test]
    fn test_rank_order_single() {
        let pts = points(&[&[3.0], &[1.0], &[2.0]]);
        let with_missing: Vec<Option<&Fitness>> =
            vec![Some(&pts[0]), None, Some(&pts[1]), Some(&pts[2])];
        assert_eq!(rank_order(&with_missing, FitnessMode::Single), vec![2, 3, 0, 1]);
    }

    #[test]
    fn test_rank_order_pareto_fronts_first() {
        let pts = points(&[&[4.0, 4.0], &[1.0, 5.0], &[3.0, 3.0], &[5.0, 1.0]]);
        let refs: Vec<Option<&Fitness>> = pts.iter().map(Some).collect();
        let order = rank_order(&refs, FitnessMode::Pareto);
        assert_eq!(order.len(), 4);
        assert_eq!(order[3], 0, "dominated point must rank last");
        // boundary points of the front come before the interior one
        assert_eq!(order[2], 2);
    }
}
