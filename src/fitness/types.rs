//! Fitness values and how they compare.
//!
//! # Direction convention
//!
//! Every stored objective value is in **minimization space: lower is
//! better**, for every objective. Metrics that should be maximized are
//! negated once, when the [`Objective`](crate::ga::Objective) builds the
//! fitness; comparisons never look at the raw metric's sign. Sorting
//! "descending by fitness" anywhere in this crate means *best first*, which
//! is ascending in stored values.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::EvoError;

/// How fitness values are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FitnessMode {
    /// Total order: primary value first, supplementary values break ties.
    #[default]
    Single,
    /// Pareto dominance over all values.
    Pareto,
}

impl FromStr for FitnessMode {
    type Err = EvoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(FitnessMode::Single),
            "pareto" | "multi_objective" => Ok(FitnessMode::Pareto),
            other => Err(EvoError::config(format!("unknown fitness mode: {other}"))),
        }
    }
}

/// An ordered tuple of objective values (lower is better).
///
/// # Examples
///
/// ```
/// use std::cmp::Ordering;
/// use u_evograph::fitness::Fitness;
///
/// let a = Fitness::new(vec![1.0, 5.0]);
/// let b = Fitness::new(vec![2.0, 5.0]);
/// assert!(a.dominates(&b));
/// assert_eq!(a.cmp_scalar(&b), Ordering::Less); // a is better
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Fitness {
    values: Vec<f64>,
}

impl Fitness {
    /// Creates a fitness from minimization-space values.
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// Creates a single-objective fitness.
    pub fn single(value: f64) -> Self {
        Self {
            values: vec![value],
        }
    }

    /// All objective values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// The first objective value, or `+∞` when there is none.
    pub fn primary(&self) -> f64 {
        self.values.first().map_or(f64::INFINITY, |&v| key(v))
    }

    /// `true` when there is at least one value and none is NaN.
    pub fn is_valid(&self) -> bool {
        !self.values.is_empty() && self.values.iter().all(|v| !v.is_nan())
    }

    /// Pareto dominance: no value worse and at least one strictly better.
    ///
    /// Fitnesses of different arity never dominate each other.
    pub fn dominates(&self, other: &Fitness) -> bool {
        if self.values.len() != other.values.len() {
            return false;
        }
        let mut strictly_better = false;
        for (&a, &b) in self.values.iter().zip(&other.values) {
            let (a, b) = (key(a), key(b));
            if a > b {
                return false;
            }
            if a < b {
                strictly_better = true;
            }
        }
        strictly_better
    }

    /// Total scalar order, `Less` meaning *better*.
    ///
    /// Values are compared lexicographically with NaN ranked worst.
    pub fn cmp_scalar(&self, other: &Fitness) -> Ordering {
        for (&a, &b) in self.values.iter().zip(&other.values) {
            match key(a).total_cmp(&key(b)) {
                Ordering::Equal => continue,
                decided => return decided,
            }
        }
        self.values.len().cmp(&other.values.len())
    }

    /// Compares under `mode`, `Less` meaning *better*.
    ///
    /// In [`FitnessMode::Pareto`] mutually non-dominated values are `Equal`;
    /// this is not a total order, so use [`rank_order`](super::rank_order)
    /// for sorting.
    pub fn compare(&self, other: &Fitness, mode: FitnessMode) -> Ordering {
        match mode {
            FitnessMode::Single => self.cmp_scalar(other),
            FitnessMode::Pareto => {
                if self.dominates(other) {
                    Ordering::Less
                } else if other.dominates(self) {
                    Ordering::Greater
                } else {
                    Ordering::Equal
                }
            }
        }
    }

    /// `true` if `self` is strictly better than `other` under `mode`.
    pub fn is_better(&self, other: &Fitness, mode: FitnessMode) -> bool {
        self.compare(other, mode) == Ordering::Less
    }
}

impl fmt::Display for Fitness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.values.iter().map(|v| format!("{v:.4}")).collect();
        write!(f, "({})", parts.join(", "))
    }
}

/// NaN is the worst possible value.
fn key(v: f64) -> f64 {
    if v.is_nan() {
        f64::INFINITY
    } else {
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lower_is_better() {
        let good = Fitness::single(1.0);
        let bad = Fitness::single(10.0);
        assert!(good.is_better(&bad, FitnessMode::Single));
        assert!(!bad.is_better(&good, FitnessMode::Single));
    }

    #[test]
    fn test_supplementary_values_break_ties() {
        let a = Fitness::new(vec![1.0, 3.0]);
        let b = Fitness::new(vec![1.0, 2.0]);
        assert_eq!(a.cmp_scalar(&b), Ordering::Greater);
    }

    #[test]
    fn test_nan_is_worst() {
        let nan = Fitness::single(f64::NAN);
        let finite = Fitness::single(1e300);
        assert_eq!(finite.cmp_scalar(&nan), Ordering::Less);
        assert!(!nan.is_valid());
        assert!(finite.dominates(&nan));
    }

    #[test]
    fn test_dominance() {
        let a = Fitness::new(vec![1.0, 5.0]);
        let b = Fitness::new(vec![3.0, 3.0]);
        let c = Fitness::new(vec![4.0, 4.0]);
        assert!(!a.dominates(&b));
        assert!(!b.dominates(&a));
        assert!(b.dominates(&c));
        assert_eq!(a.compare(&b, FitnessMode::Pareto), Ordering::Equal);
        assert_eq!(c.compare(&b, FitnessMode::Pareto), Ordering::Greater);
    }

    #[test]
    fn test_equal_values_do_not_dominate() {
        let a = Fitness::new(vec![2.0, 2.0]);
        assert!(!a.dominates(&a.clone()));
    }

    #[test]
    fn test_arity_mismatch() {
        let a = Fitness::new(vec![1.0]);
        let b = Fitness::new(vec![2.0, 2.0]);
        assert!(!a.dominates(&b));
    }

    #[test]
    fn test_primary_of_empty() {
        assert!(Fitness::new(vec![]).primary().is_infinite());
        assert!(!Fitness::new(vec![]).is_valid());
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("pareto".parse::<FitnessMode>(), Ok(FitnessMode::Pareto));
        assert!("lexicographic".parse::<FitnessMode>().is_err());
    }
}
