//! Objective functions and the fitness cache.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use crate::error::{EvoError, Result};
use crate::fitness::{Fitness, FitnessMode};
use crate::graph::Graph;
use crate::population::Individual;

/// Optimization direction of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    /// Lower raw values are better.
    #[default]
    Minimize,
    /// Higher raw values are better; stored negated.
    Maximize,
}

impl FromStr for Direction {
    type Err = EvoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "minimize" | "min" => Ok(Direction::Minimize),
            "maximize" | "max" => Ok(Direction::Maximize),
            other => Err(EvoError::config(format!("unknown direction: {other}"))),
        }
    }
}

/// Signature of a metric function.
pub type MetricFn = dyn Fn(&Graph) -> Result<f64> + Send + Sync;

/// A named metric with its direction.
#[derive(Clone)]
pub struct Metric {
    name: String,
    direction: Direction,
    f: Arc<MetricFn>,
}

impl fmt::Debug for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metric")
            .field("name", &self.name)
            .field("direction", &self.direction)
            .finish()
    }
}

impl Metric {
    /// Metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Optimization direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }
}

/// The fitness function: an ordered list of metrics.
///
/// The first metric is the primary objective; in single-objective mode the
/// others only break ties. Each value is converted to minimization space
/// (maximized metrics are negated) before it is stored.
///
/// # Examples
///
/// ```
/// use u_evograph::ga::{Direction, Objective};
///
/// let objective = Objective::new(false)
///     .with_metric("size", Direction::Minimize, |g| Ok(g.length() as f64))
///     .with_metric("depth", Direction::Maximize, |g| Ok(g.depth() as f64));
/// assert_eq!(objective.metric_names(), vec!["size", "depth"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Objective {
    metrics: Vec<Metric>,
    multi_objective: bool,
}

impl Objective {
    /// Creates an objective without metrics.
    pub fn new(multi_objective: bool) -> Self {
        Self {
            metrics: Vec::new(),
            multi_objective,
        }
    }

    /// Single-metric objective.
    pub fn single(
        name: impl Into<String>,
        direction: Direction,
        f: impl Fn(&Graph) -> Result<f64> + Send + Sync + 'static,
    ) -> Self {
        Self::new(false).with_metric(name, direction, f)
    }

    /// Appends a metric.
    pub fn with_metric(
        mut self,
        name: impl Into<String>,
        direction: Direction,
        f: impl Fn(&Graph) -> Result<f64> + Send + Sync + 'static,
    ) -> Self {
        self.metrics.push(Metric {
            name: name.into(),
            direction,
            f: Arc::new(f),
        });
        self
    }

    /// Metrics in order.
    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    /// Metric names in order.
    pub fn metric_names(&self) -> Vec<&str> {
        self.metrics.iter().map(Metric::name).collect()
    }

    /// `true` when fitness is compared by Pareto dominance.
    pub fn is_multi_objective(&self) -> bool {
        self.multi_objective
    }

    /// Comparison mode of the fitness this objective produces.
    pub fn mode(&self) -> FitnessMode {
        if self.multi_objective {
            FitnessMode::Pareto
        } else {
            FitnessMode::Single
        }
    }

    /// Computes the fitness of `graph`.
    ///
    /// # Errors
    ///
    /// - [`EvoError::Configuration`] when there is no metric
    /// - [`EvoError::Evaluation`] when a metric fails or returns NaN
    pub fn evaluate(&self, graph: &Graph) -> Result<Fitness> {
        if self.metrics.is_empty() {
            return Err(EvoError::config("objective has no metrics"));
        }
        let mut values = Vec::with_capacity(self.metrics.len());
        for metric in &self.metrics {
            let raw = (metric.f)(graph).map_err(|e| match e {
                EvoError::Evaluation(_) => e,
                other => EvoError::Evaluation(format!("{}: {other}", metric.name)),
            })?;
            if raw.is_nan() {
                return Err(EvoError::Evaluation(format!("{} returned NaN", metric.name)));
            }
            values.push(match metric.direction {
                Direction::Minimize => raw,
                Direction::Maximize => -raw,
            });
        }
        Ok(Fitness::new(values))
    }
}

/// Fitness cache keyed by graph descriptive id.
///
/// Successes and failures are both cached, so the objective runs at most
/// once per distinct graph, even when several workers ask for the same
/// graph at the same time: the first caller computes, the others wait on
/// the same cell.
#[derive(Debug, Default)]
pub struct EvaluationCache {
    cells: DashMap<String, Arc<OnceLock<Result<Fitness>>>>,
    evaluations: AtomicUsize,
    hits: AtomicUsize,
}

impl EvaluationCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached fitness of `individual`'s graph, computing it on
    /// first request.
    pub fn evaluate(&self, objective: &Objective, individual: &Individual) -> Result<Fitness> {
        let cell = Arc::clone(
            self.cells
                .entry(individual.descriptive_id().to_string())
                .or_default()
                .value(),
        );
        let mut computed = false;
        let result = cell.get_or_init(|| {
            computed = true;
            self.evaluations.fetch_add(1, Ordering::Relaxed);
            objective.evaluate(individual.graph())
        });
        if !computed {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        result.clone()
    }

    /// Number of objective invocations.
    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::Relaxed)
    }

    /// Number of requests answered from the cache.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of distinct graphs seen.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// `true` when nothing has been requested yet.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ConstraintRules, NodeContent};
    use rayon::prelude::*;

    fn individual(names: &[&str]) -> Individual {
        let graph = Graph::chain(
            names.iter().map(|n| NodeContent::new(*n)),
            Arc::new(ConstraintRules::dag()),
        )
        .unwrap();
        Individual::new(graph)
    }

    #[test]
    fn test_maximize_is_negated() {
        let objective = Objective::new(true)
            .with_metric("size", Direction::Minimize, |g| Ok(g.length() as f64))
            .with_metric("depth", Direction::Maximize, |g| Ok(g.depth() as f64));
        let fitness = objective.evaluate(individual(&["a", "b"]).graph()).unwrap();
        assert_eq!(fitness.values(), &[2.0, -2.0]);
        assert_eq!(objective.mode(), FitnessMode::Pareto);
    }

    #[test]
    fn test_maximized_larger_is_better() {
        let objective = Objective::single("depth", Direction::Maximize, |g| Ok(g.depth() as f64));
        let deep = objective.evaluate(individual(&["a", "b", "c"]).graph()).unwrap();
        let shallow = objective.evaluate(individual(&["a"]).graph()).unwrap();
        assert!(deep.is_better(&shallow, FitnessMode::Single));
    }

    #[test]
    fn test_nan_is_evaluation_error() {
        let objective = Objective::single("bad", Direction::Minimize, |_| Ok(f64::NAN));
        let err = objective.evaluate(individual(&["a"]).graph()).unwrap_err();
        assert!(matches!(err, EvoError::Evaluation(_)));
    }

    #[test]
    fn test_no_metrics() {
        let err = Objective::new(false).evaluate(individual(&["a"]).graph()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_cache_evaluates_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let objective = Objective::single("size", Direction::Minimize, move |g| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(g.length() as f64)
        });
        let cache = EvaluationCache::new();
        let a = individual(&["a", "b"]);
        let twin = individual(&["a", "b"]);
        assert_eq!(cache.evaluate(&objective, &a).unwrap(), Fitness::single(2.0));
        assert_eq!(cache.evaluate(&objective, &twin).unwrap(), Fitness::single(2.0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.evaluations(), 1);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_keeps_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let objective = Objective::single("fails", Direction::Minimize, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(EvoError::Evaluation("no data".into()))
        });
        let cache = EvaluationCache::new();
        let a = individual(&["a"]);
        assert!(cache.evaluate(&objective, &a).is_err());
        assert!(cache.evaluate(&objective, &a).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cache_concurrent_requests() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let objective = Objective::single("slow", Direction::Minimize, move |g| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(5));
            Ok(g.length() as f64)
        });
        let cache = EvaluationCache::new();
        let twins: Vec<Individual> = (0..16).map(|_| individual(&["x", "y", "z"])).collect();
        twins.par_iter().for_each(|ind| {
            assert!(cache.evaluate(&objective, ind).is_ok());
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
