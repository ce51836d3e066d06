//! Optimizer configuration.
//!
//! - [`GraphRequirements`]: run limits, parallelism and structural bounds
//! - [`AlgorithmParams`]: genetic scheme (population, operators, policies)
//! - [`GraphGenerationParams`]: constraint rules and node vocabulary
//!
//! # Builder Pattern
//!
//! ```
//! use u_evograph::ga::{AlgorithmParams, ElitismType, GraphRequirements, Selection};
//!
//! let requirements = GraphRequirements::default()
//!     .with_num_of_generations(50)
//!     .with_n_jobs(-1)
//!     .with_seed(42);
//!
//! let algorithm = AlgorithmParams::default()
//!     .with_pop_size(30)
//!     .with_selection(Selection::Tournament(4))
//!     .with_elitism(ElitismType::ReplaceWorst)
//!     .with_mutation_prob(0.9);
//!
//! assert!(requirements.validate().is_ok());
//! assert!(algorithm.validate().is_ok());
//! ```

use std::sync::Arc;
use std::time::Duration;

use super::crossover::CrossoverType;
use super::elitism::ElitismType;
use super::inheritance::InheritanceType;
use super::mutation::MutationType;
use super::population_size::PopulationSizePolicy;
use super::regularization::RegularizationType;
use super::selection::Selection;
use crate::engine::DEFAULT_MAX_ROUNDS;
use crate::error::{EvoError, Result};
use crate::graph::{ConstraintRules, MaxArity, MaxDepth, MaxSize};

// ============================================================================
// GraphRequirements
// ============================================================================

/// Run limits, parallelism and structural bounds.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GraphRequirements {
    /// Maximum number of generations (`None`: unbounded, needs a timeout).
    pub num_of_generations: Option<usize>,

    /// Wall-clock budget for the whole run.
    pub timeout: Option<Duration>,

    /// Stop after this many generations without archive improvement.
    pub early_stopping_iterations: Option<usize>,

    /// Archive capacity (best individuals kept across generations).
    pub keep_n_best: usize,

    /// Worker count: `1` sequential, `-1` all cores, `n` fixed pool.
    pub n_jobs: i32,

    /// Per-task execution timeout.
    pub task_timeout: Option<Duration>,

    /// Routing round cap per stage run.
    pub max_stage_rounds: usize,

    /// Longest input chain allowed, in nodes.
    pub max_depth: Option<usize>,

    /// Maximum number of inputs per node.
    pub max_arity: Option<usize>,

    /// Maximum number of nodes per graph.
    pub max_graph_size: Option<usize>,

    /// Random seed; `None` draws one.
    pub seed: Option<u64>,
}

impl Default for GraphRequirements {
    fn default() -> Self {
        Self {
            num_of_generations: Some(100),
            timeout: None,
            early_stopping_iterations: None,
            keep_n_best: 1,
            n_jobs: 1,
            task_timeout: None,
            max_stage_rounds: DEFAULT_MAX_ROUNDS,
            max_depth: Some(10),
            max_arity: Some(10),
            max_graph_size: None,
            seed: None,
        }
    }
}

impl GraphRequirements {
    /// Sets the generation limit.
    pub fn with_num_of_generations(mut self, n: usize) -> Self {
        self.num_of_generations = Some(n);
        self
    }

    /// Removes the generation limit (a timeout is then required).
    pub fn without_generation_limit(mut self) -> Self {
        self.num_of_generations = None;
        self
    }

    /// Sets the wall-clock budget.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the early stopping patience (0 disables).
    pub fn with_early_stopping_iterations(mut self, n: usize) -> Self {
        self.early_stopping_iterations = (n > 0).then_some(n);
        self
    }

    /// Sets the archive capacity (minimum 1).
    pub fn with_keep_n_best(mut self, n: usize) -> Self {
        self.keep_n_best = n.max(1);
        self
    }

    /// Sets the worker count (`0` is treated as `1`).
    pub fn with_n_jobs(mut self, n_jobs: i32) -> Self {
        self.n_jobs = if n_jobs == 0 { 1 } else { n_jobs };
        self
    }

    /// Sets the per-task timeout.
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    /// Sets the round cap per stage run (minimum 1).
    pub fn with_max_stage_rounds(mut self, n: usize) -> Self {
        self.max_stage_rounds = n.max(1);
        self
    }

    /// Sets the depth bound.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Sets the arity bound.
    pub fn with_max_arity(mut self, arity: usize) -> Self {
        self.max_arity = Some(arity);
        self
    }

    /// Sets the node-count bound.
    pub fn with_max_graph_size(mut self, size: usize) -> Self {
        self.max_graph_size = Some(size);
        self
    }

    /// Sets the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// `base` extended with the structural bounds of these requirements.
    pub fn rules(&self, base: &ConstraintRules) -> ConstraintRules {
        let mut rules = base.clone();
        if let Some(depth) = self.max_depth {
            rules = rules.with_rule(MaxDepth(depth));
        }
        if let Some(arity) = self.max_arity {
            rules = rules.with_rule(MaxArity(arity));
        }
        if let Some(size) = self.max_graph_size {
            rules = rules.with_rule(MaxSize(size));
        }
        rules
    }

    /// Validates the requirements.
    pub fn validate(&self) -> Result<()> {
        if self.num_of_generations.is_none() && self.timeout.is_none() {
            return Err(EvoError::config(
                "either num_of_generations or timeout must be set",
            ));
        }
        if self.num_of_generations == Some(0) {
            return Err(EvoError::config("num_of_generations must be at least 1"));
        }
        if self.timeout == Some(Duration::ZERO) {
            return Err(EvoError::config("timeout must be positive or None"));
        }
        if self.task_timeout == Some(Duration::ZERO) {
            return Err(EvoError::config("task_timeout must be positive or None"));
        }
        if self.n_jobs == 0 || self.n_jobs < -1 {
            return Err(EvoError::config("n_jobs must be -1 or a positive count"));
        }
        if self.max_depth == Some(0) || self.max_arity == Some(0) || self.max_graph_size == Some(0)
        {
            return Err(EvoError::config("structural bounds must be positive"));
        }
        Ok(())
    }
}

// ============================================================================
// GraphGenerationParams
// ============================================================================

/// Constraint rules and the node vocabulary used by structural mutations.
#[derive(Debug, Clone)]
pub struct GraphGenerationParams {
    /// Base rule set every graph must satisfy.
    pub rules: Arc<ConstraintRules>,

    /// Operation names mutations may introduce.
    pub available_node_types: Vec<String>,
}

impl Default for GraphGenerationParams {
    fn default() -> Self {
        Self {
            rules: Arc::new(ConstraintRules::dag()),
            available_node_types: Vec::new(),
        }
    }
}

impl GraphGenerationParams {
    /// Creates generation parameters.
    pub fn new<S: Into<String>>(
        rules: ConstraintRules,
        node_types: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            rules: Arc::new(rules),
            available_node_types: node_types.into_iter().map(Into::into).collect(),
        }
    }

    /// Replaces the node vocabulary.
    pub fn with_node_types<S: Into<String>>(mut self, node_types: impl IntoIterator<Item = S>) -> Self {
        self.available_node_types = node_types.into_iter().map(Into::into).collect();
        self
    }

    /// Validates the vocabulary against the mutations that need it.
    pub fn validate(&self, mutations: &[MutationType]) -> Result<()> {
        let needs_vocabulary = mutations
            .iter()
            .any(|m| matches!(m, MutationType::SingleAdd | MutationType::SingleChange));
        if needs_vocabulary && self.available_node_types.is_empty() {
            return Err(EvoError::config(
                "available_node_types is empty but single_add/single_change mutations are enabled",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// AlgorithmParams
// ============================================================================

/// Genetic scheme configuration.
///
/// # Defaults
///
/// ```
/// use u_evograph::ga::AlgorithmParams;
///
/// let params = AlgorithmParams::default();
/// assert_eq!(params.pop_size, 20);
/// assert!(!params.multi_objective);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AlgorithmParams {
    /// Population size (updated by the adaptive stage under
    /// [`PopulationSizePolicy::Adaptive`]).
    pub pop_size: usize,

    /// Upper bound for the adaptive population size.
    pub max_pop_size: usize,

    /// Elitism only applies when `pop_size` is at least this.
    pub min_pop_size_with_elitism: usize,

    /// Pareto comparison instead of scalar.
    pub multi_objective: bool,

    /// Elitism policy.
    pub elitism: ElitismType,

    /// Replacement policy.
    pub inheritance: InheritanceType,

    /// Parent selection strategy.
    pub selection: Selection,

    /// Probability of recombining a parent pair (0.0–1.0).
    pub crossover_prob: f64,

    /// Probability of mutating an offspring (0.0–1.0).
    pub mutation_prob: f64,

    /// Built-in crossover operators.
    pub crossover_types: Vec<CrossoverType>,

    /// Built-in mutation operators.
    pub mutation_types: Vec<MutationType>,

    /// Attempts per crossover or mutation before the task fails.
    pub max_operator_attempts: usize,

    /// Retries per evolution task before it is dropped.
    pub max_retries: usize,

    /// Pre-selection pruning.
    pub regularization: RegularizationType,

    /// Population size policy.
    pub pop_size_policy: PopulationSizePolicy,
}

impl Default for AlgorithmParams {
    fn default() -> Self {
        Self {
            pop_size: 20,
            max_pop_size: 55,
            min_pop_size_with_elitism: 5,
            multi_objective: false,
            elitism: ElitismType::default(),
            inheritance: InheritanceType::default(),
            selection: Selection::default(),
            crossover_prob: 0.8,
            mutation_prob: 0.8,
            crossover_types: vec![CrossoverType::Subtree, CrossoverType::OnePoint],
            mutation_types: MutationType::ALL.to_vec(),
            max_operator_attempts: 20,
            max_retries: 3,
            regularization: RegularizationType::None,
            pop_size_policy: PopulationSizePolicy::Fixed,
        }
    }
}

impl AlgorithmParams {
    /// Sets the population size (minimum 1).
    pub fn with_pop_size(mut self, n: usize) -> Self {
        self.pop_size = n.max(1);
        self
    }

    /// Sets the adaptive population size bound.
    pub fn with_max_pop_size(mut self, n: usize) -> Self {
        self.max_pop_size = n;
        self
    }

    /// Sets the elitism population threshold.
    pub fn with_min_pop_size_with_elitism(mut self, n: usize) -> Self {
        self.min_pop_size_with_elitism = n;
        self
    }

    /// Switches Pareto comparison on or off.
    pub fn with_multi_objective(mut self, multi_objective: bool) -> Self {
        self.multi_objective = multi_objective;
        self
    }

    /// Sets the elitism policy.
    pub fn with_elitism(mut self, elitism: ElitismType) -> Self {
        self.elitism = elitism;
        self
    }

    /// Sets the replacement policy.
    pub fn with_inheritance(mut self, inheritance: InheritanceType) -> Self {
        self.inheritance = inheritance;
        self
    }

    /// Sets the selection strategy.
    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    /// Sets the crossover probability.
    pub fn with_crossover_prob(mut self, p: f64) -> Self {
        self.crossover_prob = p.clamp(0.0, 1.0);
        self
    }

    /// Sets the mutation probability.
    pub fn with_mutation_prob(mut self, p: f64) -> Self {
        self.mutation_prob = p.clamp(0.0, 1.0);
        self
    }

    /// Sets the built-in crossover operators.
    pub fn with_crossover_types(mut self, types: impl IntoIterator<Item = CrossoverType>) -> Self {
        self.crossover_types = types.into_iter().collect();
        self
    }

    /// Sets the built-in mutation operators.
    pub fn with_mutation_types(mut self, types: impl IntoIterator<Item = MutationType>) -> Self {
        self.mutation_types = types.into_iter().collect();
        self
    }

    /// Sets the attempts per operator application (minimum 1).
    pub fn with_max_operator_attempts(mut self, n: usize) -> Self {
        self.max_operator_attempts = n.max(1);
        self
    }

    /// Sets the retry budget per evolution task.
    pub fn with_max_retries(mut self, n: usize) -> Self {
        self.max_retries = n;
        self
    }

    /// Sets the regularization pass.
    pub fn with_regularization(mut self, regularization: RegularizationType) -> Self {
        self.regularization = regularization;
        self
    }

    /// Sets the population size policy.
    pub fn with_pop_size_policy(mut self, policy: PopulationSizePolicy) -> Self {
        self.pop_size_policy = policy;
        self
    }

    /// Preset: full generational replacement with elitism.
    pub fn generational() -> Self {
        Self {
            inheritance: InheritanceType::Generational,
            elitism: ElitismType::KeepNBest,
            ..Self::default()
        }
    }

    /// Preset: steady-state retention, elitism off (survivors already keep
    /// the best).
    pub fn steady_state() -> Self {
        Self {
            inheritance: InheritanceType::SteadyState,
            elitism: ElitismType::None,
            ..Self::default()
        }
    }

    /// Preset: steady-state with an adaptive population size.
    pub fn parameter_free() -> Self {
        Self {
            pop_size_policy: PopulationSizePolicy::Adaptive { growth: 1.5 },
            ..Self::steady_state()
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.pop_size < 2 {
            return Err(EvoError::config("pop_size must be at least 2"));
        }
        if self.max_pop_size < self.pop_size {
            return Err(EvoError::config("max_pop_size must not be below pop_size"));
        }
        if !(0.0..=1.0).contains(&self.crossover_prob) || !(0.0..=1.0).contains(&self.mutation_prob)
        {
            return Err(EvoError::config("operator probabilities must lie in [0, 1]"));
        }
        if self.max_operator_attempts == 0 {
            return Err(EvoError::config("max_operator_attempts must be at least 1"));
        }
        if let PopulationSizePolicy::Adaptive { growth } = self.pop_size_policy {
            if !(growth.is_finite() && growth > 1.0) {
                return Err(EvoError::config("adaptive growth factor must be greater than 1"));
            }
        }
        if let RegularizationType::Prune {
            max_depth,
            max_length,
        } = self.regularization
        {
            if max_depth == 0 || max_length == 0 {
                return Err(EvoError::config("prune bounds must be positive"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Graph, NodeContent};

    // ---- GraphRequirements ----

    #[test]
    fn test_requirements_default() {
        let req = GraphRequirements::default();
        assert_eq!(req.num_of_generations, Some(100));
        assert_eq!(req.n_jobs, 1);
        assert_eq!(req.keep_n_best, 1);
        assert_eq!(req.max_stage_rounds, DEFAULT_MAX_ROUNDS);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_requirements_need_a_limit() {
        let req = GraphRequirements::default().without_generation_limit();
        assert!(req.validate().is_err());
        let req = req.with_timeout(Duration::from_secs(1));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_requirements_clamps() {
        let req = GraphRequirements::default()
            .with_keep_n_best(0)
            .with_n_jobs(0)
            .with_max_stage_rounds(0)
            .with_early_stopping_iterations(0);
        assert_eq!(req.keep_n_best, 1);
        assert_eq!(req.n_jobs, 1);
        assert_eq!(req.max_stage_rounds, 1);
        assert!(req.early_stopping_iterations.is_none());
    }

    #[test]
    fn test_requirements_bad_jobs() {
        let mut req = GraphRequirements::default();
        req.n_jobs = -3;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_requirements_rules() {
        let req = GraphRequirements::default()
            .with_max_depth(2)
            .with_max_graph_size(3);
        let rules = req.rules(&ConstraintRules::dag());
        assert!(rules.names().contains(&"max_depth"));
        assert!(rules.names().contains(&"max_size"));

        let deep = Graph::chain(
            ["a", "b", "c"].into_iter().map(NodeContent::new),
            Arc::new(ConstraintRules::dag()),
        )
        .unwrap();
        assert!(rules.verify(&deep).is_err());
    }

    // ---- GraphGenerationParams ----

    #[test]
    fn test_generation_params_vocabulary() {
        let params = GraphGenerationParams::default();
        assert!(params.validate(&[MutationType::SingleDrop]).is_ok());
        assert!(params.validate(&[MutationType::SingleAdd]).is_err());
        let params = params.with_node_types(["x", "y"]);
        assert!(params.validate(&MutationType::ALL).is_ok());
    }

    // ---- AlgorithmParams ----

    #[test]
    fn test_algorithm_default() {
        let params = AlgorithmParams::default();
        assert_eq!(params.pop_size, 20);
        assert_eq!(params.elitism, ElitismType::KeepNBest);
        assert_eq!(params.inheritance, InheritanceType::Generational);
        assert_eq!(params.mutation_types.len(), 4);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_algorithm_clamp_rates() {
        let params = AlgorithmParams::default()
            .with_crossover_prob(1.5)
            .with_mutation_prob(-0.5);
        assert!((params.crossover_prob - 1.0).abs() < 1e-10);
        assert!((params.mutation_prob - 0.0).abs() < 1e-10);
    }

    #[test]
    fn test_algorithm_validate_pop_size() {
        assert!(AlgorithmParams::default().with_pop_size(1).validate().is_err());
        assert!(AlgorithmParams::default()
            .with_pop_size(60)
            .validate()
            .is_err());
    }

    #[test]
    fn test_algorithm_validate_growth() {
        let params = AlgorithmParams::default()
            .with_pop_size_policy(PopulationSizePolicy::Adaptive { growth: 1.0 });
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_presets() {
        assert_eq!(
            AlgorithmParams::steady_state().inheritance,
            InheritanceType::SteadyState
        );
        let free = AlgorithmParams::parameter_free();
        assert!(matches!(
            free.pop_size_policy,
            PopulationSizePolicy::Adaptive { .. }
        ));
        assert!(free.validate().is_ok());
        assert!(AlgorithmParams::generational().validate().is_ok());
    }
}
