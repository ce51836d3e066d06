//! Core traits of the genetic operators.

use std::fmt;
use std::sync::Arc;

use rand::RngCore;

use super::config::GraphGenerationParams;
use super::objective::{EvaluationCache, Objective};
use crate::error::Result;
use crate::graph::Graph;

/// A structural edit producing a new graph from an existing one.
///
/// Implementations work on a copy: the input graph is never modified.
/// Returning an error (typically a rule violation) counts as a failed
/// attempt; the mutation node retries with another operator.
pub trait MutationOperator: Send + Sync {
    /// Operator name recorded in offspring lineage.
    fn name(&self) -> &str;

    /// Produces a mutated copy of `graph`.
    fn mutate(
        &self,
        graph: &Graph,
        params: &GraphGenerationParams,
        rng: &mut dyn RngCore,
    ) -> Result<Graph>;
}

/// Structural recombination of two parent graphs.
pub trait CrossoverOperator: Send + Sync {
    /// Operator name recorded in offspring lineage.
    fn name(&self) -> &str;

    /// Produces zero, one or two children.
    fn crossover(&self, first: &Graph, second: &Graph, rng: &mut dyn RngCore) -> Result<Vec<Graph>>;
}

/// Operator-selection policy for the mutation node.
///
/// `observe` is called after evaluation with a reward in `[0, 1]` for each
/// operator applied to an offspring; it may be called from several worker
/// threads at once.
pub trait OperatorAgent: Send + Sync {
    /// Picks an operator index in `0..n_operators` (`n_operators > 0`).
    fn choose(&self, n_operators: usize, rng: &mut dyn RngCore) -> usize;

    /// Feedback for an operator choice.
    fn observe(&self, _operator: usize, _reward: f64) {}
}

/// Collaborators injected into the operator nodes.
#[derive(Clone)]
pub struct OperatorSet {
    /// Fitness function.
    pub objective: Arc<Objective>,
    /// Shared fitness cache keyed by graph descriptive id.
    pub cache: Arc<EvaluationCache>,
    /// Mutation operators the agent picks from.
    pub mutations: Vec<Arc<dyn MutationOperator>>,
    /// Crossover operators picked uniformly.
    pub crossovers: Vec<Arc<dyn CrossoverOperator>>,
    /// Mutation operator policy.
    pub agent: Arc<dyn OperatorAgent>,
}

impl fmt::Debug for OperatorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mutations: Vec<&str> = self.mutations.iter().map(|m| m.name()).collect();
        let crossovers: Vec<&str> = self.crossovers.iter().map(|c| c.name()).collect();
        f.debug_struct("OperatorSet")
            .field("objective", &self.objective)
            .field("mutations", &mutations)
            .field("crossovers", &crossovers)
            .finish_non_exhaustive()
    }
}
