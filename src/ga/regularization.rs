//! Regularization: prune oversize individuals before selection.

use crate::engine::{Node, NodeOutput, Task};
use crate::population::Individual;

/// Node name used in schemes.
pub const NODE: &str = "regularization";

/// Pre-selection pruning pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegularizationType {
    /// Selection sees the whole population.
    #[default]
    None,
    /// Individuals deeper than `max_depth` or longer than `max_length` are
    /// hidden from selection.
    Prune {
        /// Depth bound, in nodes.
        max_depth: usize,
        /// Node-count bound.
        max_length: usize,
    },
}

/// Returns the pruned pool, or `None` when the population is kept as is
/// (nothing to prune, or everything would be pruned).
pub fn regularize(kind: RegularizationType, population: &[Individual]) -> Option<Vec<Individual>> {
    let RegularizationType::Prune {
        max_depth,
        max_length,
    } = kind
    else {
        return None;
    };
    let kept: Vec<Individual> = population
        .iter()
        .filter(|i| i.graph().depth() <= max_depth && i.graph().length() <= max_length)
        .cloned()
        .collect();
    (!kept.is_empty() && kept.len() < population.len()).then_some(kept)
}

/// Narrows the task's selection pool.
pub fn node() -> Node {
    Node::new(NODE, |mut task: Task| {
        let kind = task.parameters().algorithm.regularization;
        if let Some(kept) = regularize(kind, &task.population) {
            task.population = kept.into();
        }
        NodeOutput::from(task.succeed())
    })
}
