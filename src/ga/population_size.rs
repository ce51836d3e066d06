//! Population size adaptation between generations.

use crate::engine::{Node, NodeOutput, Task};

/// Node name used in schemes.
pub const NODE: &str = "pop_size";

/// Smallest population the adaptive policy produces (two parents).
pub const MIN_POP_SIZE: usize = 2;

/// How `pop_size` evolves between generations.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PopulationSizePolicy {
    /// `pop_size` never changes.
    #[default]
    Fixed,
    /// Grows by `growth` after a generation without improvement and shrinks
    /// by the same factor after an improving one, within
    /// `[MIN_POP_SIZE, max_pop_size]`.
    Adaptive {
        /// Multiplicative factor, greater than 1.
        growth: f64,
    },
}

/// Next population size under `policy`.
pub fn next_pop_size(policy: PopulationSizePolicy, current: usize, max: usize, improved: bool) -> usize {
    match policy {
        PopulationSizePolicy::Fixed => current,
        PopulationSizePolicy::Adaptive { growth } => {
            let current = current as f64;
            let next = if improved {
                (current / growth).round()
            } else {
                (current * growth).ceil()
            };
            (next as usize).clamp(MIN_POP_SIZE, max.max(MIN_POP_SIZE))
        }
    }
}

/// Proposes the next population size from the last generation's outcome.
pub fn node() -> Node {
    Node::new(NODE, |mut task: Task| {
        let params = task.parameters();
        let next = next_pop_size(
            params.algorithm.pop_size_policy,
            params.algorithm.pop_size,
            params.algorithm.max_pop_size,
            params.improved,
        );
        task.pop_size = Some(next);
        NodeOutput::from(task.succeed())
    })
}
