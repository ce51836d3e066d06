//! Inheritance: how much of the previous population survives.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::engine::{Node, NodeOutput, Task};
use crate::error::{EvoError, Result};
use crate::fitness::FitnessMode;
use crate::population::{sorted_best_first, unique_by_graph, Individual, Population};

/// Node name used in schemes.
pub const NODE: &str = "inheritance";

/// Replacement policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InheritanceType {
    /// Offspring replace the previous population; the best previous
    /// individuals only fill the gap when offspring are short.
    #[default]
    Generational,
    /// Previous population and offspring compete; the best `pop_size` survive.
    SteadyState,
}

impl fmt::Display for InheritanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InheritanceType::Generational => f.write_str("generational"),
            InheritanceType::SteadyState => f.write_str("steady_state"),
        }
    }
}

impl FromStr for InheritanceType {
    type Err = EvoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "generational" => Ok(InheritanceType::Generational),
            "steady_state" => Ok(InheritanceType::SteadyState),
            other => Err(EvoError::config(format!("unknown inheritance type: {other}"))),
        }
    }
}

/// Builds the next population from `previous` and `offspring`.
pub fn inherit(
    kind: InheritanceType,
    previous: &[Individual],
    offspring: Population,
    pop_size: usize,
    mode: FitnessMode,
) -> Population {
    match kind {
        InheritanceType::Generational => {
            let mut next = offspring;
            next.truncate(pop_size);
            if next.len() < pop_size {
                let mut present: HashSet<String> =
                    next.iter().map(|i| i.descriptive_id().to_string()).collect();
                let fill: Vec<Individual> = sorted_best_first(previous, mode)
                    .into_iter()
                    .filter(|i| present.insert(i.descriptive_id().to_string()))
                    .take(pop_size - next.len())
                    .collect();
                next.extend(fill);
            }
            next
        }
        InheritanceType::SteadyState => {
            let merged = unique_by_graph(previous.iter().cloned().chain(offspring));
            let mut next = sorted_best_first(&merged, mode);
            next.truncate(pop_size);
            next
        }
    }
}

/// Combines the task's `population` (previous) and `offspring` into its
/// `generation`.
pub fn node() -> Node {
    Node::new(NODE, |mut task: Task| {
        let params = Arc::clone(task.parameters());
        let offspring = std::mem::take(&mut task.offspring);
        task.generation = inherit(
            params.algorithm.inheritance,
            &task.population,
            offspring,
            params.algorithm.pop_size,
            params.fitness_mode(),
        );
        NodeOutput::from(task.succeed())
    })
}
