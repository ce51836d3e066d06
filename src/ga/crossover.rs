//! Structural crossover.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rand::seq::IndexedRandom;
use rand::{Rng, RngCore};
use tracing::trace;

use super::types::{CrossoverOperator, OperatorSet};
use crate::engine::{Node, NodeOutput, Task};
use crate::error::{EvoError, Result};
use crate::graph::{Graph, NodeId};
use crate::population::Individual;

/// Node name used in schemes.
pub const NODE: &str = "crossover";

/// Built-in crossovers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CrossoverType {
    /// Swaps the subtrees under two random non-root nodes.
    Subtree,
    /// Swaps subtrees under two nodes at the same distance from the root.
    OnePoint,
    /// Returns copies of the parents.
    None,
}

impl fmt::Display for CrossoverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CrossoverType::Subtree => "subtree",
            CrossoverType::OnePoint => "one_point",
            CrossoverType::None => "none",
        };
        f.write_str(s)
    }
}

impl FromStr for CrossoverType {
    type Err = EvoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "subtree" => Ok(CrossoverType::Subtree),
            "one_point" => Ok(CrossoverType::OnePoint),
            "none" => Ok(CrossoverType::None),
            other => Err(EvoError::config(format!("unknown crossover type: {other}"))),
        }
    }
}

impl CrossoverOperator for CrossoverType {
    fn name(&self) -> &str {
        match self {
            CrossoverType::Subtree => "subtree",
            CrossoverType::OnePoint => "one_point",
            CrossoverType::None => "none",
        }
    }

    fn crossover(&self, first: &Graph, second: &Graph, rng: &mut dyn RngCore) -> Result<Vec<Graph>> {
        match self {
            CrossoverType::None => Ok(vec![first.clone(), second.clone()]),
            CrossoverType::Subtree => {
                let a = *non_roots(first).choose(rng).ok_or_else(no_point)?;
                let b = *non_roots(second).choose(rng).ok_or_else(no_point)?;
                exchange(first, a, second, b)
            }
            CrossoverType::OnePoint => {
                let levels_a = levels(first)?;
                let levels_b = levels(second)?;
                let common: Vec<usize> = levels_a
                    .keys()
                    .copied()
                    .filter(|level| *level > 0 && levels_b.contains_key(level))
                    .collect();
                let level = *common.choose(rng).ok_or_else(no_point)?;
                let a = *levels_a[&level].choose(rng).ok_or_else(no_point)?;
                let b = *levels_b[&level].choose(rng).ok_or_else(no_point)?;
                exchange(first, a, second, b)
            }
        }
    }
}

fn no_point() -> EvoError {
    EvoError::ConstraintViolation {
        rule: "crossover_point".into(),
    }
}

fn non_roots(graph: &Graph) -> Vec<NodeId> {
    let roots = graph.root_nodes();
    graph
        .node_ids()
        .into_iter()
        .filter(|id| !roots.contains(id))
        .collect()
}

fn levels(graph: &Graph) -> Result<BTreeMap<usize, Vec<NodeId>>> {
    let mut levels: BTreeMap<usize, Vec<NodeId>> = BTreeMap::new();
    for id in graph.node_ids() {
        levels.entry(graph.node_depth(id)?).or_default().push(id);
    }
    Ok(levels)
}

/// Swaps the subtree at `a` in `first` with the one at `b` in `second`.
/// Keeps each child that passes its rule set; fails when neither does.
fn exchange(first: &Graph, a: NodeId, second: &Graph, b: NodeId) -> Result<Vec<Graph>> {
    let mut left = first.clone();
    let mut right = second.clone();
    let results = [
        left.update_subtree(a, second, b).map(|_| left),
        right.update_subtree(b, first, a).map(|_| right),
    ];
    let mut children = Vec::with_capacity(2);
    let mut last_error = None;
    for result in results {
        match result {
            Ok(child) => children.push(child),
            Err(e) => last_error = Some(e),
        }
    }
    match (children.is_empty(), last_error) {
        (true, Some(e)) => Err(e),
        _ => Ok(children),
    }
}

/// Recombines the two parents picked by selection.
///
/// With probability `crossover_prob` a random crossover operator is tried
/// up to `max_operator_attempts` times; otherwise the parents are copied.
/// Two children fork the task so each downstream task carries one
/// offspring.
pub fn node(ops: Arc<OperatorSet>) -> Node {
    Node::new(NODE, move |mut task: Task| {
        let params = Arc::clone(task.parameters());
        let algorithm = &params.algorithm;
        let (first, second) = match task.parents.as_slice() {
            [a, b, ..] => (a.clone(), b.clone()),
            _ => return NodeOutput::from(task.fail("crossover needs two parents")),
        };
        let generation = params.generation + 1;
        let parents = [&first, &second];

        let recombine = !ops.crossovers.is_empty() && task.rng.random_bool(algorithm.crossover_prob);
        let children: Vec<Individual> = if recombine {
            let mut produced = Vec::new();
            for attempt in 0..algorithm.max_operator_attempts {
                let Some(operator) = ops.crossovers.choose(&mut task.rng) else {
                    break;
                };
                match operator.crossover(first.graph(), second.graph(), &mut task.rng) {
                    Ok(graphs) if !graphs.is_empty() => {
                        produced = graphs
                            .into_iter()
                            .map(|g| Individual::offspring(g, &parents, operator.name(), generation))
                            .collect();
                        break;
                    }
                    Ok(_) => trace!(attempt, operator = operator.name(), "crossover produced nothing"),
                    Err(e) => trace!(attempt, operator = operator.name(), error = %e, "crossover rejected"),
                }
            }
            produced
        } else {
            parents
                .iter()
                .map(|p| Individual::offspring(p.graph().clone(), &[*p], "copy", generation))
                .collect()
        };

        let mut children = children.into_iter();
        let Some(head) = children.next() else {
            return NodeOutput::from(task.fail(format!(
                "no valid crossover within {} attempts",
                algorithm.max_operator_attempts
            )));
        };
        let mut forks: Vec<Task> = children
            .map(|child| {
                let mut fork = task.fork();
                fork.offspring = vec![child];
                fork.succeed()
            })
            .collect();
        task.offspring = vec![head];
        if forks.is_empty() {
            return NodeOutput::from(task.succeed());
        }
        forks.insert(0, task.succeed());
        NodeOutput::from(forks)
    })
}
