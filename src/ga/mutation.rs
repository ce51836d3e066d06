//! Structural mutations.
//!
//! Each [`MutationType`] edits a copy of the graph through the checked
//! graph API, so a result that breaks a constraint rule comes back as an
//! error instead of an invalid graph. The mutation node treats errors and
//! no-op edits (same descriptive id) as failed attempts and asks the
//! [`OperatorAgent`](super::OperatorAgent) for another operator.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rand::seq::IndexedRandom;
use rand::{Rng, RngCore};
use tracing::trace;

use super::config::GraphGenerationParams;
use super::types::{MutationOperator, OperatorSet};
use crate::engine::{Node, NodeOutput, Task};
use crate::error::{EvoError, Result};
use crate::graph::{Graph, NodeContent, NodeId, ReconnectPolicy};
use crate::population::Individual;

/// Node name used in schemes.
pub const NODE: &str = "mutation";

/// Built-in structural mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MutationType {
    /// Adds a node from the vocabulary: either a new input leaf of a random
    /// node, or spliced between a node and one of its inputs.
    SingleAdd,
    /// Removes a random node, reconnecting its inputs to its consumers.
    SingleDrop,
    /// Replaces the operation of a random node with another vocabulary entry.
    SingleChange,
    /// Adds an edge between two unconnected nodes.
    SingleEdge,
}

impl MutationType {
    /// Every built-in mutation.
    pub const ALL: [MutationType; 4] = [
        MutationType::SingleAdd,
        MutationType::SingleDrop,
        MutationType::SingleChange,
        MutationType::SingleEdge,
    ];

    /// Configuration name.
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationType::SingleAdd => "single_add",
            MutationType::SingleDrop => "single_drop",
            MutationType::SingleChange => "single_change",
            MutationType::SingleEdge => "single_edge",
        }
    }
}

impl fmt::Display for MutationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationType {
    type Err = EvoError;

    fn from_str(s: &str) -> Result<Self> {
        MutationType::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| EvoError::config(format!("unknown mutation type: {s}")))
    }
}

impl MutationOperator for MutationType {
    fn name(&self) -> &str {
        self.as_str()
    }

    fn mutate(
        &self,
        graph: &Graph,
        params: &GraphGenerationParams,
        rng: &mut dyn RngCore,
    ) -> Result<Graph> {
        let ids = graph.node_ids();
        let target = *ids
            .choose(rng)
            .ok_or_else(|| EvoError::config("cannot mutate an empty graph"))?;
        let mut mutant = graph.clone();
        match self {
            MutationType::SingleAdd => {
                let content = NodeContent::new(pick_type(params, None, rng)?);
                let inputs = graph.node(target).map(|n| n.inputs.clone()).unwrap_or_default();
                match inputs.choose(rng) {
                    Some(&input) if rng.random_bool(0.5) => {
                        mutant.edit(|d| {
                            let inserted = d.add_node(content, &[input])?;
                            d.disconnect(input, target, false)?;
                            d.connect(inserted, target)
                        })?;
                    }
                    _ => {
                        mutant.insert_input(target, content)?;
                    }
                }
            }
            MutationType::SingleDrop => {
                if graph.length() <= 1 {
                    return Err(EvoError::ConstraintViolation {
                        rule: "min_size".into(),
                    });
                }
                mutant.delete_node(target, ReconnectPolicy::All)?;
            }
            MutationType::SingleChange => {
                let current = graph.node(target).map(|n| n.name().to_string());
                let name = pick_type(params, current.as_deref(), rng)?;
                mutant.update_node(target, NodeContent::new(name))?;
            }
            MutationType::SingleEdge => {
                let others: Vec<NodeId> = ids.iter().copied().filter(|&id| id != target).collect();
                let consumer = *others.choose(rng).ok_or(EvoError::ConstraintViolation {
                    rule: "min_size".into(),
                })?;
                if graph.node(consumer).is_some_and(|n| n.inputs.contains(&target)) {
                    return Err(EvoError::ConstraintViolation {
                        rule: "duplicate_edge".into(),
                    });
                }
                mutant.connect_nodes(target, consumer)?;
            }
        }
        Ok(mutant)
    }
}

/// Picks a vocabulary entry, other than `exclude` when given.
fn pick_type(
    params: &GraphGenerationParams,
    exclude: Option<&str>,
    rng: &mut dyn RngCore,
) -> Result<String> {
    let candidates: Vec<&String> = params
        .available_node_types
        .iter()
        .filter(|t| Some(t.as_str()) != exclude)
        .collect();
    candidates
        .choose(rng)
        .map(|t| (*t).clone())
        .ok_or_else(|| EvoError::config("no node type available for mutation"))
}

/// Applies agent-chosen mutations until one yields a structurally new graph.
///
/// Returns the mutated graph and the index of the operator that produced
/// it, or `None` once `max_attempts` attempts have failed.
pub fn mutate_graph(
    ops: &OperatorSet,
    graph: &Graph,
    params: &GraphGenerationParams,
    max_attempts: usize,
    rng: &mut dyn RngCore,
) -> Option<(Graph, usize)> {
    if ops.mutations.is_empty() {
        return None;
    }
    let original = graph.descriptive_id();
    for attempt in 0..max_attempts {
        let op = ops.agent.choose(ops.mutations.len(), rng).min(ops.mutations.len() - 1);
        let operator = &ops.mutations[op];
        match operator.mutate(graph, params, rng) {
            Ok(mutant) if mutant.descriptive_id() != original => return Some((mutant, op)),
            Ok(_) => trace!(attempt, operator = operator.name(), "mutation left graph unchanged"),
            Err(e) => trace!(attempt, operator = operator.name(), error = %e, "mutation rejected"),
        }
    }
    None
}

/// Mutates each offspring with probability `mutation_prob`.
///
/// Fails the task when an offspring picked for mutation cannot be mutated
/// within `max_operator_attempts` attempts.
pub fn node(ops: Arc<OperatorSet>) -> Node {
    Node::new(NODE, move |mut task: Task| {
        let params = Arc::clone(task.parameters());
        let algorithm = &params.algorithm;
        let offspring = std::mem::take(&mut task.offspring);
        let mut mutated = Vec::with_capacity(offspring.len());
        for child in offspring {
            if !task.rng.random_bool(algorithm.mutation_prob) {
                mutated.push(child);
                continue;
            }
            let Some((graph, op)) = mutate_graph(
                &ops,
                child.graph(),
                &params.graph,
                algorithm.max_operator_attempts,
                &mut task.rng,
            ) else {
                return NodeOutput::from(task.fail(format!(
                    "no valid mutation within {} attempts",
                    algorithm.max_operator_attempts
                )));
            };
            let parents: Vec<&Individual> = task.parents.iter().collect();
            mutated.push(Individual::offspring(
                graph,
                &parents,
                ops.mutations[op].name(),
                params.generation + 1,
            ));
            task.mutations_applied.push(op);
        }
        task.offspring = mutated;
        NodeOutput::from(task.succeed())
    })
}
