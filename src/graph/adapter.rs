//! Bridges between domain objects and [`Graph`].

use std::collections::BTreeMap;
use std::sync::Arc;

use super::dag::Graph;
use super::rules::ConstraintRules;
use super::types::{GraphNode, NodeContent, NodeId};
use crate::error::{EvoError, Result};

/// Converts domain objects to graphs and back.
///
/// The round trip must be lossless for every individual that survives
/// selection: `restore(adapt(x))` describes the same object as `x`.
pub trait GraphAdapter: Send + Sync {
    /// The domain representation (molecule, pipeline, labeled graph, ...).
    type Domain;

    /// Builds a verified graph from a domain object.
    fn adapt(&self, item: &Self::Domain) -> Result<Graph>;

    /// Rebuilds the domain object from a graph.
    fn restore(&self, graph: &Graph) -> Result<Self::Domain>;

    /// Adapts a batch, failing on the first error.
    fn adapt_all(&self, items: &[Self::Domain]) -> Result<Vec<Graph>> {
        items.iter().map(|item| self.adapt(item)).collect()
    }

    /// Restores a batch, failing on the first error.
    fn restore_all(&self, graphs: &[Graph]) -> Result<Vec<Self::Domain>> {
        graphs.iter().map(|g| self.restore(g)).collect()
    }
}

/// A plain labeled DAG: node `i` has `labels[i]` and `params[i]`; an edge
/// `(from, to)` means node `to` consumes node `from`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LabeledDag {
    /// Node labels.
    pub labels: Vec<String>,
    /// Node parameters (same length as `labels`).
    pub params: Vec<BTreeMap<String, String>>,
    /// `(input, consumer)` index pairs, grouped by consumer in input order.
    pub edges: Vec<(usize, usize)>,
}

impl LabeledDag {
    /// Builds a parameterless DAG from labels and edges.
    pub fn new(labels: &[&str], edges: &[(usize, usize)]) -> Self {
        Self {
            labels: labels.iter().map(|l| l.to_string()).collect(),
            params: vec![BTreeMap::new(); labels.len()],
            edges: edges.to_vec(),
        }
    }
}

/// Adapter between [`LabeledDag`] and [`Graph`].
#[derive(Debug, Clone)]
pub struct LabeledDagAdapter {
    rules: Arc<ConstraintRules>,
}

impl LabeledDagAdapter {
    /// Creates an adapter producing graphs governed by `rules`.
    pub fn new(rules: Arc<ConstraintRules>) -> Self {
        Self { rules }
    }
}

impl GraphAdapter for LabeledDagAdapter {
    type Domain = LabeledDag;

    fn adapt(&self, item: &LabeledDag) -> Result<Graph> {
        if item.params.len() != item.labels.len() {
            return Err(EvoError::config("labels and params differ in length"));
        }
        let mut nodes: Vec<GraphNode> = item
            .labels
            .iter()
            .zip(&item.params)
            .enumerate()
            .map(|(i, (label, params))| {
                GraphNode::new(
                    NodeId(i as u64),
                    NodeContent {
                        name: label.clone(),
                        params: params.clone(),
                    },
                )
            })
            .collect();
        for &(from, to) in &item.edges {
            if from >= nodes.len() {
                return Err(EvoError::UnknownNode(NodeId(from as u64)));
            }
            let consumer = nodes
                .get_mut(to)
                .ok_or(EvoError::UnknownNode(NodeId(to as u64)))?;
            consumer.inputs.push(NodeId(from as u64));
        }
        Graph::from_nodes(nodes, Arc::clone(&self.rules))
    }

    fn restore(&self, graph: &Graph) -> Result<LabeledDag> {
        let index: BTreeMap<NodeId, usize> = graph
            .nodes()
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id, i))
            .collect();
        let mut dag = LabeledDag::default();
        for node in graph.nodes() {
            dag.labels.push(node.content.name.clone());
            dag.params.push(node.content.params.clone());
        }
        for (to, node) in graph.nodes().iter().enumerate() {
            for input in &node.inputs {
                let from = index.get(input).ok_or(EvoError::UnknownNode(*input))?;
                dag.edges.push((*from, to));
            }
        }
        Ok(dag)
    }
}
