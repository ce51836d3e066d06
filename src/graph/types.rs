//! Node-level types of the graph model.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::EvoError;

/// Identifier of a node, unique within one [`Graph`](super::Graph).
///
/// Ids are never reused by a graph: removing a node retires its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The payload of a node: an operation name plus ordered parameters.
///
/// Two nodes with equal content are interchangeable for
/// [`descriptive_id`](super::Graph::descriptive_id) purposes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeContent {
    /// Operation (or label) name, e.g. `"scaling"` or `"C"`.
    pub name: String,
    /// Named parameters, kept sorted for canonical descriptions.
    pub params: BTreeMap<String, String>,
}

impl NodeContent {
    /// Creates content with no parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    /// Adds a parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Canonical textual description: `name` or `name{k=v,...}`.
    pub fn description(&self) -> String {
        if self.params.is_empty() {
            return self.name.clone();
        }
        let params: Vec<String> = self.params.iter().map(|(k, v)| format!("{k}={v}")).collect();
        format!("{}{{{}}}", self.name, params.join(","))
    }
}

/// A node stored in a graph.
///
/// Edges are stored on the consumer side: `inputs` lists the nodes whose
/// output this node consumes. A node that no other node consumes is a root.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GraphNode {
    /// Graph-unique id.
    pub id: NodeId,
    /// Operation name and parameters.
    pub content: NodeContent,
    /// Ordered input node ids.
    pub inputs: Vec<NodeId>,
}

impl GraphNode {
    /// Creates a node with the given id and content and no inputs.
    pub fn new(id: NodeId, content: NodeContent) -> Self {
        Self {
            id,
            content,
            inputs: Vec::new(),
        }
    }

    /// Sets the input list.
    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = NodeId>) -> Self {
        self.inputs = inputs.into_iter().collect();
        self
    }

    /// Shorthand for `self.content.name`.
    pub fn name(&self) -> &str {
        &self.content.name
    }
}

/// How a deleted node's inputs are reattached to its consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReconnectPolicy {
    /// Drop all edges through the deleted node.
    None,
    /// If the deleted node had exactly one input, splice it into every consumer.
    #[default]
    Single,
    /// Connect every input of the deleted node to every consumer.
    All,
}

impl FromStr for ReconnectPolicy {
    type Err = EvoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ReconnectPolicy::None),
            "single" => Ok(ReconnectPolicy::Single),
            "all" => Ok(ReconnectPolicy::All),
            other => Err(EvoError::config(format!("unknown reconnect policy: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_without_params() {
        assert_eq!(NodeContent::new("scaling").description(), "scaling");
    }

    #[test]
    fn test_description_params_sorted() {
        let content = NodeContent::new("knn").with_param("k", "5").with_param("alpha", "1");
        assert_eq!(content.description(), "knn{alpha=1,k=5}");
    }

    #[test]
    fn test_reconnect_policy_parse() {
        assert_eq!("single".parse::<ReconnectPolicy>(), Ok(ReconnectPolicy::Single));
        assert_eq!("all".parse::<ReconnectPolicy>(), Ok(ReconnectPolicy::All));
        assert!("splice".parse::<ReconnectPolicy>().is_err());
    }
}
