//! The DAG container and its structural edit operations.
//!
//! Every mutating method is transactional: the edit is applied to a copy,
//! the copy is checked against the graph's [`ConstraintRules`], and only a
//! copy that satisfies every rule replaces the original. A rejected edit
//! leaves the graph untouched and returns [`EvoError::ConstraintViolation`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use super::rules::ConstraintRules;
use super::types::{GraphNode, NodeContent, NodeId, ReconnectPolicy};
use crate::error::{EvoError, Result};

/// A directed acyclic graph of typed nodes.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use u_evograph::graph::{ConstraintRules, Graph, NodeContent};
///
/// let rules = Arc::new(ConstraintRules::dag());
/// let mut graph = Graph::chain([NodeContent::new("scaling"), NodeContent::new("ridge")], rules)
///     .unwrap();
/// let root = graph.root_node().unwrap();
///
/// // A second model feeding the root keeps the graph connected.
/// graph.insert_input(root, NodeContent::new("pca")).unwrap();
/// assert_eq!(graph.length(), 3);
/// assert_eq!(graph.depth(), 2);
/// ```
#[derive(Clone)]
pub struct Graph {
    nodes: Vec<GraphNode>,
    next_id: u64,
    rules: Arc<ConstraintRules>,
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes)
            .field("rules", &self.rules.names())
            .finish()
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptive_id())
    }
}

impl Graph {
    /// Creates an empty graph governed by `rules`.
    ///
    /// The empty graph itself is not verified; the first edit is.
    pub fn new(rules: Arc<ConstraintRules>) -> Self {
        Self {
            nodes: Vec::new(),
            next_id: 0,
            rules,
        }
    }

    /// Builds a graph from explicit nodes and verifies it.
    ///
    /// Fails when ids repeat, when an input references a missing node, or
    /// when a rule is violated.
    pub fn from_nodes(nodes: Vec<GraphNode>, rules: Arc<ConstraintRules>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(nodes.len());
        for node in &nodes {
            if !seen.insert(node.id) {
                return Err(EvoError::config(format!("duplicate node id {}", node.id)));
            }
        }
        for node in &nodes {
            if let Some(missing) = node.inputs.iter().find(|i| !seen.contains(i)) {
                return Err(EvoError::UnknownNode(*missing));
            }
        }
        let next_id = nodes.iter().map(|n| n.id.0 + 1).max().unwrap_or(0);
        let graph = Self {
            nodes,
            next_id,
            rules,
        };
        graph.rules.verify(&graph)?;
        Ok(graph)
    }

    /// Builds a linear pipeline: each node consumes the previous one, the
    /// last node is the root.
    pub fn chain(
        contents: impl IntoIterator<Item = NodeContent>,
        rules: Arc<ConstraintRules>,
    ) -> Result<Self> {
        let nodes = contents
            .into_iter()
            .enumerate()
            .map(|(i, content)| {
                let node = GraphNode::new(NodeId(i as u64), content);
                if i == 0 {
                    node
                } else {
                    node.with_inputs([NodeId(i as u64 - 1)])
                }
            })
            .collect();
        Self::from_nodes(nodes, rules)
    }

    /// Returns the rule set every edit is checked against.
    pub fn rules(&self) -> &Arc<ConstraintRules> {
        &self.rules
    }

    /// Replaces the rule set, re-verifying the current structure.
    pub fn with_rules(mut self, rules: Arc<ConstraintRules>) -> Result<Self> {
        rules.verify(&self)?;
        self.rules = rules;
        Ok(self)
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    /// Looks up a node by id.
    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Returns `true` if the graph holds `id`.
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Number of nodes.
    pub fn length(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` when the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids in insertion order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.id).collect()
    }

    /// All edges as `(input, consumer)` pairs.
    pub fn edges(&self) -> Vec<(NodeId, NodeId)> {
        self.nodes
            .iter()
            .flat_map(|n| n.inputs.iter().map(move |&input| (input, n.id)))
            .collect()
    }

    /// Nodes that consume the output of `id`.
    pub fn node_children(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.inputs.contains(&id))
            .map(|n| n.id)
            .collect()
    }

    /// Nodes no other node consumes.
    pub fn root_nodes(&self) -> Vec<NodeId> {
        let consumed: HashSet<NodeId> = self.nodes.iter().flat_map(|n| n.inputs.iter().copied()).collect();
        self.nodes
            .iter()
            .map(|n| n.id)
            .filter(|id| !consumed.contains(id))
            .collect()
    }

    /// The single root, if the graph has exactly one.
    pub fn root_node(&self) -> Option<NodeId> {
        match self.root_nodes().as_slice() {
            [root] => Some(*root),
            _ => None,
        }
    }

    /// `id` followed by every node it transitively consumes (pre-order, no repeats).
    pub fn subtree(&self, id: NodeId) -> Result<Vec<NodeId>> {
        if !self.contains(id) {
            return Err(EvoError::UnknownNode(id));
        }
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            order.push(current);
            if let Some(node) = self.node(current) {
                stack.extend(node.inputs.iter().rev().copied());
            }
        }
        Ok(order)
    }

    /// Length of the longest input chain, counted in nodes (0 for an empty graph).
    pub fn depth(&self) -> usize {
        let mut memo = HashMap::with_capacity(self.nodes.len());
        let mut on_stack = HashSet::new();
        self.nodes
            .iter()
            .map(|n| self.height(n.id, &mut memo, &mut on_stack))
            .max()
            .unwrap_or(0)
    }

    fn height(
        &self,
        id: NodeId,
        memo: &mut HashMap<NodeId, usize>,
        on_stack: &mut HashSet<NodeId>,
    ) -> usize {
        if let Some(&h) = memo.get(&id) {
            return h;
        }
        // back edge: only reachable on graphs whose rules allow cycles
        if !on_stack.insert(id) {
            return 0;
        }
        let inputs = self.node(id).map(|n| n.inputs.clone()).unwrap_or_default();
        let h = 1 + inputs
            .into_iter()
            .map(|i| self.height(i, memo, on_stack))
            .max()
            .unwrap_or(0);
        on_stack.remove(&id);
        memo.insert(id, h);
        h
    }

    /// Distance (in edges) from the nearest root down to `id`.
    pub fn node_depth(&self, id: NodeId) -> Result<usize> {
        if !self.contains(id) {
            return Err(EvoError::UnknownNode(id));
        }
        let mut levels: HashMap<NodeId, usize> = HashMap::new();
        let mut queue: VecDeque<NodeId> = self.root_nodes().into_iter().collect();
        for &root in &queue {
            levels.insert(root, 0);
        }
        while let Some(current) = queue.pop_front() {
            let level = levels[&current];
            if let Some(node) = self.node(current) {
                for &input in &node.inputs {
                    if !levels.contains_key(&input) {
                        levels.insert(input, level + 1);
                        queue.push_back(input);
                    }
                }
            }
        }
        Ok(levels.get(&id).copied().unwrap_or(0))
    }

    /// Canonical structural identifier, independent of node ids and insertion
    /// order. Used for deduplication and fitness caching.
    ///
    /// A leaf renders as `/name`, an inner node as `(in1;in2)/name` with its
    /// inputs sorted; multiple roots are sorted and joined with `|`.
    pub fn descriptive_id(&self) -> String {
        let mut memo = HashMap::with_capacity(self.nodes.len());
        let mut on_stack = HashSet::new();
        let mut roots: Vec<String> = self
            .root_nodes()
            .into_iter()
            .map(|id| self.node_descriptive_id(id, &mut memo, &mut on_stack))
            .collect();
        roots.sort();
        roots.join("|")
    }

    fn node_descriptive_id(
        &self,
        id: NodeId,
        memo: &mut HashMap<NodeId, String>,
        on_stack: &mut HashSet<NodeId>,
    ) -> String {
        if let Some(cached) = memo.get(&id) {
            return cached.clone();
        }
        let Some(node) = self.node(id) else {
            return String::new();
        };
        if !on_stack.insert(id) {
            return "...".to_string();
        }
        let label = node.content.description();
        let rendered = if node.inputs.is_empty() {
            format!("/{label}")
        } else {
            let mut inputs: Vec<String> = node
                .inputs
                .iter()
                .map(|&i| self.node_descriptive_id(i, memo, on_stack))
                .collect();
            inputs.sort();
            format!("({})/{label}", inputs.join(";"))
        };
        on_stack.remove(&id);
        memo.insert(id, rendered.clone());
        rendered
    }

    fn index_of(&self, id: NodeId) -> Result<usize> {
        self.nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or(EvoError::UnknownNode(id))
    }

    // ---- Transactional edits ----

    /// Applies a compound edit atomically.
    ///
    /// The closure edits a [`GraphDraft`] without intermediate checks; the
    /// rule set is verified once on the result.
    pub fn edit<R>(&mut self, f: impl FnOnce(&mut GraphDraft) -> Result<R>) -> Result<R> {
        let mut draft = GraphDraft {
            graph: self.clone(),
        };
        let out = f(&mut draft)?;
        self.rules.verify(&draft.graph)?;
        *self = draft.graph;
        Ok(out)
    }

    /// Adds a node consuming `inputs`.
    pub fn add_node(&mut self, content: NodeContent, inputs: &[NodeId]) -> Result<NodeId> {
        self.edit(|d| d.add_node(content, inputs))
    }

    /// Adds a new leaf feeding `consumer`.
    pub fn insert_input(&mut self, consumer: NodeId, content: NodeContent) -> Result<NodeId> {
        self.edit(|d| {
            let id = d.add_node(content, &[])?;
            d.connect(id, consumer)?;
            Ok(id)
        })
    }

    /// Deletes a node, reattaching its inputs per `reconnect`.
    pub fn delete_node(&mut self, id: NodeId, reconnect: ReconnectPolicy) -> Result<()> {
        self.edit(|d| d.remove_node(id, reconnect))
    }

    /// Deletes a node together with every input it exclusively owns.
    pub fn delete_subtree(&mut self, id: NodeId) -> Result<()> {
        self.edit(|d| d.remove_subtree(id))
    }

    /// Replaces a node's content, keeping its connections.
    pub fn update_node(&mut self, id: NodeId, content: NodeContent) -> Result<()> {
        self.edit(|d| d.set_content(id, content))
    }

    /// Replaces the subtree rooted at `old` with a copy of `donor`'s subtree
    /// rooted at `donor_root`. Returns the id of the copied root.
    pub fn update_subtree(&mut self, old: NodeId, donor: &Graph, donor_root: NodeId) -> Result<NodeId> {
        self.edit(|d| d.replace_subtree(old, donor, donor_root))
    }

    /// Makes `child` consume `parent`.
    pub fn connect_nodes(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.edit(|d| d.connect(parent, child))
    }

    /// Removes the `parent → child` edge. Returns `false` if no such edge existed.
    ///
    /// With `clean_up_leftovers`, a parent left without consumers is removed
    /// along with its exclusive inputs.
    pub fn disconnect_nodes(
        &mut self,
        parent: NodeId,
        child: NodeId,
        clean_up_leftovers: bool,
    ) -> Result<bool> {
        self.edit(|d| d.disconnect(parent, child, clean_up_leftovers))
    }
}

/// A working copy of a [`Graph`] handed to [`Graph::edit`].
///
/// Draft operations are not checked against the rule set; only the final
/// state of the draft is.
pub struct GraphDraft {
    graph: Graph,
}

impl Deref for GraphDraft {
    type Target = Graph;

    fn deref(&self) -> &Graph {
        &self.graph
    }
}

impl GraphDraft {
    fn fresh_id(&mut self) -> NodeId {
        let id = NodeId(self.graph.next_id);
        self.graph.next_id += 1;
        id
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut GraphNode> {
        self.graph
            .nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or(EvoError::UnknownNode(id))
    }

    /// Adds a node consuming `inputs`; all inputs must exist.
    pub fn add_node(&mut self, content: NodeContent, inputs: &[NodeId]) -> Result<NodeId> {
        if let Some(missing) = inputs.iter().find(|&&i| !self.graph.contains(i)) {
            return Err(EvoError::UnknownNode(*missing));
        }
        let id = self.fresh_id();
        self.graph
            .nodes
            .push(GraphNode::new(id, content).with_inputs(inputs.iter().copied()));
        Ok(id)
    }

    /// Removes a node, reattaching its inputs to its consumers per `reconnect`.
    pub fn remove_node(&mut self, id: NodeId, reconnect: ReconnectPolicy) -> Result<()> {
        let idx = self.graph.index_of(id)?;
        let removed = self.graph.nodes.remove(idx);
        let spliced: &[NodeId] = match reconnect {
            ReconnectPolicy::None => &[],
            ReconnectPolicy::Single if removed.inputs.len() == 1 => &removed.inputs,
            ReconnectPolicy::Single => &[],
            ReconnectPolicy::All => &removed.inputs,
        };
        for node in &mut self.graph.nodes {
            let Some(pos) = node.inputs.iter().position(|&i| i == id) else {
                continue;
            };
            node.inputs.remove(pos);
            let mut at = pos;
            for &input in spliced {
                if !node.inputs.contains(&input) {
                    node.inputs.insert(at, input);
                    at += 1;
                }
            }
        }
        Ok(())
    }

    /// Removes `id` and every node of its subtree not consumed elsewhere.
    pub fn remove_subtree(&mut self, id: NodeId) -> Result<()> {
        let members: HashSet<NodeId> = self.graph.subtree(id)?.into_iter().collect();
        self.detach(id);
        self.graph.nodes.retain(|n| n.id != id);
        self.prune_orphans(&members);
        Ok(())
    }

    /// Replaces the content of a node.
    pub fn set_content(&mut self, id: NodeId, content: NodeContent) -> Result<()> {
        self.node_mut(id)?.content = content;
        Ok(())
    }

    /// Swaps the subtree at `old` for a copy of `donor`'s subtree at `donor_root`.
    pub fn replace_subtree(&mut self, old: NodeId, donor: &Graph, donor_root: NodeId) -> Result<NodeId> {
        let old_members: HashSet<NodeId> = self.graph.subtree(old)?.into_iter().collect();
        let donor_ids = donor.subtree(donor_root)?;

        let mut mapping = HashMap::with_capacity(donor_ids.len());
        for &d in &donor_ids {
            let fresh = self.fresh_id();
            mapping.insert(d, fresh);
        }
        let mut copies = Vec::with_capacity(donor_ids.len());
        for &d in &donor_ids {
            let node = donor.node(d).ok_or(EvoError::UnknownNode(d))?;
            let inputs = node
                .inputs
                .iter()
                .map(|i| mapping.get(i).copied().ok_or(EvoError::UnknownNode(*i)))
                .collect::<Result<Vec<_>>>()?;
            copies.push(GraphNode {
                id: mapping[&d],
                content: node.content.clone(),
                inputs,
            });
        }
        let new_root = mapping[&donor_root];

        for node in &mut self.graph.nodes {
            for input in node.inputs.iter_mut().filter(|i| **i == old) {
                *input = new_root;
            }
        }
        self.graph.nodes.extend(copies);
        self.graph.nodes.retain(|n| n.id != old);
        self.prune_orphans(&old_members);
        Ok(new_root)
    }

    /// Makes `child` consume `parent` (no-op if the edge exists).
    pub fn connect(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if !self.graph.contains(parent) {
            return Err(EvoError::UnknownNode(parent));
        }
        let node = self.node_mut(child)?;
        if !node.inputs.contains(&parent) {
            node.inputs.push(parent);
        }
        Ok(())
    }

    /// Removes the `parent → child` edge.
    pub fn disconnect(&mut self, parent: NodeId, child: NodeId, clean_up_leftovers: bool) -> Result<bool> {
        if !self.graph.contains(parent) {
            return Err(EvoError::UnknownNode(parent));
        }
        let node = self.node_mut(child)?;
        let before = node.inputs.len();
        node.inputs.retain(|&i| i != parent);
        let removed = node.inputs.len() != before;
        if removed && clean_up_leftovers && self.graph.node_children(parent).is_empty() {
            self.remove_subtree(parent)?;
        }
        Ok(removed)
    }

    fn detach(&mut self, id: NodeId) {
        for node in &mut self.graph.nodes {
            node.inputs.retain(|&i| i != id);
        }
    }

    /// Repeatedly removes candidates that no remaining node consumes.
    fn prune_orphans(&mut self, candidates: &HashSet<NodeId>) {
        loop {
            let consumed: HashSet<NodeId> = self
                .graph
                .nodes
                .iter()
                .flat_map(|n| n.inputs.iter().copied())
                .collect();
            let before = self.graph.nodes.len();
            self.graph
                .nodes
                .retain(|n| !candidates.contains(&n.id) || consumed.contains(&n.id));
            if self.graph.nodes.len() == before {
                break;
            }
        }
    }
}
