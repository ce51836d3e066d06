//! Structural constraint rules checked after every graph edit.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use super::dag::Graph;
use crate::error::{EvoError, Result};

/// A predicate every valid graph must satisfy.
///
/// # Examples
///
/// ```
/// use u_evograph::graph::{ConstraintRule, Graph};
///
/// struct AtMostTen;
///
/// impl ConstraintRule for AtMostTen {
///     fn name(&self) -> &str { "at_most_ten" }
///     fn check(&self, graph: &Graph) -> bool { graph.length() <= 10 }
/// }
/// ```
pub trait ConstraintRule: Send + Sync {
    /// Rule name reported in [`EvoError::ConstraintViolation`].
    fn name(&self) -> &str;

    /// Returns `true` if the graph satisfies the rule.
    fn check(&self, graph: &Graph) -> bool;
}

/// No node consumes itself.
#[derive(Debug, Clone, Copy)]
pub struct NoSelfCycle;

impl ConstraintRule for NoSelfCycle {
    fn name(&self) -> &str {
        "no_self_cycle"
    }

    fn check(&self, graph: &Graph) -> bool {
        graph.nodes().iter().all(|n| !n.inputs.contains(&n.id))
    }
}

/// In a graph of two or more nodes, every node has at least one edge.
#[derive(Debug, Clone, Copy)]
pub struct NoIsolatedNodes;

impl ConstraintRule for NoIsolatedNodes {
    fn name(&self) -> &str {
        "no_isolated_nodes"
    }

    fn check(&self, graph: &Graph) -> bool {
        if graph.length() < 2 {
            return true;
        }
        let consumed: HashSet<_> = graph.nodes().iter().flat_map(|n| n.inputs.iter().copied()).collect();
        graph
            .nodes()
            .iter()
            .all(|n| !n.inputs.is_empty() || consumed.contains(&n.id))
    }
}

/// The graph is weakly connected.
#[derive(Debug, Clone, Copy)]
pub struct NoIsolatedComponents;

impl ConstraintRule for NoIsolatedComponents {
    fn name(&self) -> &str {
        "no_isolated_components"
    }

    fn check(&self, graph: &Graph) -> bool {
        let Some(start) = graph.nodes().first().map(|n| n.id) else {
            return true;
        };
        let mut adjacency: HashMap<_, Vec<_>> = HashMap::new();
        for (input, consumer) in graph.edges() {
            adjacency.entry(input).or_default().push(consumer);
            adjacency.entry(consumer).or_default().push(input);
        }
        let mut seen = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            for &next in adjacency.get(&current).into_iter().flatten() {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        seen.len() == graph.length()
    }
}

/// The graph has no directed cycle (Kahn's algorithm).
#[derive(Debug, Clone, Copy)]
pub struct NoCycle;

impl ConstraintRule for NoCycle {
    fn name(&self) -> &str {
        "no_cycle"
    }

    fn check(&self, graph: &Graph) -> bool {
        let mut pending: HashMap<_, usize> = graph
            .nodes()
            .iter()
            .map(|n| (n.id, n.inputs.iter().filter(|&&i| graph.contains(i)).count()))
            .collect();
        let mut ready: Vec<_> = pending.iter().filter(|&(_, &c)| c == 0).map(|(&id, _)| id).collect();
        let mut visited = 0usize;
        while let Some(id) = ready.pop() {
            visited += 1;
            for child in graph.node_children(id) {
                if let Some(count) = pending.get_mut(&child) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(child);
                    }
                }
            }
        }
        visited == graph.length()
    }
}

/// The graph has exactly one root.
#[derive(Debug, Clone, Copy)]
pub struct SingleRoot;

impl ConstraintRule for SingleRoot {
    fn name(&self) -> &str {
        "single_root"
    }

    fn check(&self, graph: &Graph) -> bool {
        graph.root_nodes().len() == 1
    }
}

/// Depth (longest input chain, in nodes) does not exceed the bound.
#[derive(Debug, Clone, Copy)]
pub struct MaxDepth(pub usize);

impl ConstraintRule for MaxDepth {
    fn name(&self) -> &str {
        "max_depth"
    }

    fn check(&self, graph: &Graph) -> bool {
        graph.depth() <= self.0
    }
}

/// No node consumes more than the bound.
#[derive(Debug, Clone, Copy)]
pub struct MaxArity(pub usize);

impl ConstraintRule for MaxArity {
    fn name(&self) -> &str {
        "max_arity"
    }

    fn check(&self, graph: &Graph) -> bool {
        graph.nodes().iter().all(|n| n.inputs.len() <= self.0)
    }
}

/// Node count does not exceed the bound.
#[derive(Debug, Clone, Copy)]
pub struct MaxSize(pub usize);

impl ConstraintRule for MaxSize {
    fn name(&self) -> &str {
        "max_size"
    }

    fn check(&self, graph: &Graph) -> bool {
        graph.length() <= self.0
    }
}

/// A rule backed by a closure.
pub struct FnRule {
    name: String,
    check: Box<dyn Fn(&Graph) -> bool + Send + Sync>,
}

impl FnRule {
    /// Wraps `check` under `name`.
    pub fn new(name: impl Into<String>, check: impl Fn(&Graph) -> bool + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            check: Box::new(check),
        }
    }
}

impl ConstraintRule for FnRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, graph: &Graph) -> bool {
        (self.check)(graph)
    }
}

/// An ordered rule set; all rules must hold.
#[derive(Clone, Default)]
pub struct ConstraintRules {
    rules: Vec<Arc<dyn ConstraintRule>>,
}

impl fmt::Debug for ConstraintRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl ConstraintRules {
    /// An empty rule set (every graph is valid).
    pub fn new() -> Self {
        Self::default()
    }

    /// Default DAG rules: single root, acyclic, connected, no self-cycle,
    /// no isolated node.
    pub fn dag() -> Self {
        Self::new()
            .with_rule(SingleRoot)
            .with_rule(NoCycle)
            .with_rule(NoIsolatedComponents)
            .with_rule(NoSelfCycle)
            .with_rule(NoIsolatedNodes)
    }

    /// Appends a rule.
    pub fn with_rule<R: ConstraintRule + 'static>(mut self, rule: R) -> Self {
        self.rules.push(Arc::new(rule));
        self
    }

    /// Appends an already shared rule.
    pub fn with_shared_rule(mut self, rule: Arc<dyn ConstraintRule>) -> Self {
        self.rules.push(rule);
        self
    }

    /// Rule names in evaluation order.
    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` when the set holds no rule.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Checks every rule in order; the first failure is reported.
    pub fn verify(&self, graph: &Graph) -> Result<()> {
        match self.rules.iter().find(|r| !r.check(graph)) {
            Some(rule) => Err(EvoError::ConstraintViolation {
                rule: rule.name().to_string(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphNode, NodeContent, NodeId};

    fn unchecked(nodes: Vec<GraphNode>) -> Graph {
        Graph::from_nodes(nodes, Arc::new(ConstraintRules::new())).unwrap()
    }

    fn leaf(id: u64, name: &str) -> GraphNode {
        GraphNode::new(NodeId(id), NodeContent::new(name))
    }

    #[test]
    fn test_self_cycle() {
        let g = unchecked(vec![leaf(0, "a").with_inputs([NodeId(0)])]);
        assert!(!NoSelfCycle.check(&g));
        assert!(!NoCycle.check(&g));
    }

    #[test]
    fn test_isolated_node() {
        let g = unchecked(vec![leaf(0, "a"), leaf(1, "b"), leaf(2, "c").with_inputs([NodeId(1)])]);
        assert!(!NoIsolatedNodes.check(&g));
        assert!(!NoIsolatedComponents.check(&g));
    }

    #[test]
    fn test_single_node_is_valid() {
        let g = unchecked(vec![leaf(0, "a")]);
        assert!(ConstraintRules::dag().verify(&g).is_ok());
    }

    #[test]
    fn test_isolated_component_without_isolated_node() {
        let g = unchecked(vec![
            leaf(0, "a"),
            leaf(1, "b").with_inputs([NodeId(0)]),
            leaf(2, "c"),
            leaf(3, "d").with_inputs([NodeId(2)]),
        ]);
        assert!(NoIsolatedNodes.check(&g));
        assert!(!NoIsolatedComponents.check(&g));
    }

    #[test]
    fn test_cycle_detection() {
        let g = unchecked(vec![
            leaf(0, "a").with_inputs([NodeId(2)]),
            leaf(1, "b").with_inputs([NodeId(0)]),
            leaf(2, "c").with_inputs([NodeId(1)]),
        ]);
        assert!(!NoCycle.check(&g));
        assert!(NoSelfCycle.check(&g));
    }

    #[test]
    fn test_bounds() {
        let g = unchecked(vec![
            leaf(0, "a"),
            leaf(1, "b"),
            leaf(2, "c").with_inputs([NodeId(0), NodeId(1)]),
        ]);
        assert!(MaxArity(2).check(&g));
        assert!(!MaxArity(1).check(&g));
        assert!(MaxDepth(2).check(&g));
        assert!(!MaxDepth(1).check(&g));
        assert!(!MaxSize(2).check(&g));
    }

    #[test]
    fn test_verify_reports_first_failing_rule() {
        let g = unchecked(vec![leaf(0, "a"), leaf(1, "b")]);
        let err = ConstraintRules::dag().verify(&g).unwrap_err();
        assert_eq!(
            err,
            EvoError::ConstraintViolation {
                rule: "single_root".into()
            }
        );
    }

    #[test]
    fn test_fn_rule() {
        let rules = ConstraintRules::new().with_rule(FnRule::new("no_x", |g: &Graph| {
            g.nodes().iter().all(|n| n.name() != "x")
        }));
        let g = unchecked(vec![leaf(0, "x")]);
        assert_eq!(rules.names(), vec!["no_x"]);
        assert!(rules.verify(&g).is_err());
    }
}
