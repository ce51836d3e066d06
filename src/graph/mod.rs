//! DAG substrate individuals are built from.
//!
//! A [`Graph`] is an ordered set of typed nodes whose edges point from an
//! input node to the node consuming it. Structural invariants (no
//! self-cycle, no isolated node, no isolated component, ...) are expressed
//! as [`ConstraintRule`]s; every edit is verified against the graph's rule
//! set and rejected atomically on violation.
//!
//! # Key Types
//!
//! - [`Graph`]: the container and its edit operations
//! - [`GraphDraft`]: unchecked working copy for compound edits via [`Graph::edit`]
//! - [`ConstraintRules`]: ordered rule set; [`ConstraintRules::dag`] is the default
//! - [`GraphAdapter`]: bridge to domain objects; [`LabeledDagAdapter`] for plain labeled DAGs

mod adapter;
mod dag;
mod rules;
mod types;

pub use adapter::{GraphAdapter, LabeledDag, LabeledDagAdapter};
pub use dag::{Graph, GraphDraft};
pub use rules::{
    ConstraintRule, ConstraintRules, FnRule, MaxArity, MaxDepth, MaxSize, NoCycle,
    NoIsolatedComponents, NoIsolatedNodes, NoSelfCycle, SingleRoot,
};
pub use types::{GraphNode, NodeContent, NodeId, ReconnectPolicy};
