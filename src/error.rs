//! Error types shared by the engine, the graph model and the genetic operators.
//!
//! Errors fall into two classes:
//!
//! - **Recoverable** ([`EvoError::ConstraintViolation`], [`EvoError::Evaluation`],
//!   [`EvoError::Worker`]): surface as a `Fail` status on the task that hit
//!   them and are routed by the stage's scheme.
//! - **Fatal** ([`EvoError::Configuration`], [`EvoError::Contract`]): abort
//!   pipeline construction (or the stage) and are returned to the caller.

use crate::graph::NodeId;
use thiserror::Error;

/// Result type alias using [`EvoError`].
pub type Result<T> = std::result::Result<T, EvoError>;

/// Unified error type for graph edits, pipeline construction and evaluation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvoError {
    /// Malformed scheme, unknown node name, unknown operator type or an
    /// invalid parameter value.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A structural edit was rejected by the constraint rule set.
    #[error("constraint violated: {rule}")]
    ConstraintViolation {
        /// Name of the first rule that failed.
        rule: String,
    },

    /// The objective function failed for an individual.
    #[error("evaluation failed: {0}")]
    Evaluation(String),

    /// A unit of work dispatched by a runner panicked or timed out.
    #[error("worker error: {0}")]
    Worker(String),

    /// A node broke the operation contract (no output, undecided status).
    #[error("node contract violated: {0}")]
    Contract(String),

    /// A graph operation referenced a node id the graph does not contain.
    #[error("unknown graph node: {0}")]
    UnknownNode(NodeId),

    /// An operation needed at least one individual.
    #[error("population is empty")]
    EmptyPopulation,
}

impl EvoError {
    /// Shorthand for [`EvoError::Configuration`].
    pub fn config(msg: impl Into<String>) -> Self {
        EvoError::Configuration(msg.into())
    }

    /// Returns `true` for errors that must abort pipeline construction or a stage.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EvoError::Configuration(_) | EvoError::Contract(_))
    }
}
