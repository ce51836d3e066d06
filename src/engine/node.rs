//! Named operations applied to tasks.

use std::fmt;
use std::sync::Arc;

use super::task::{Task, TaskStatus};
use crate::error::{EvoError, Result};

/// What an operation hands back: one task, or several after a fork.
#[derive(Debug)]
pub enum NodeOutput {
    /// The input task, transformed.
    One(Task),
    /// Several tasks (typically the input plus forks).
    Many(Vec<Task>),
}

impl From<Task> for NodeOutput {
    fn from(task: Task) -> Self {
        NodeOutput::One(task)
    }
}

impl From<Vec<Task>> for NodeOutput {
    fn from(tasks: Vec<Task>) -> Self {
        NodeOutput::Many(tasks)
    }
}

/// A pure transformation of a task.
///
/// Implementations must return at least one task and give every returned
/// task a `Success` or `Fail` status. Recoverable problems become `Fail`;
/// they are never raised as panics.
pub trait Operation: Send + Sync {
    /// Transforms `task`.
    fn run(&self, task: Task) -> NodeOutput;
}

impl<F> Operation for F
where
    F: Fn(Task) -> NodeOutput + Send + Sync,
{
    fn run(&self, task: Task) -> NodeOutput {
        self(task)
    }
}

/// A named [`Operation`].
#[derive(Clone)]
pub struct Node {
    name: String,
    operation: Arc<dyn Operation>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node").field("name", &self.name).finish()
    }
}

impl Node {
    /// Creates a node.
    pub fn new(name: impl Into<String>, operation: impl Operation + 'static) -> Self {
        Self {
            name: name.into(),
            operation: Arc::new(operation),
        }
    }

    /// Node name, as referenced by schemes.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the operation and stamps every output task with this node's name.
    ///
    /// # Errors
    ///
    /// [`EvoError::Contract`] when the operation returns no task or leaves a
    /// task `Pending`.
    pub fn invoke(&self, task: Task) -> Result<Vec<Task>> {
        let mut produced = match self.operation.run(task) {
            NodeOutput::One(task) => vec![task],
            NodeOutput::Many(tasks) => tasks,
        };
        if produced.is_empty() {
            return Err(EvoError::Contract(format!("node '{}' returned no task", self.name)));
        }
        for task in &mut produced {
            if task.status == TaskStatus::Pending {
                return Err(EvoError::Contract(format!(
                    "node '{}' left {} pending",
                    self.name,
                    task.id()
                )));
            }
            task.record_node(&self.name);
        }
        Ok(produced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Parameters;

    fn task() -> Task {
        Task::new(Arc::new(Parameters::default()), Arc::from(Vec::new()), 1)
    }

    #[test]
    fn test_invoke_records_node() {
        let node = Node::new("double", |t: Task| NodeOutput::from(t.succeed()));
        let out = node.invoke(task()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].last_node(), Some("double"));
        assert_eq!(out[0].status, TaskStatus::Success);
    }

    #[test]
    fn test_invoke_fork() {
        let node = Node::new("split", |mut t: Task| {
            let child = t.fork();
            NodeOutput::from(vec![t.succeed(), child.fail("second half")])
        });
        let out = node.invoke(task()).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|t| t.last_node() == Some("split")));
        assert_eq!(out[1].parent(), Some(out[0].id()));
    }

    #[test]
    fn test_empty_output_is_contract_error() {
        let node = Node::new("sink", |_t: Task| NodeOutput::Many(Vec::new()));
        let err = node.invoke(task()).unwrap_err();
        assert!(matches!(err, EvoError::Contract(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_pending_output_is_contract_error() {
        let node = Node::new("lazy", |t: Task| NodeOutput::from(t));
        assert!(matches!(node.invoke(task()), Err(EvoError::Contract(_))));
    }
}
