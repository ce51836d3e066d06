//! The unit of in-flight work threaded through a stage.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::parameters::Parameters;
use crate::population::Individual;

static NEXT_TASK: AtomicU64 = AtomicU64::new(0);

/// Outcome of the last node executed on a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskStatus {
    /// Freshly built, no node has run yet.
    Pending,
    /// The last node succeeded.
    Success,
    /// The last node failed (constraint violation, evaluation error, worker error).
    Fail,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Success => "success",
            TaskStatus::Fail => "fail",
        };
        f.write_str(s)
    }
}

/// Process-unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl TaskId {
    fn next() -> Self {
        TaskId(NEXT_TASK.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// One record holding every field any operator may touch.
///
/// Routing state (`status`, last node, trail) is maintained by
/// [`Node::invoke`](super::Node::invoke); the payload fields are public and
/// owned by the operators. Parameters are shared read-only: a task never
/// writes them, only a stage's parameter updater does.
#[derive(Debug, Clone)]
pub struct Task {
    id: TaskId,
    parent: Option<TaskId>,
    last_node: Option<String>,
    trail: Vec<String>,
    parameters: Arc<Parameters>,

    /// Status set by the last node.
    pub status: TaskStatus,
    /// Population slice this task works on (selection pool).
    pub population: Arc<[Individual]>,
    /// Parents picked by selection.
    pub parents: Vec<Individual>,
    /// Offspring produced by crossover / mutation, not yet evaluated.
    pub offspring: Vec<Individual>,
    /// Finished individuals this task contributes to the next population.
    pub generation: Vec<Individual>,
    /// Population size proposed by an adaptive-parameters node.
    pub pop_size: Option<usize>,
    /// Indices of the mutation operators applied to `offspring`.
    pub mutations_applied: Vec<usize>,
    /// `(operator, reward)` pairs earned by evaluated offspring, reported to
    /// the operator agent once the stage is over.
    pub rewards: Vec<(usize, f64)>,
    /// Number of retries consumed.
    pub retries: usize,
    /// Reason of the last failure.
    pub failure: Option<String>,
    /// Task-local random source.
    pub rng: StdRng,
}

impl Task {
    /// Creates a pending task over `population`.
    pub fn new(parameters: Arc<Parameters>, population: Arc<[Individual]>, seed: u64) -> Self {
        Self {
            id: TaskId::next(),
            parent: None,
            last_node: None,
            trail: Vec::new(),
            parameters,
            status: TaskStatus::Pending,
            population,
            parents: Vec::new(),
            offspring: Vec::new(),
            generation: Vec::new(),
            pop_size: None,
            mutations_applied: Vec::new(),
            rewards: Vec::new(),
            retries: 0,
            failure: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Creates a child task: fresh id, `parent` set to this task, routing
    /// state and payload copied, random source derived from this task's.
    pub fn fork(&mut self) -> Task {
        let seed = self.rng.random();
        let mut child = self.clone();
        child.id = TaskId::next();
        child.parent = Some(self.id);
        child.rng = StdRng::seed_from_u64(seed);
        child
    }

    /// Task id.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Id of the task this one was forked from.
    pub fn parent(&self) -> Option<TaskId> {
        self.parent
    }

    /// Name of the last node executed (`None` before the first node).
    pub fn last_node(&self) -> Option<&str> {
        self.last_node.as_deref()
    }

    /// Names of all nodes executed, in order.
    pub fn trail(&self) -> &[String] {
        &self.trail
    }

    /// Shared run parameters.
    pub fn parameters(&self) -> &Arc<Parameters> {
        &self.parameters
    }

    /// Marks the task successful.
    pub fn succeed(mut self) -> Self {
        self.status = TaskStatus::Success;
        self.failure = None;
        self
    }

    /// Marks the task failed with a reason.
    pub fn fail(mut self, reason: impl Into<String>) -> Self {
        self.status = TaskStatus::Fail;
        self.failure = Some(reason.into());
        self
    }

    pub(crate) fn record_node(&mut self, name: &str) {
        self.last_node = Some(name.to_string());
        self.trail.push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Parameters;

    fn task() -> Task {
        let params = Arc::new(Parameters::default());
        Task::new(params, Arc::from(Vec::new()), 7)
    }

    #[test]
    fn test_new_task_is_pending() {
        let t = task();
        assert_eq!(t.status, TaskStatus::Pending);
        assert!(t.last_node().is_none());
        assert!(t.parent().is_none());
    }

    #[test]
    fn test_fork_links_parent() {
        let mut t = task();
        t.retries = 2;
        let child = t.fork();
        assert_ne!(child.id(), t.id());
        assert_eq!(child.parent(), Some(t.id()));
        assert_eq!(child.retries, 2);
    }

    #[test]
    fn test_fork_is_deterministic() {
        let mut a = task();
        let mut b = task();
        let mut ca = a.fork();
        let mut cb = b.fork();
        assert_eq!(ca.rng.random::<u64>(), cb.rng.random::<u64>());
    }

    #[test]
    fn test_status_helpers() {
        let t = task().fail("no offspring");
        assert_eq!(t.status, TaskStatus::Fail);
        assert_eq!(t.failure.as_deref(), Some("no offspring"));
        let t = t.succeed();
        assert_eq!(t.status, TaskStatus::Success);
        assert!(t.failure.is_none());
    }

    #[test]
    fn test_record_node() {
        let mut t = task();
        t.record_node("selection");
        t.record_node("crossover");
        assert_eq!(t.last_node(), Some("crossover"));
        assert_eq!(t.trail(), ["selection".to_string(), "crossover".to_string()]);
    }
}
