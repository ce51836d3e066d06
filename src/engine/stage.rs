//! A stage: build tasks, route them through nodes round by round, fold the
//! finished tasks back into the parameters.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use tracing::{debug, warn};

use super::node::Node;
use super::parameters::Parameters;
use super::runner::{Runner, SequentialRunner};
use super::scheme::{Scheme, Transition};
use super::task::{Task, TaskStatus};
use crate::error::{EvoError, Result};

/// Decides, from the tasks finished so far, whether the stage may stop.
pub type StopFn = dyn Fn(&[Task]) -> bool + Send + Sync;

/// Creates the initial tasks of a stage run.
pub type TaskBuilderFn = dyn Fn(&Arc<Parameters>, &mut StdRng) -> Vec<Task> + Send + Sync;

/// Folds finished tasks into new parameters.
pub type UpdaterFn = dyn Fn(Vec<Task>, Parameters) -> Result<Parameters> + Send + Sync;

/// Default cap on routing rounds per stage run.
pub const DEFAULT_MAX_ROUNDS: usize = 1000;

/// External limits checked before every round.
#[derive(Debug, Clone, Default)]
pub struct RunBudget {
    /// Wall-clock deadline for the whole optimization.
    pub deadline: Option<Instant>,
    /// Cooperative cancellation flag.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl RunBudget {
    /// No deadline, no cancellation.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// `true` once cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// `true` once past the deadline.
    pub fn is_timed_out(&self) -> bool {
        self.deadline.is_some_and(|at| Instant::now() >= at)
    }

    /// `true` when the run must stop.
    pub fn is_exhausted(&self) -> bool {
        self.is_cancelled() || self.is_timed_out()
    }
}

/// Task accounting of one stage run.
///
/// Every task created during the run is accounted exactly once:
/// `created == finished + dropped + capped`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageReport {
    /// Routing rounds executed.
    pub rounds: usize,
    /// Tasks built or forked.
    pub created: usize,
    /// Tasks that reached a terminal transition with `Success`.
    pub finished: usize,
    /// Tasks that reached a terminal transition with `Fail`.
    pub dropped: usize,
    /// Tasks still in flight when the stop predicate, the round cap or the
    /// run budget ended the stage.
    pub capped: usize,
}

impl StageReport {
    /// `true` when every created task is accounted for.
    pub fn is_balanced(&self) -> bool {
        self.created == self.finished + self.dropped + self.capped
    }
}

/// A scheme, its nodes, a runner and the stage callbacks.
pub struct Stage {
    name: String,
    scheme: Scheme,
    nodes: HashMap<String, Arc<Node>>,
    runner: Arc<dyn Runner>,
    stop: Box<StopFn>,
    task_builder: Box<TaskBuilderFn>,
    updater: Box<UpdaterFn>,
    max_rounds: usize,
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("scheme", &self.scheme)
            .field("max_rounds", &self.max_rounds)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Stage`].
pub struct StageBuilder {
    name: String,
    scheme: Option<Scheme>,
    nodes: Vec<Node>,
    runner: Option<Arc<dyn Runner>>,
    stop: Option<Box<StopFn>>,
    task_builder: Option<Box<TaskBuilderFn>>,
    updater: Option<Box<UpdaterFn>>,
    max_rounds: usize,
}

impl StageBuilder {
    /// Sets the routing table.
    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = Some(scheme);
        self
    }

    /// Adds a node.
    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Adds several nodes.
    pub fn with_nodes(mut self, nodes: impl IntoIterator<Item = Node>) -> Self {
        self.nodes.extend(nodes);
        self
    }

    /// Sets the runner (default: [`SequentialRunner`] without timeout).
    pub fn with_runner(mut self, runner: Arc<dyn Runner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Sets the stop predicate (default: run until no task is in flight).
    pub fn with_stop(mut self, stop: impl Fn(&[Task]) -> bool + Send + Sync + 'static) -> Self {
        self.stop = Some(Box::new(stop));
        self
    }

    /// Sets the task builder (required).
    pub fn with_task_builder(
        mut self,
        builder: impl Fn(&Arc<Parameters>, &mut StdRng) -> Vec<Task> + Send + Sync + 'static,
    ) -> Self {
        self.task_builder = Some(Box::new(builder));
        self
    }

    /// Sets the parameter updater (default: parameters unchanged).
    pub fn with_updater(
        mut self,
        updater: impl Fn(Vec<Task>, Parameters) -> Result<Parameters> + Send + Sync + 'static,
    ) -> Self {
        self.updater = Some(Box::new(updater));
        self
    }

    /// Caps routing rounds per run (minimum 1).
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    /// Validates the scheme against the nodes and builds the stage.
    ///
    /// # Errors
    ///
    /// [`EvoError::Configuration`] for a missing scheme or task builder,
    /// duplicate node names, or a scheme referencing unknown nodes.
    pub fn build(self) -> Result<Stage> {
        let scheme = self
            .scheme
            .ok_or_else(|| EvoError::config(format!("stage '{}' has no scheme", self.name)))?;
        let task_builder = self
            .task_builder
            .ok_or_else(|| EvoError::config(format!("stage '{}' has no task builder", self.name)))?;

        let mut nodes = HashMap::with_capacity(self.nodes.len());
        for node in self.nodes {
            let name = node.name().to_string();
            if nodes.insert(name.clone(), Arc::new(node)).is_some() {
                return Err(EvoError::config(format!(
                    "stage '{}' defines node '{name}' twice",
                    self.name
                )));
            }
        }
        scheme.validate(nodes.keys().map(String::as_str))?;

        Ok(Stage {
            name: self.name,
            scheme,
            nodes,
            runner: self
                .runner
                .unwrap_or_else(|| Arc::new(SequentialRunner::default())),
            stop: self.stop.unwrap_or_else(|| Box::new(|_: &[Task]| false)),
            task_builder,
            updater: self.updater.unwrap_or_else(|| Box::new(|_: Vec<Task>, params: Parameters| Ok(params))),
            max_rounds: self.max_rounds,
        })
    }
}

impl Stage {
    /// Starts a builder.
    pub fn builder(name: impl Into<String>) -> StageBuilder {
        StageBuilder {
            name: name.into(),
            scheme: None,
            nodes: Vec::new(),
            runner: None,
            stop: None,
            task_builder: None,
            updater: None,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    /// Stage name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Routing table.
    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    /// Runs the stage to completion.
    pub fn run(&self, params: Parameters, rng: &mut StdRng) -> Result<(Parameters, StageReport)> {
        self.run_with_budget(params, rng, &RunBudget::unbounded())
    }

    /// Runs the stage, stopping gracefully between rounds once `budget` is
    /// exhausted.
    ///
    /// Each round routes every in-flight task: tasks reaching a terminal
    /// transition are collected, the others are grouped by target node and
    /// executed as one batch by the runner. The loop ends when nothing is
    /// in flight, when the stop predicate accepts the finished tasks, when
    /// the round cap is hit, or when the budget runs out. The finished tasks
    /// then go to the parameter updater.
    pub fn run_with_budget(
        &self,
        params: Parameters,
        rng: &mut StdRng,
        budget: &RunBudget,
    ) -> Result<(Parameters, StageReport)> {
        let snapshot = Arc::new(params);
        let mut in_flight = (self.task_builder)(&snapshot, rng);
        let mut report = StageReport {
            created: in_flight.len(),
            ..StageReport::default()
        };
        let mut finished: Vec<Task> = Vec::new();

        loop {
            let mut groups: BTreeMap<String, Vec<Task>> = BTreeMap::new();
            for task in in_flight.drain(..) {
                match self.scheme.next(task.last_node(), task.status)? {
                    Transition::Terminal => {
                        if task.status == TaskStatus::Fail {
                            report.dropped += 1;
                        } else {
                            report.finished += 1;
                        }
                        finished.push(task);
                    }
                    Transition::Node(name) => groups.entry(name).or_default().push(task),
                }
            }

            let pending: usize = groups.values().map(Vec::len).sum();
            if pending == 0 {
                break;
            }
            if (self.stop)(&finished) {
                debug!(stage = %self.name, capped = pending, "stop condition met");
                report.capped += pending;
                break;
            }
            if budget.is_exhausted() {
                debug!(stage = %self.name, capped = pending, "run budget exhausted");
                report.capped += pending;
                break;
            }
            if report.rounds >= self.max_rounds {
                warn!(stage = %self.name, rounds = report.rounds, capped = pending, "round cap reached");
                report.capped += pending;
                break;
            }

            let mut batch = Vec::with_capacity(pending);
            for (name, tasks) in groups {
                let node = self
                    .nodes
                    .get(&name)
                    .ok_or_else(|| EvoError::config(format!("unknown node '{name}'")))?;
                batch.extend(tasks.into_iter().map(|t| (t, Arc::clone(node))));
            }

            report.rounds += 1;
            debug!(stage = %self.name, round = report.rounds, tasks = pending, "dispatching round");
            let produced = self.runner.run(batch)?;
            report.created += produced.len().saturating_sub(pending);
            in_flight = produced;
        }

        let params = (self.updater)(finished, Arc::unwrap_or_clone(snapshot))?;
        debug_assert!(report.is_balanced());
        Ok((params, report))
    }
}
