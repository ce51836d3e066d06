//! Runners execute one round of `(task, node)` units.
//!
//! Both runners isolate failures per unit: a panicking operation or one
//! exceeding the per-task timeout yields a `Fail` copy of its input task
//! instead of aborting the round. Contract violations are the exception and
//! are returned to the stage as errors.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use tracing::warn;

use super::node::Node;
use super::task::Task;
use crate::error::{EvoError, Result};

/// Executes a batch of units and returns every produced task.
///
/// Output order follows batch order (the tasks of unit 0 first, and so on),
/// so results do not depend on scheduling.
pub trait Runner: Send + Sync {
    /// Executes `batch`.
    fn run(&self, batch: Vec<(Task, Arc<Node>)>) -> Result<Vec<Task>>;
}

/// Worker count for [`ParallelRunner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Workers {
    /// One worker per available core.
    #[default]
    All,
    /// A fixed number of workers (at least 1).
    Fixed(usize),
}

impl Workers {
    /// Maps a job count: `-1` (or any non-positive value) means all cores.
    pub fn from_jobs(n_jobs: i32) -> Self {
        if n_jobs <= 0 {
            Workers::All
        } else {
            Workers::Fixed(n_jobs as usize)
        }
    }
}

/// Builds the runner matching a job count: sequential for `1`, parallel
/// otherwise.
pub fn runner_for_jobs(n_jobs: i32, task_timeout: Option<Duration>) -> Result<Arc<dyn Runner>> {
    if n_jobs == 1 {
        Ok(Arc::new(SequentialRunner::new(task_timeout)))
    } else {
        Ok(Arc::new(ParallelRunner::new(Workers::from_jobs(n_jobs), task_timeout)?))
    }
}

// ---- Unit execution ----

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A `Fail` copy of `task`, stamped as if `node` had produced it.
fn failed_unit(mut task: Task, node: &Node, error: EvoError) -> Task {
    task.record_node(node.name());
    task.fail(error.to_string())
}

/// Runs one unit, turning a panic into a failed copy of the input.
fn run_unit(task: Task, node: &Node) -> Result<Vec<Task>> {
    let fallback = task.clone();
    match catch_unwind(AssertUnwindSafe(|| node.invoke(task))) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(node = node.name(), task = %fallback.id(), "operation panicked: {message}");
            Ok(vec![failed_unit(fallback, node, EvoError::Worker(message))])
        }
    }
}

// ---- Sequential ----

/// Runs units one after another on the calling thread.
///
/// A unit running past the timeout cannot be interrupted; its result is
/// discarded and replaced by a failed copy of the input.
#[derive(Debug, Clone, Default)]
pub struct SequentialRunner {
    task_timeout: Option<Duration>,
}

impl SequentialRunner {
    /// Creates a runner with an optional per-unit timeout.
    pub fn new(task_timeout: Option<Duration>) -> Self {
        Self { task_timeout }
    }
}

impl Runner for SequentialRunner {
    fn run(&self, batch: Vec<(Task, Arc<Node>)>) -> Result<Vec<Task>> {
        let mut out = Vec::with_capacity(batch.len());
        for (task, node) in batch {
            let Some(limit) = self.task_timeout else {
                out.extend(run_unit(task, &node)?);
                continue;
            };
            let fallback = task.clone();
            let started = Instant::now();
            let produced = run_unit(task, &node)?;
            if started.elapsed() > limit {
                warn!(node = node.name(), task = %fallback.id(), ?limit, "task timed out");
                let error = EvoError::Worker(format!("timed out after {limit:?}"));
                out.push(failed_unit(fallback, &node, error));
            } else {
                out.extend(produced);
            }
        }
        Ok(out)
    }
}

// ---- Parallel ----

enum Message {
    Started(usize, Instant),
    Finished(usize, Result<Vec<Task>>),
}

// Unit lifecycle, shared between the collecting thread and the worker.
const QUEUED: u8 = 0;
const RUNNING: u8 = 1;
const DONE: u8 = 2;
const ABANDONED: u8 = 3;

/// Runs units on a dedicated rayon pool.
///
/// Workers report back over a crossbeam channel. With a timeout, a unit that
/// has been running longer than the limit is abandoned: its input comes
/// back as `Fail` and its eventual result is ignored. An abandoned unit keeps
/// its worker until it returns, across rounds; while every worker is held
/// that way, queued units fail instead of waiting.
pub struct ParallelRunner {
    pool: rayon::ThreadPool,
    task_timeout: Option<Duration>,
    busy_abandoned: Arc<AtomicUsize>,
}

impl std::fmt::Debug for ParallelRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelRunner")
            .field("workers", &self.pool.current_num_threads())
            .field("task_timeout", &self.task_timeout)
            .field("busy_abandoned", &self.busy_abandoned.load(Ordering::Acquire))
            .finish()
    }
}

impl ParallelRunner {
    /// Creates the worker pool.
    pub fn new(workers: Workers, task_timeout: Option<Duration>) -> Result<Self> {
        let threads = match workers {
            Workers::All => 0,
            Workers::Fixed(n) => n.max(1),
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("evograph-worker-{i}"))
            .build()
            .map_err(|e| EvoError::config(format!("cannot start worker pool: {e}")))?;
        Ok(Self {
            pool,
            task_timeout,
            busy_abandoned: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Workers still held by abandoned units, from this or earlier rounds.
    pub fn busy_abandoned(&self) -> usize {
        self.busy_abandoned.load(Ordering::Acquire)
    }
}

/// Bookkeeping for one parallel round.
struct Round {
    fallbacks: Vec<Option<Task>>,
    nodes: Vec<Arc<Node>>,
    states: Arc<[AtomicU8]>,
    busy_abandoned: Arc<AtomicUsize>,
    results: Vec<Option<Vec<Task>>>,
    running: HashMap<usize, Instant>,
    abandoned: HashSet<usize>,
    remaining: usize,
}

impl Round {
    fn resolve(&mut self, index: usize, tasks: Vec<Task>) {
        if self.results[index].is_none() {
            self.results[index] = Some(tasks);
            self.remaining -= 1;
        }
    }

    fn fail(&mut self, index: usize, reason: String) {
        if let Some(task) = self.fallbacks[index].take() {
            let failed = failed_unit(task, &self.nodes[index], EvoError::Worker(reason));
            self.resolve(index, vec![failed]);
        }
    }

    fn handle(&mut self, message: Message) -> Result<()> {
        match message {
            Message::Started(index, at) => {
                if self.results[index].is_none() {
                    self.running.insert(index, at);
                }
            }
            Message::Finished(index, result) => {
                self.running.remove(&index);
                if self.abandoned.remove(&index) {
                    return Ok(());
                }
                let tasks = result?;
                self.fallbacks[index] = None;
                self.resolve(index, tasks);
            }
        }
        Ok(())
    }

    fn expire(&mut self, limit: Duration) {
        let now = Instant::now();
        let overdue: Vec<usize> = self
            .running
            .iter()
            .filter(|&(_, &at)| now.duration_since(at) >= limit)
            .map(|(&i, _)| i)
            .collect();
        for index in overdue {
            // counted before the state flips so the worker never decrements first
            self.busy_abandoned.fetch_add(1, Ordering::AcqRel);
            let flipped = self.states[index]
                .compare_exchange(RUNNING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok();
            if !flipped {
                // finished meanwhile; its result is already on the channel
                self.busy_abandoned.fetch_sub(1, Ordering::AcqRel);
                continue;
            }
            self.running.remove(&index);
            self.abandoned.insert(index);
            warn!(node = self.nodes[index].name(), ?limit, "task timed out, abandoning worker");
            self.fail(index, format!("timed out after {limit:?}"));
        }
    }

    /// Fails every unit that has not started yet.
    fn starve(&mut self) {
        for index in 0..self.results.len() {
            if self.results[index].is_some() {
                continue;
            }
            let withdrawn = self.states[index]
                .compare_exchange(QUEUED, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok();
            if withdrawn {
                self.abandoned.insert(index);
                warn!(node = self.nodes[index].name(), "no free worker left");
                self.fail(index, "worker pool exhausted by timed-out tasks".to_string());
            }
        }
    }

    fn deadline(&self, limit: Duration) -> Option<Instant> {
        self.running.values().min().map(|&at| at + limit)
    }
}

impl ParallelRunner {
    fn collect(&self, rx: Receiver<Message>, mut round: Round) -> Result<Vec<Task>> {
        while round.remaining > 0 {
            let Some(limit) = self.task_timeout else {
                match rx.recv() {
                    Ok(message) => round.handle(message)?,
                    Err(_) => {
                        for index in 0..round.results.len() {
                            round.fail(index, "worker disconnected".to_string());
                        }
                    }
                }
                continue;
            };

            if self.busy_abandoned() >= self.workers() {
                round.starve();
                if round.remaining == 0 {
                    break;
                }
            }
            // queued units are re-checked at least once per `limit`
            let deadline = round
                .deadline(limit)
                .unwrap_or_else(|| Instant::now() + limit);
            match rx.recv_deadline(deadline) {
                Ok(message) => round.handle(message)?,
                Err(RecvTimeoutError::Timeout) => {
                    round.expire(limit);
                    while let Ok(message) = rx.try_recv() {
                        round.handle(message)?;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    for index in 0..round.results.len() {
                        round.fail(index, "worker disconnected".to_string());
                    }
                }
            }
        }
        Ok(round.results.into_iter().flatten().flatten().collect())
    }
}

impl Runner for ParallelRunner {
    fn run(&self, batch: Vec<(Task, Arc<Node>)>) -> Result<Vec<Task>> {
        let n = batch.len();
        if n == 0 {
            return Ok(Vec::new());
        }
        let (tx, rx) = channel::unbounded();
        let states: Arc<[AtomicU8]> = (0..n).map(|_| AtomicU8::new(QUEUED)).collect();
        let mut round = Round {
            fallbacks: Vec::with_capacity(n),
            nodes: Vec::with_capacity(n),
            states: Arc::clone(&states),
            busy_abandoned: Arc::clone(&self.busy_abandoned),
            results: (0..n).map(|_| None).collect(),
            running: HashMap::new(),
            abandoned: HashSet::new(),
            remaining: n,
        };
        for (index, (task, node)) in batch.into_iter().enumerate() {
            round.fallbacks.push(Some(task.clone()));
            round.nodes.push(Arc::clone(&node));
            let tx = tx.clone();
            let states = Arc::clone(&states);
            let busy_abandoned = Arc::clone(&self.busy_abandoned);
            self.pool.spawn(move || {
                let state = &states[index];
                if state
                    .compare_exchange(QUEUED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    // withdrawn before a worker picked it up
                    return;
                }
                let _ = tx.send(Message::Started(index, Instant::now()));
                let result = run_unit(task, &node);
                let finished = state
                    .compare_exchange(RUNNING, DONE, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok();
                if finished {
                    let _ = tx.send(Message::Finished(index, result));
                } else {
                    busy_abandoned.fetch_sub(1, Ordering::AcqRel);
                }
            });
        }
        drop(tx);
        self.collect(rx, round)
    }
}
