//! Task dispatch engine.
//!
//! A [`Stage`] builds [`Task`]s from the run [`Parameters`], routes them
//! through named [`Node`]s according to a [`Scheme`], executes each round
//! with a [`Runner`] and folds the finished tasks back into new parameters.
//!
//! ```text
//!  Parameters ──task builder──▶ tasks ──┐
//!                                       ▼
//!            ┌──── scheme.next(last node, status) ────┐
//!            │                                        │
//!        terminal                              node batch ──runner──▶ tasks
//!            │                                        ▲                 │
//!            ▼                                        └─────────────────┘
//!   finished tasks ──updater──▶ Parameters
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rand::{rngs::StdRng, SeedableRng};
//! use u_evograph::engine::{Node, NodeOutput, Parameters, Scheme, Stage, Task};
//!
//! let stage = Stage::builder("count")
//!     .with_scheme(Scheme::sequential(&["tick"]).unwrap())
//!     .with_node(Node::new("tick", |t: Task| NodeOutput::from(t.succeed())))
//!     .with_task_builder(|params: &Arc<Parameters>, _rng: &mut StdRng| {
//!         (0..3)
//!             .map(|i| Task::new(Arc::clone(params), Arc::from(Vec::new()), i))
//!             .collect()
//!     })
//!     .with_updater(|tasks: Vec<Task>, mut params: Parameters| {
//!         params.generation += tasks.len();
//!         Ok(params)
//!     })
//!     .build()
//!     .unwrap();
//!
//! let (params, report) = stage.run(Parameters::default(), &mut StdRng::seed_from_u64(0)).unwrap();
//! assert_eq!(params.generation, 3);
//! assert_eq!(report.finished, 3);
//! ```

mod node;
mod parameters;
mod runner;
mod scheme;
mod stage;
mod task;

pub use node::{Node, NodeOutput, Operation};
pub use parameters::Parameters;
pub use runner::{runner_for_jobs, ParallelRunner, Runner, SequentialRunner, Workers};
pub use scheme::{Scheme, SchemeBuilder, Transition};
pub use stage::{
    RunBudget, Stage, StageBuilder, StageReport, StopFn, TaskBuilderFn, UpdaterFn,
    DEFAULT_MAX_ROUNDS,
};
pub use task::{Task, TaskId, TaskStatus};
