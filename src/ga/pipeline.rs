//! The default generation pipeline.
//!
//! One generation runs three stages in order:
//!
//! ```text
//! adaptive_parameters:  pop_size
//!
//! evolution:            regularization -> selection -> crossover -> mutation -> evaluator
//!                                            ^  fail        |  fail     |
//!                                            |              v           v
//!                                            +--------- retry <---------+
//!                                             (success)    (fail: drop)
//!
//! survival:             inheritance -> elitism
//! ```
//!
//! The evolution stage starts one task per population slot and stops as
//! soon as the finished tasks hold `pop_size` evaluated offspring.

use std::sync::Arc;

use rand::Rng;

use super::config::GraphRequirements;
use super::types::OperatorSet;
use super::{crossover, elitism, evaluator, inheritance, mutation, population_size, regularization, selection};
use crate::engine::{
    runner_for_jobs, Node, NodeOutput, Parameters, Scheme, Stage, Task, TaskStatus, Transition,
};
use crate::error::Result;
use crate::population::Individual;

/// Name of the retry node.
pub const RETRY: &str = "retry";

/// Stage names, in execution order.
pub const STAGES: [&str; 3] = ["adaptive_parameters", "evolution", "survival"];

/// Sends a failed task back to selection until `max_retries` is spent.
pub fn retry_node() -> Node {
    Node::new(RETRY, |mut task: Task| {
        task.retries += 1;
        task.parents.clear();
        task.offspring.clear();
        task.mutations_applied.clear();
        let max_retries = task.parameters().algorithm.max_retries;
        let task = if task.retries <= max_retries {
            task.succeed()
        } else {
            let reason = task.failure.take().unwrap_or_default();
            task.fail(format!("retries exhausted: {reason}"))
        };
        NodeOutput::from(task)
    })
}

/// Routing of the evolution stage.
pub fn evolution_scheme() -> Result<Scheme> {
    Scheme::builder()
        .entry(regularization::NODE)
        .always(regularization::NODE, selection::NODE)
        .on(selection::NODE, TaskStatus::Success, crossover::NODE)
        .on(selection::NODE, TaskStatus::Fail, Transition::Terminal)
        .on(crossover::NODE, TaskStatus::Success, mutation::NODE)
        .on(crossover::NODE, TaskStatus::Fail, RETRY)
        .on(mutation::NODE, TaskStatus::Success, evaluator::NODE)
        .on(mutation::NODE, TaskStatus::Fail, RETRY)
        .on(evaluator::NODE, TaskStatus::Success, Transition::Terminal)
        .on(evaluator::NODE, TaskStatus::Fail, RETRY)
        .on(RETRY, TaskStatus::Success, selection::NODE)
        .on(RETRY, TaskStatus::Fail, Transition::Terminal)
        .build()
}

fn successful(tasks: Vec<Task>) -> impl Iterator<Item = Task> {
    tasks.into_iter().filter(|t| t.status == TaskStatus::Success)
}

/// Builds the three default stages.
///
/// All stages share one runner chosen from `n_jobs` and `task_timeout`.
pub fn default_stages(ops: &Arc<OperatorSet>, requirements: &GraphRequirements) -> Result<Vec<Stage>> {
    let runner = runner_for_jobs(requirements.n_jobs, requirements.task_timeout)?;
    let max_rounds = requirements.max_stage_rounds;

    let adaptive = Stage::builder(STAGES[0])
        .with_scheme(Scheme::sequential(&[population_size::NODE])?)
        .with_node(population_size::node())
        .with_runner(Arc::clone(&runner))
        .with_max_rounds(max_rounds)
        .with_task_builder(|params: &Arc<Parameters>, rng: &mut rand::rngs::StdRng| {
            vec![Task::new(Arc::clone(params), Arc::from(Vec::new()), rng.random())]
        })
        .with_updater(|tasks: Vec<Task>, mut params: Parameters| {
            if let Some(size) = successful(tasks).find_map(|t| t.pop_size) {
                params.algorithm.pop_size = size;
            }
            Ok(params)
        })
        .build()?;

    let evolution = Stage::builder(STAGES[1])
        .with_scheme(evolution_scheme()?)
        .with_nodes([
            regularization::node(),
            selection::node(),
            crossover::node(Arc::clone(ops)),
            mutation::node(Arc::clone(ops)),
            evaluator::node(Arc::clone(ops)),
            retry_node(),
        ])
        .with_runner(Arc::clone(&runner))
        .with_max_rounds(max_rounds)
        .with_task_builder(|params: &Arc<Parameters>, rng: &mut rand::rngs::StdRng| {
            let population: Arc<[Individual]> = params.population.clone().into();
            (0..params.algorithm.pop_size)
                .map(|_| Task::new(Arc::clone(params), Arc::clone(&population), rng.random()))
                .collect()
        })
        .with_stop(|finished: &[Task]| {
            let Some(first) = finished.first() else {
                return false;
            };
            let target = first.parameters().algorithm.pop_size;
            finished.iter().map(|t| t.generation.len()).sum::<usize>() >= target
        })
        .with_updater({
            let ops = Arc::clone(ops);
            move |tasks: Vec<Task>, mut params: Parameters| {
                evaluator::apply_rewards(&ops, &tasks);
                let target = params.algorithm.pop_size;
                params.new_population = successful(tasks)
                    .flat_map(|t| t.generation)
                    .take(target)
                    .collect();
                Ok(params)
            }
        })
        .build()?;

    let survival = Stage::builder(STAGES[2])
        .with_scheme(Scheme::sequential(&[inheritance::NODE, elitism::NODE])?)
        .with_nodes([inheritance::node(), elitism::node()])
        .with_runner(runner)
        .with_max_rounds(max_rounds)
        .with_task_builder(|params: &Arc<Parameters>, rng: &mut rand::rngs::StdRng| {
            let mut task = Task::new(
                Arc::clone(params),
                params.population.clone().into(),
                rng.random(),
            );
            task.offspring = params.new_population.clone();
            vec![task]
        })
        .with_updater(|tasks: Vec<Task>, mut params: Parameters| {
            if let Some(next) = successful(tasks)
                .map(|t| t.generation)
                .find(|generation| !generation.is_empty())
            {
                params.population = next;
            }
            params.new_population.clear();
            Ok(params)
        })
        .build()?;

    Ok(vec![adaptive, evolution, survival])
}
