//! Offspring evaluation.

use std::sync::Arc;

use tracing::warn;

use super::types::OperatorSet;
use crate::engine::{Node, NodeOutput, Task};
use crate::error::Result;
use crate::fitness::FitnessMode;
use crate::population::Individual;

/// Node name used in schemes.
pub const NODE: &str = "evaluator";

/// Evaluates one individual through the shared cache.
///
/// Individuals that already carry a fitness are returned unchanged.
pub fn evaluate(ops: &OperatorSet, mut individual: Individual) -> Result<Individual> {
    if !individual.is_evaluated() {
        let fitness = ops.cache.evaluate(&ops.objective, &individual)?;
        individual.set_fitness(fitness);
    }
    Ok(individual)
}

/// Reward for the operators that produced `child`: 1.0 when the child is
/// better than every evaluated parent, 0.0 otherwise.
fn reward(child: &Individual, parents: &[Individual], mode: FitnessMode) -> f64 {
    let Some(fitness) = child.fitness() else {
        return 0.0;
    };
    let beats_all = parents
        .iter()
        .filter_map(Individual::fitness)
        .all(|parent| fitness.is_better(parent, mode));
    if beats_all {
        1.0
    } else {
        0.0
    }
}

/// Reports the rewards buffered on `tasks` to the agent, in task order.
///
/// Called once per stage run so that agent weights stay fixed while units
/// run, whatever the runner's scheduling.
pub fn apply_rewards(ops: &OperatorSet, tasks: &[Task]) {
    for (op, reward) in tasks.iter().flat_map(|t| t.rewards.iter().copied()) {
        ops.agent.observe(op, reward);
    }
}

/// Evaluates the task's offspring and moves them into `generation`.
///
/// Offspring whose evaluation fails are dropped with a warning. The task
/// fails when none could be evaluated. Rewards for the applied mutation
/// operators are buffered in `task.rewards` (see [`apply_rewards`]).
pub fn node(ops: Arc<OperatorSet>) -> Node {
    Node::new(NODE, move |mut task: Task| {
        let mode = task.parameters().fitness_mode();
        let offspring = std::mem::take(&mut task.offspring);
        let mut last_error = None;
        let mut evaluated = 0usize;
        for child in offspring {
            match evaluate(&ops, child) {
                Ok(child) => {
                    let reward = reward(&child, &task.parents, mode);
                    let earned: Vec<(usize, f64)> =
                        task.mutations_applied.iter().map(|&op| (op, reward)).collect();
                    task.rewards.extend(earned);
                    task.generation.push(child);
                    evaluated += 1;
                }
                Err(e) => {
                    warn!(task = %task.id(), error = %e, "offspring evaluation failed");
                    last_error = Some(e);
                }
            }
        }
        task.mutations_applied.clear();
        let task = match last_error {
            Some(e) if evaluated == 0 => task.fail(e.to_string()),
            _ => task.succeed(),
        };
        NodeOutput::from(task)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Parameters, TaskStatus};
    use crate::error::EvoError;
    use crate::fitness::Fitness;
    use crate::ga::agent::AdaptiveAgent;
    use crate::ga::objective::{Direction, EvaluationCache, Objective};
    use crate::ga::OperatorAgent;
    use crate::graph::{ConstraintRules, Graph, NodeContent};

    fn individual(names: &[&str]) -> Individual {
        let graph = Graph::chain(
            names.iter().map(|n| NodeContent::new(*n)),
            Arc::new(ConstraintRules::dag()),
        )
        .unwrap();
        Individual::new(graph)
    }

    fn operator_set(objective: Objective, agent: Arc<dyn OperatorAgent>) -> OperatorSet {
        OperatorSet {
            objective: Arc::new(objective),
            cache: Arc::new(EvaluationCache::new()),
            mutations: Vec::new(),
            crossovers: Vec::new(),
            agent,
        }
    }

    fn size_objective() -> Objective {
        Objective::single("size", Direction::Minimize, |g| Ok(g.length() as f64))
    }

    fn task(offspring: Vec<Individual>, parents: Vec<Individual>) -> Task {
        let mut task = Task::new(Arc::new(Parameters::default()), Arc::from(Vec::new()), 0);
        task.offspring = offspring;
        task.parents = parents;
        task
    }

    #[test]
    fn test_moves_offspring_to_generation() {
        let ops = Arc::new(operator_set(size_objective(), Arc::new(AdaptiveAgent::default())));
        let out = node(ops)
            .invoke(task(vec![individual(&["a", "b"])], Vec::new()))
            .unwrap();
        assert_eq!(out[0].status, TaskStatus::Success);
        assert!(out[0].offspring.is_empty());
        assert_eq!(out[0].generation[0].fitness(), Some(&Fitness::single(2.0)));
    }

    #[test]
    fn test_fails_when_nothing_evaluates() {
        let objective = Objective::single("broken", Direction::Minimize, |_| {
            Err(EvoError::Evaluation("model diverged".into()))
        });
        let ops = Arc::new(operator_set(objective, Arc::new(AdaptiveAgent::default())));
        let out = node(ops).invoke(task(vec![individual(&["a"])], Vec::new())).unwrap();
        assert_eq!(out[0].status, TaskStatus::Fail);
        assert!(out[0].generation.is_empty());
        assert!(out[0].failure.as_deref().unwrap_or("").contains("model diverged"));
    }

    #[test]
    fn test_keeps_existing_fitness() {
        let ops = operator_set(size_objective(), Arc::new(AdaptiveAgent::default()));
        let known = individual(&["a", "b", "c"]).with_fitness(Fitness::single(0.5));
        let out = evaluate(&ops, known).unwrap();
        assert_eq!(out.fitness(), Some(&Fitness::single(0.5)));
        assert_eq!(ops.cache.evaluations(), 0);
    }

    #[test]
    fn test_rewards_improving_mutation() {
        let agent = Arc::new(AdaptiveAgent::new(1.0, 0.0, 1));
        let ops = Arc::new(operator_set(size_objective(), agent.clone()));
        let parent = individual(&["a", "b", "c"]).with_fitness(Fitness::single(3.0));
        let mut t = task(vec![individual(&["a"])], vec![parent.clone()]);
        t.mutations_applied = vec![0];
        let out = node(Arc::clone(&ops)).invoke(t).unwrap();
        assert_eq!(out[0].rewards, vec![(0, 1.0)]);
        // nothing reaches the agent until the rewards are applied
        assert!(agent.weights().is_empty());
        apply_rewards(&ops, &out);
        assert_eq!(agent.weights()[0], 1.0);

        let mut t = task(vec![individual(&["a", "b", "c", "d"])], vec![parent]);
        t.mutations_applied = vec![1];
        let out = node(Arc::clone(&ops)).invoke(t).unwrap();
        assert_eq!(out[0].rewards, vec![(1, 0.0)]);
        assert!(out[0].mutations_applied.is_empty());
        apply_rewards(&ops, &out);
        assert_eq!(agent.weights()[1], 0.0);
    }
}
