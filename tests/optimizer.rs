use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use u_evograph::engine::{Node, NodeOutput, Parameters, Scheme, Stage, Task};
use u_evograph::fitness::FitnessMode;
use u_evograph::ga::{
    AdaptiveAgent, AlgorithmParams, Direction, ElitismType, GraphGenerationParams,
    GraphRequirements, HistorySink, InheritanceType, MemoryHistory, Objective, Optimizer, RegularizationType,
};
use u_evograph::graph::{ConstraintRules, Graph, NodeContent};
use u_evograph::population::{self, Individual};
use u_evograph::{EvoError, Result};

const TARGET_LENGTH: usize = 6;

/// Distance to a target structure: `TARGET_LENGTH` nodes, all labeled "c".
fn target_distance(graph: &Graph) -> Result<f64> {
    let off_label = graph.nodes().iter().filter(|n| n.name() != "c").count();
    Ok(graph.length().abs_diff(TARGET_LENGTH) as f64 + off_label as f64)
}

fn seeds() -> Vec<Graph> {
    let rules = Arc::new(ConstraintRules::dag());
    vec![
        Graph::chain(["a", "b"].into_iter().map(NodeContent::new), Arc::clone(&rules)).unwrap(),
        Graph::chain(["b", "a", "b"].into_iter().map(NodeContent::new), rules).unwrap(),
    ]
}

fn graph_params() -> GraphGenerationParams {
    GraphGenerationParams::new(ConstraintRules::dag(), ["a", "b", "c"])
}

fn requirements(n_jobs: i32) -> GraphRequirements {
    GraphRequirements::default()
        .with_num_of_generations(15)
        .with_n_jobs(n_jobs)
        .with_seed(42)
}

fn optimizer(n_jobs: i32, algorithm: AlgorithmParams) -> Optimizer {
    Optimizer::new(
        Objective::single("distance", Direction::Minimize, target_distance),
        seeds(),
        requirements(n_jobs),
        graph_params(),
        algorithm,
    )
}

// ============================================================================
// Target-graph search
// ============================================================================

#[test]
fn test_search_improves_sequential() {
    let result = optimizer(1, AlgorithmParams::default().with_pop_size(12))
        .optimize()
        .unwrap();
    assert_eq!(result.generations, 15);
    assert!(!result.cancelled && !result.timed_out && !result.stagnated);
    assert_eq!(result.fitness_history.len(), 16);
    assert!(result.fitness_history.windows(2).all(|w| w[1] <= w[0]));
    assert!(result.fitness_history[15] < result.fitness_history[0]);
    assert!(result.evaluations > 0);
    assert!(result.population.iter().all(|i| i.is_evaluated()));
}

#[test]
fn test_search_improves_parallel() {
    let result = optimizer(2, AlgorithmParams::default().with_pop_size(12))
        .optimize()
        .unwrap();
    assert_eq!(result.generations, 15);
    assert!(result.fitness_history[15] < result.fitness_history[0]);
}

#[test]
fn test_same_seed_same_history() {
    let algorithm = AlgorithmParams::default().with_pop_size(10);
    let sequential = optimizer(1, algorithm.clone()).optimize().unwrap();
    let again = optimizer(1, algorithm.clone()).optimize().unwrap();
    let parallel = optimizer(2, algorithm).optimize().unwrap();
    assert_eq!(sequential.fitness_history, again.fitness_history);
    assert_eq!(sequential.fitness_history, parallel.fitness_history);
}

#[test]
fn test_adaptive_agent_same_history_under_both_runners() {
    let run = |n_jobs: i32| {
        optimizer(n_jobs, AlgorithmParams::default().with_pop_size(10))
            .with_agent(Arc::new(AdaptiveAgent::new(0.5, 0.05, 3)))
            .optimize()
            .unwrap()
    };
    let sequential = run(1);
    let parallel = run(3);
    assert_eq!(sequential.fitness_history, parallel.fitness_history);
    let ids = |r: &u_evograph::ga::OptimizationResult| {
        r.population
            .iter()
            .map(|i| i.descriptive_id().to_string())
            .collect::<Vec<_>>()
    };
    assert_eq!(ids(&sequential), ids(&parallel));
}

#[test]
fn test_steady_state_with_regularization() {
    let algorithm = AlgorithmParams::steady_state()
        .with_pop_size(10)
        .with_regularization(RegularizationType::Prune {
            max_depth: 8,
            max_length: 8,
        });
    let result = optimizer(1, algorithm).optimize().unwrap();
    assert!(result.population.len() <= 10);
    assert!(result.best.is_some());
}

#[test]
fn test_replace_worst_and_adaptive_agent() {
    let agent = Arc::new(AdaptiveAgent::new(0.3, 0.05, 10));
    let algorithm = AlgorithmParams::default()
        .with_pop_size(10)
        .with_elitism(ElitismType::ReplaceWorst)
        .with_inheritance(InheritanceType::Generational);
    let result = optimizer(1, algorithm)
        .with_agent(agent.clone())
        .optimize()
        .unwrap();
    assert_eq!(result.generations, 15);
    assert_eq!(agent.weights().len(), 4);
}

#[test]
fn test_adaptive_population_size_stays_bounded() {
    let algorithm = AlgorithmParams::parameter_free()
        .with_pop_size(6)
        .with_max_pop_size(12);
    let history = Arc::new(Mutex::new(MemoryHistory::new()));
    let result = optimizer(1, algorithm)
        .with_history(Arc::clone(&history))
        .optimize()
        .unwrap();
    let history = history.lock();
    assert_eq!(history.len(), result.generations + 1);
    assert!(history.snapshots.iter().all(|s| s.population.len() <= 12));
}

// ============================================================================
// Stop conditions
// ============================================================================

#[test]
fn test_cancel_before_start() {
    let cancel = Arc::new(AtomicBool::new(true));
    let result = optimizer(1, AlgorithmParams::default().with_pop_size(6))
        .optimize_with_cancel(Some(cancel))
        .unwrap();
    assert!(result.cancelled);
    assert_eq!(result.generations, 0);
    assert!(result.best.is_some());
}

#[test]
fn test_cancel_from_history_sink() {
    struct CancelAfter {
        flag: Arc<AtomicBool>,
        generation: usize,
    }
    impl HistorySink for CancelAfter {
        fn on_generation(&mut self, generation: usize, _: &[Individual], _: &[Individual]) {
            if generation >= self.generation {
                self.flag.store(true, Ordering::Relaxed);
            }
        }
    }

    let flag = Arc::new(AtomicBool::new(false));
    let sink = CancelAfter {
        flag: Arc::clone(&flag),
        generation: 2,
    };
    let result = optimizer(1, AlgorithmParams::default().with_pop_size(6))
        .with_history(sink)
        .optimize_with_cancel(Some(flag))
        .unwrap();
    assert!(result.cancelled);
    assert_eq!(result.generations, 2);
}

#[test]
fn test_early_stopping_on_flat_objective() {
    let mut optimizer = Optimizer::new(
        Objective::single("flat", Direction::Minimize, |_| Ok(1.0)),
        seeds(),
        GraphRequirements::default()
            .with_num_of_generations(50)
            .with_early_stopping_iterations(3)
            .with_seed(1),
        graph_params(),
        AlgorithmParams::default().with_pop_size(6),
    );
    let result = optimizer.optimize().unwrap();
    assert!(result.stagnated);
    assert_eq!(result.generations, 3);
}

#[test]
fn test_timeout() {
    let objective = Objective::single("slow", Direction::Minimize, |g| {
        std::thread::sleep(Duration::from_millis(2));
        target_distance(g)
    });
    let mut optimizer = Optimizer::new(
        objective,
        seeds(),
        GraphRequirements::default()
            .without_generation_limit()
            .with_timeout(Duration::from_millis(100))
            .with_seed(3),
        graph_params(),
        AlgorithmParams::default().with_pop_size(6),
    );
    let result = optimizer.optimize().unwrap();
    assert!(result.timed_out);
    assert!(!result.cancelled);
}

// ============================================================================
// Multi-objective
// ============================================================================

#[test]
fn test_multi_objective_archive() {
    let objective = Objective::new(true)
        .with_metric("distance", Direction::Minimize, target_distance)
        .with_metric("size", Direction::Minimize, |g| Ok(g.length() as f64));
    let mut optimizer = Optimizer::new(
        objective,
        seeds(),
        GraphRequirements::default().with_num_of_generations(8).with_seed(5),
        graph_params(),
        AlgorithmParams::default().with_pop_size(10).with_multi_objective(true),
    );
    let result = optimizer.optimize().unwrap();
    assert!(!result.archive.is_empty());
    for a in &result.archive {
        for b in &result.archive {
            assert!(!a.fitness().unwrap().dominates(b.fitness().unwrap()));
        }
    }
    let best = population::best(&result.population, FitnessMode::Pareto);
    assert!(best.is_some());
}

// ============================================================================
// Configuration errors
// ============================================================================

#[test]
fn test_mode_mismatch_is_rejected() {
    let objective = Objective::new(true)
        .with_metric("distance", Direction::Minimize, target_distance)
        .with_metric("size", Direction::Minimize, |g| Ok(g.length() as f64));
    let err = Optimizer::new(
        objective,
        seeds(),
        requirements(1),
        graph_params(),
        AlgorithmParams::default(),
    )
    .optimize()
    .unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn test_missing_vocabulary_is_rejected() {
    let err = Optimizer::new(
        Objective::single("distance", Direction::Minimize, target_distance),
        seeds(),
        requirements(1),
        GraphGenerationParams::default(),
        AlgorithmParams::default(),
    )
    .optimize()
    .unwrap_err();
    assert!(matches!(err, EvoError::Configuration(_)));
}

#[test]
fn test_initial_graphs_must_satisfy_rules() {
    let err = Optimizer::new(
        Objective::single("distance", Direction::Minimize, target_distance),
        seeds(),
        requirements(1).with_max_depth(1),
        graph_params(),
        AlgorithmParams::default(),
    )
    .optimize()
    .unwrap_err();
    assert_eq!(err, EvoError::EmptyPopulation);
}

#[test]
fn test_custom_stage_factory() {
    let result = optimizer(1, AlgorithmParams::default().with_pop_size(6))
        .with_stages(|_, _| {
            let stage = Stage::builder("noop")
                .with_scheme(Scheme::sequential(&["noop"])?)
                .with_node(Node::new("noop", |t: Task| NodeOutput::from(t.succeed())))
                .with_task_builder(|params: &Arc<Parameters>, _rng: &mut rand::rngs::StdRng| {
                    vec![Task::new(Arc::clone(params), Arc::from(Vec::new()), 0)]
                })
                .build()?;
            Ok(vec![stage])
        })
        .optimize()
        .unwrap();
    assert_eq!(result.generations, 15);
    assert_eq!(result.fitness_history.first(), result.fitness_history.last());
}
