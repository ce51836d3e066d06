//! The generation loop.
//!
//! [`Optimizer`] orchestrates the complete evolutionary process:
//! initial population → evaluation → stages per generation → archive
//! update → repeat until a limit is reached.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::agent::RandomAgent;
use super::config::{AlgorithmParams, GraphGenerationParams, GraphRequirements};
use super::evaluator;
use super::history::HistorySink;
use super::mutation::mutate_graph;
use super::objective::{EvaluationCache, Objective};
use super::pipeline::default_stages;
use super::types::{CrossoverOperator, MutationOperator, OperatorAgent, OperatorSet};
use crate::engine::{Parameters, RunBudget, Stage};
use crate::error::{EvoError, Result};
use crate::fitness::Archive;
use crate::graph::{ConstraintRules, Graph};
use crate::population::{sorted_best_first, Individual, Population};

/// Builds the stage list of a run.
pub type StageFactory = dyn Fn(&Arc<OperatorSet>, &GraphRequirements) -> Result<Vec<Stage>> + Send + Sync;

/// Result of an optimization run.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Final population, best first.
    pub population: Population,

    /// Best individual seen during the whole run.
    pub best: Option<Individual>,

    /// Archive members at the end of the run, best first.
    pub archive: Population,

    /// Completed generations.
    pub generations: usize,

    /// Whether the run stopped on `early_stopping_iterations`.
    pub stagnated: bool,

    /// Whether the run was cancelled externally.
    pub cancelled: bool,

    /// Whether the run hit the wall-clock timeout.
    pub timed_out: bool,

    /// Primary fitness of the archive's best member after each generation,
    /// starting with the initial population.
    pub fitness_history: Vec<f64>,

    /// Number of objective invocations.
    pub evaluations: usize,
}

/// Evolutionary optimizer over graphs.
///
/// # Examples
///
/// ```
/// use u_evograph::ga::{AlgorithmParams, Direction, GraphGenerationParams, GraphRequirements, Objective, Optimizer};
/// use u_evograph::graph::{ConstraintRules, Graph, NodeContent};
/// use std::sync::Arc;
///
/// let rules = ConstraintRules::dag();
/// let seed = Graph::chain([NodeContent::new("a"), NodeContent::new("b")], Arc::new(rules.clone())).unwrap();
/// let objective = Objective::single("size", Direction::Maximize, |g| Ok(g.length() as f64));
///
/// let result = Optimizer::new(
///     objective,
///     vec![seed],
///     GraphRequirements::default().with_num_of_generations(3).with_seed(7),
///     GraphGenerationParams::new(rules, ["a", "b", "c"]),
///     AlgorithmParams::default().with_pop_size(8),
/// )
/// .optimize()
/// .unwrap();
/// assert_eq!(result.generations, 3);
/// assert!(result.best.is_some());
/// ```
pub struct Optimizer {
    objective: Objective,
    initial_graphs: Vec<Graph>,
    requirements: GraphRequirements,
    graph_params: GraphGenerationParams,
    algorithm: AlgorithmParams,
    mutations: Vec<Arc<dyn MutationOperator>>,
    crossovers: Vec<Arc<dyn CrossoverOperator>>,
    agent: Arc<dyn OperatorAgent>,
    history: Option<Box<dyn HistorySink>>,
    stages: Option<Box<StageFactory>>,
}

impl fmt::Debug for Optimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Optimizer")
            .field("objective", &self.objective)
            .field("initial_graphs", &self.initial_graphs.len())
            .field("requirements", &self.requirements)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl Optimizer {
    /// Creates an optimizer with the default pipeline and a uniform
    /// mutation agent.
    pub fn new(
        objective: Objective,
        initial_graphs: Vec<Graph>,
        requirements: GraphRequirements,
        graph_params: GraphGenerationParams,
        algorithm: AlgorithmParams,
    ) -> Self {
        Self {
            objective,
            initial_graphs,
            requirements,
            graph_params,
            algorithm,
            mutations: Vec::new(),
            crossovers: Vec::new(),
            agent: Arc::new(RandomAgent),
            history: None,
            stages: None,
        }
    }

    /// Adds a mutation operator next to the configured built-in ones.
    pub fn with_mutation(mut self, operator: impl MutationOperator + 'static) -> Self {
        self.mutations.push(Arc::new(operator));
        self
    }

    /// Adds several mutation operators.
    pub fn with_mutations(mut self, operators: impl IntoIterator<Item = Arc<dyn MutationOperator>>) -> Self {
        self.mutations.extend(operators);
        self
    }

    /// Adds a crossover operator next to the configured built-in ones.
    pub fn with_crossover(mut self, operator: impl CrossoverOperator + 'static) -> Self {
        self.crossovers.push(Arc::new(operator));
        self
    }

    /// Adds several crossover operators.
    pub fn with_crossovers(
        mut self,
        operators: impl IntoIterator<Item = Arc<dyn CrossoverOperator>>,
    ) -> Self {
        self.crossovers.extend(operators);
        self
    }

    /// Sets the mutation operator policy.
    pub fn with_agent(mut self, agent: Arc<dyn OperatorAgent>) -> Self {
        self.agent = agent;
        self
    }

    /// Sets the per-generation observer.
    pub fn with_history(mut self, sink: impl HistorySink + 'static) -> Self {
        self.history = Some(Box::new(sink));
        self
    }

    /// Replaces the default stage list.
    pub fn with_stages(
        mut self,
        factory: impl Fn(&Arc<OperatorSet>, &GraphRequirements) -> Result<Vec<Stage>> + Send + Sync + 'static,
    ) -> Self {
        self.stages = Some(Box::new(factory));
        self
    }

    fn validate(&self) -> Result<()> {
        self.requirements.validate()?;
        self.algorithm.validate()?;
        self.graph_params.validate(&self.algorithm.mutation_types)?;
        if self.objective.metrics().is_empty() {
            return Err(EvoError::config("objective has no metrics"));
        }
        if self.objective.is_multi_objective() != self.algorithm.multi_objective {
            return Err(EvoError::config(
                "objective and algorithm disagree on multi_objective",
            ));
        }
        Ok(())
    }

    fn operator_set(&self) -> OperatorSet {
        let mutations = self
            .algorithm
            .mutation_types
            .iter()
            .map(|&m| Arc::new(m) as Arc<dyn MutationOperator>)
            .chain(self.mutations.iter().cloned())
            .collect();
        let crossovers = self
            .algorithm
            .crossover_types
            .iter()
            .map(|&c| Arc::new(c) as Arc<dyn CrossoverOperator>)
            .chain(self.crossovers.iter().cloned())
            .collect();
        OperatorSet {
            objective: Arc::new(self.objective.clone()),
            cache: Arc::new(EvaluationCache::new()),
            mutations,
            crossovers,
            agent: Arc::clone(&self.agent),
        }
    }

    /// Runs the optimization.
    pub fn optimize(&mut self) -> Result<OptimizationResult> {
        self.optimize_with_cancel(None)
    }

    /// Runs the optimization with an optional cancellation token.
    ///
    /// If `cancel` is `Some` and the flag is set to `true`, the run stops
    /// at the end of the current stage round and returns the best solution
    /// found so far.
    ///
    /// # Errors
    ///
    /// - [`EvoError::Configuration`] for invalid settings
    /// - [`EvoError::EmptyPopulation`] when no initial graph satisfies the
    ///   rules or none can be evaluated
    pub fn optimize_with_cancel(&mut self, cancel: Option<Arc<AtomicBool>>) -> Result<OptimizationResult> {
        self.validate()?;
        let start = Instant::now();
        let mut rng = match self.requirements.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(rand::random()),
        };

        let rules = Arc::new(self.requirements.rules(&self.graph_params.rules));
        let graph_params = GraphGenerationParams {
            rules: Arc::clone(&rules),
            ..self.graph_params.clone()
        };
        let ops = Arc::new(self.operator_set());
        let mode = self.objective.mode();

        // 1. Initial population
        let seeds = self.verified_initial_graphs(&rules);
        let population = self.grow_population(&ops, seeds, &graph_params, &mut rng)?;
        let population = self.evaluate_initial(&ops, population)?;

        let mut params = Parameters::new(
            self.requirements.clone(),
            graph_params,
            self.algorithm.clone(),
            population,
        );

        let capacity = if self.algorithm.multi_objective {
            self.requirements.keep_n_best.max(self.algorithm.max_pop_size)
        } else {
            self.requirements.keep_n_best
        };
        let mut archive = Archive::new(mode, capacity);
        archive.update(&params.population);
        params.best_individuals = archive.members().to_vec();

        let mut fitness_history = Vec::new();
        if let Some(f) = archive.best().and_then(Individual::fitness) {
            fitness_history.push(f.primary());
        }
        if let Some(sink) = self.history.as_mut() {
            sink.on_generation(0, &params.population, archive.members());
        }

        let stages = match &self.stages {
            Some(factory) => factory(&ops, &self.requirements)?,
            None => default_stages(&ops, &self.requirements)?,
        };
        let budget = RunBudget {
            deadline: self.requirements.timeout.map(|t| start + t),
            cancel,
        };

        // 2. Generation loop
        let mut stagnated = false;
        let mut without_improvement = 0usize;
        loop {
            if budget.is_exhausted() {
                break;
            }
            if self
                .requirements
                .num_of_generations
                .is_some_and(|n| params.generation >= n)
            {
                break;
            }
            if self
                .requirements
                .early_stopping_iterations
                .is_some_and(|n| without_improvement >= n)
            {
                stagnated = true;
                break;
            }

            for stage in &stages {
                let (next, report) = stage.run_with_budget(params, &mut rng, &budget)?;
                debug!(
                    stage = stage.name(),
                    rounds = report.rounds,
                    finished = report.finished,
                    dropped = report.dropped,
                    capped = report.capped,
                    "stage complete"
                );
                params = next;
            }

            params.generation += 1;
            params.improved = archive.update(&params.population);
            params.best_individuals = archive.members().to_vec();
            without_improvement = if params.improved { 0 } else { without_improvement + 1 };

            let best = archive.best().and_then(Individual::fitness);
            if let Some(f) = best {
                fitness_history.push(f.primary());
            }
            if let Some(sink) = self.history.as_mut() {
                sink.on_generation(params.generation, &params.population, archive.members());
            }
            info!(
                generation = params.generation,
                best = best.map(|f| f.to_string()).unwrap_or_default(),
                pop_size = params.algorithm.pop_size,
                population = params.population.len(),
                "generation complete"
            );
        }

        let population = sorted_best_first(&params.population, mode);
        Ok(OptimizationResult {
            best: archive.best().cloned(),
            archive: archive.members().to_vec(),
            generations: params.generation,
            stagnated,
            cancelled: budget.is_cancelled(),
            timed_out: budget.is_timed_out(),
            fitness_history,
            evaluations: ops.cache.evaluations(),
            population,
        })
    }

    /// Initial graphs that satisfy the run's rules, deduplicated.
    fn verified_initial_graphs(&self, rules: &Arc<ConstraintRules>) -> Vec<Graph> {
        let mut seen = HashSet::new();
        self.initial_graphs
            .iter()
            .filter_map(|g| match g.clone().with_rules(Arc::clone(rules)) {
                Ok(graph) => Some(graph),
                Err(e) => {
                    warn!(graph = %g.descriptive_id(), error = %e, "initial graph rejected");
                    None
                }
            })
            .filter(|g| seen.insert(g.descriptive_id()))
            .collect()
    }

    /// Pads the seeds to `pop_size` with mutated copies.
    fn grow_population(
        &self,
        ops: &OperatorSet,
        seeds: Vec<Graph>,
        graph_params: &GraphGenerationParams,
        rng: &mut StdRng,
    ) -> Result<Population> {
        if seeds.is_empty() {
            return Err(EvoError::EmptyPopulation);
        }
        let target = self.algorithm.pop_size;
        let mut seen: HashSet<String> = seeds.iter().map(Graph::descriptive_id).collect();
        let mut population: Population = seeds.iter().cloned().map(Individual::new).collect();
        let mut budget = target * self.algorithm.max_operator_attempts;
        while population.len() < target && budget > 0 {
            budget -= 1;
            let Some(base) = seeds.choose(rng) else {
                break;
            };
            let Some((graph, op)) = mutate_graph(ops, base, graph_params, 1, rng) else {
                continue;
            };
            if seen.insert(graph.descriptive_id()) {
                population.push(Individual::offspring(graph, &[], ops.mutations[op].name(), 0));
            }
        }
        if population.len() < target {
            debug!(size = population.len(), target, "initial population below pop_size");
        }
        Ok(population)
    }

    /// Evaluates the initial population, in parallel unless `n_jobs == 1`.
    fn evaluate_initial(&self, ops: &OperatorSet, population: Population) -> Result<Population> {
        let results: Vec<Result<Individual>> = if self.requirements.n_jobs == 1 {
            population.into_iter().map(|ind| evaluator::evaluate(ops, ind)).collect()
        } else {
            population
                .into_par_iter()
                .map(|ind| evaluator::evaluate(ops, ind))
                .collect()
        };
        let evaluated: Population = results
            .into_iter()
            .filter_map(|r| match r {
                Ok(ind) => Some(ind),
                Err(e) => {
                    warn!(error = %e, "initial individual evaluation failed");
                    None
                }
            })
            .collect();
        if evaluated.is_empty() {
            return Err(EvoError::EmptyPopulation);
        }
        Ok(evaluated)
    }
}

/// Runs an optimization and returns the final population, best first.
pub fn optimize(
    objective: Objective,
    initial_graphs: Vec<Graph>,
    requirements: GraphRequirements,
    graph_params: GraphGenerationParams,
    algorithm: AlgorithmParams,
) -> Result<Population> {
    Optimizer::new(objective, initial_graphs, requirements, graph_params, algorithm)
        .optimize()
        .map(|result| result.population)
}
