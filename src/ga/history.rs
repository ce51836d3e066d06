//! Per-generation observation hooks.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::population::Individual;

/// Receives the population and archive after every generation.
///
/// The initial population is reported as generation 0.
pub trait HistorySink: Send {
    /// Called once per completed generation.
    fn on_generation(&mut self, generation: usize, population: &[Individual], archive: &[Individual]);
}

/// One recorded generation.
#[derive(Debug, Clone)]
pub struct GenerationSnapshot {
    /// Generation index.
    pub generation: usize,
    /// Population after the generation.
    pub population: Vec<Individual>,
    /// Archive members after the generation.
    pub archive: Vec<Individual>,
}

/// Keeps every generation in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistory {
    /// Snapshots in generation order.
    pub snapshots: Vec<GenerationSnapshot>,
}

impl MemoryHistory {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded generations.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// `true` when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

impl HistorySink for MemoryHistory {
    fn on_generation(&mut self, generation: usize, population: &[Individual], archive: &[Individual]) {
        self.snapshots.push(GenerationSnapshot {
            generation,
            population: population.to_vec(),
            archive: archive.to_vec(),
        });
    }
}

/// Lets the caller keep a handle on a sink owned by the optimizer.
impl<T: HistorySink> HistorySink for Arc<Mutex<T>> {
    fn on_generation(&mut self, generation: usize, population: &[Individual], archive: &[Individual]) {
        self.lock().on_generation(generation, population, archive);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ConstraintRules, Graph, NodeContent};

    #[test]
    fn test_shared_history() {
        let shared = Arc::new(Mutex::new(MemoryHistory::new()));
        let mut sink: Box<dyn HistorySink> = Box::new(Arc::clone(&shared));
        let graph = Graph::chain([NodeContent::new("a")], Arc::new(ConstraintRules::dag())).unwrap();
        let pop = vec![Individual::new(graph)];
        sink.on_generation(0, &pop, &[]);
        sink.on_generation(1, &pop, &pop);
        let history = shared.lock();
        assert_eq!(history.len(), 2);
        assert_eq!(history.snapshots[1].generation, 1);
        assert_eq!(history.snapshots[1].archive.len(), 1);
    }
}
