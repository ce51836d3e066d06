//! Mutation operator selection policies.
//!
//! - [`RandomAgent`]: uniform choice
//! - [`WeightedAgent`]: fixed roulette weights
//! - [`AdaptiveAgent`]: roulette weights adapted from evaluation rewards
//!   (segment-based exponential smoothing)
//!
//! # References
//!
//! - Ropke & Pisinger (2006), "An Adaptive Large Neighborhood Search
//!   Heuristic for the Pickup and Delivery Problem with Time Windows"

use parking_lot::Mutex;
use rand::{Rng, RngCore};

use super::types::OperatorAgent;

/// Uniform operator choice; ignores feedback.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomAgent;

impl OperatorAgent for RandomAgent {
    fn choose(&self, n_operators: usize, rng: &mut dyn RngCore) -> usize {
        rng.random_range(0..n_operators.max(1))
    }
}

/// Roulette choice over fixed weights.
///
/// Operators without a weight (index past the end) weigh `1.0`.
#[derive(Debug, Clone, Default)]
pub struct WeightedAgent {
    weights: Vec<f64>,
}

impl WeightedAgent {
    /// Creates an agent; negative or non-finite weights count as zero.
    pub fn new(weights: impl IntoIterator<Item = f64>) -> Self {
        Self {
            weights: weights
                .into_iter()
                .map(|w| if w.is_finite() { w.max(0.0) } else { 0.0 })
                .collect(),
        }
    }
}

impl OperatorAgent for WeightedAgent {
    fn choose(&self, n_operators: usize, rng: &mut dyn RngCore) -> usize {
        let weights: Vec<f64> = (0..n_operators)
            .map(|i| self.weights.get(i).copied().unwrap_or(1.0))
            .collect();
        roulette_select(&weights, rng)
    }
}

/// Select an operator index using roulette wheel selection on weights.
fn roulette_select(weights: &[f64], rng: &mut dyn RngCore) -> usize {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 || weights.is_empty() {
        return if weights.is_empty() {
            0
        } else {
            rng.random_range(0..weights.len())
        };
    }

    let mut roll = rng.random_range(0.0..total);
    for (i, &w) in weights.iter().enumerate() {
        roll -= w;
        if roll <= 0.0 {
            return i;
        }
    }
    weights.len() - 1
}

#[derive(Debug, Clone)]
struct OperatorStats {
    weight: f64,
    segment_score: f64,
    segment_uses: usize,
}

impl OperatorStats {
    fn new() -> Self {
        Self {
            weight: 1.0,
            segment_score: 0.0,
            segment_uses: 0,
        }
    }

    fn record(&mut self, score: f64) {
        self.segment_score += score;
        self.segment_uses += 1;
    }

    /// w_new = w * (1 - rho) + rho * (pi_j / theta_j), floored at `min_weight`.
    fn update_weight(&mut self, reaction_factor: f64, min_weight: f64) {
        if self.segment_uses > 0 {
            let avg_score = self.segment_score / self.segment_uses as f64;
            self.weight = self.weight * (1.0 - reaction_factor) + avg_score * reaction_factor;
            self.weight = self.weight.max(min_weight);
        }
        self.segment_score = 0.0;
        self.segment_uses = 0;
    }
}

#[derive(Debug)]
struct AdaptiveState {
    stats: Vec<OperatorStats>,
    observed: usize,
}

/// Roulette choice over weights learned from rewards.
///
/// Rewards are accumulated per operator; every `segment_length`
/// observations all weights are smoothed toward the segment's average
/// reward. Weights never drop below `min_weight`, so every operator keeps
/// a chance of being picked.
#[derive(Debug)]
pub struct AdaptiveAgent {
    state: Mutex<AdaptiveState>,
    reaction_factor: f64,
    min_weight: f64,
    segment_length: usize,
}

impl Default for AdaptiveAgent {
    fn default() -> Self {
        Self::new(0.1, 0.05, 20)
    }
}

impl AdaptiveAgent {
    /// Creates an agent.
    ///
    /// `reaction_factor` is clamped to `[0, 1]`, `segment_length` to at least 1.
    pub fn new(reaction_factor: f64, min_weight: f64, segment_length: usize) -> Self {
        Self {
            state: Mutex::new(AdaptiveState {
                stats: Vec::new(),
                observed: 0,
            }),
            reaction_factor: reaction_factor.clamp(0.0, 1.0),
            min_weight: min_weight.max(0.0),
            segment_length: segment_length.max(1),
        }
    }

    /// Current weights, one per operator seen so far.
    pub fn weights(&self) -> Vec<f64> {
        self.state.lock().stats.iter().map(|s| s.weight).collect()
    }

    fn ensure(stats: &mut Vec<OperatorStats>, n: usize) {
        if stats.len() < n {
            stats.resize_with(n, OperatorStats::new);
        }
    }
}

impl OperatorAgent for AdaptiveAgent {
    fn choose(&self, n_operators: usize, rng: &mut dyn RngCore) -> usize {
        let weights: Vec<f64> = {
            let mut state = self.state.lock();
            Self::ensure(&mut state.stats, n_operators);
            state.stats[..n_operators].iter().map(|s| s.weight).collect()
        };
        roulette_select(&weights, rng)
    }

    fn observe(&self, operator: usize, reward: f64) {
        let mut state = self.state.lock();
        Self::ensure(&mut state.stats, operator + 1);
        state.stats[operator].record(reward.clamp(0.0, 1.0));
        state.observed += 1;
        if state.observed % self.segment_length == 0 {
            for stat in &mut state.stats {
                stat.update_weight(self.reaction_factor, self.min_weight);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn counts(agent: &dyn OperatorAgent, n: usize) -> Vec<u32> {
        let mut rng = StdRng::seed_from_u64(11);
        let mut counts = vec![0u32; n];
        for _ in 0..5000 {
            counts[agent.choose(n, &mut rng)] += 1;
        }
        counts
    }

    #[test]
    fn test_random_agent_covers_all() {
        let counts = counts(&RandomAgent, 4);
        assert!(counts.iter().all(|&c| c > 1000), "{counts:?}");
    }

    #[test]
    fn test_weighted_agent_follows_weights() {
        let agent = WeightedAgent::new([0.0, 3.0]);
        let counts = counts(&agent, 3);
        assert_eq!(counts[0], 0);
        // missing weight for index 2 defaults to 1.0
        assert!(counts[1] > counts[2] * 2, "{counts:?}");
    }

    #[test]
    fn test_weighted_agent_all_zero_is_uniform() {
        let agent = WeightedAgent::new([0.0, 0.0]);
        let counts = counts(&agent, 2);
        assert!(counts.iter().all(|&c| c > 2000), "{counts:?}");
    }

    #[test]
    fn test_adaptive_agent_learns() {
        let agent = AdaptiveAgent::new(0.5, 0.05, 10);
        for _ in 0..100 {
            agent.observe(0, 1.0);
            agent.observe(1, 0.0);
        }
        let weights = agent.weights();
        assert!(weights[0] > 0.9);
        assert!((weights[1] - 0.05).abs() < 1e-9);
        let counts = counts(&agent, 2);
        assert!(counts[0] > counts[1] * 5, "{counts:?}");
    }

    #[test]
    fn test_adaptive_agent_waits_for_segment_end() {
        let agent = AdaptiveAgent::new(1.0, 0.0, 4);
        agent.observe(0, 0.0);
        agent.observe(0, 0.0);
        assert_eq!(agent.weights(), vec![1.0]);
        agent.observe(0, 0.0);
        agent.observe(0, 0.0);
        assert_eq!(agent.weights(), vec![0.0]);
    }
}
