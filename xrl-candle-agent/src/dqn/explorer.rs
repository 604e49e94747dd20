//! Exploration strategy of DQN.
use rand::Rng;
use serde::{Deserialize, Serialize};
use xrl_core::EpsilonSchedule;

/// Index of the largest value; ties go to the first index.
///
/// NaN values are never selected unless all values are NaN.
pub fn argmax(xs: &[f32]) -> usize {
    let mut best = 0;
    for (i, &x) in xs.iter().enumerate().skip(1) {
        if x > xs[best] || (xs[best].is_nan() && !x.is_nan()) {
            best = i;
        }
    }
    best
}

/// Epsilon-greedy explorer for DQN.
///
/// The exploration probability follows an [`EpsilonSchedule`] of the global
/// step.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Default)]
pub struct EpsilonGreedy {
    schedule: EpsilonSchedule,
}

impl EpsilonGreedy {
    /// Constructs epsilon-greedy explorer.
    pub fn new(schedule: EpsilonSchedule) -> Self {
        Self { schedule }
    }

    /// Exploration probability at the given step.
    pub fn epsilon(&self, step: u64) -> f64 {
        self.schedule.epsilon(step)
    }

    /// Takes an action based on action values `q`.
    ///
    /// Draws `u` from `[0, 1)`. If `u > epsilon(step)` the greedy action is
    /// returned, otherwise an action uniformly at random.
    pub fn action(&self, q: &[f32], step: u64, rng: &mut impl Rng) -> usize {
        let u: f64 = rng.gen();
        if u > self.epsilon(step) {
            argmax(q)
        } else {
            rng.gen_range(0..q.len())
        }
    }
}
