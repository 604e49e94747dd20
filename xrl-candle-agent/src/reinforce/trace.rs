use anyhow::{anyhow, Result};
use candle_core::Tensor;

/// Log-probabilities of the actions taken in an episode and their rewards.
///
/// The trace is filled step by step and consumed as a whole at the end of
/// the episode.
#[derive(Default)]
pub struct EpisodeTrace {
    log_probs: Vec<Tensor>,
    rewards: Vec<f32>,
}

impl EpisodeTrace {
    /// Appends the log-probability of the sampled action.
    pub fn push_log_prob(&mut self, log_prob: Tensor) {
        self.log_probs.push(log_prob);
    }

    /// Appends the reward of the last action.
    pub fn push_reward(&mut self, reward: f32) {
        self.rewards.push(reward);
    }

    /// Number of rewarded steps.
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    /// Returns `true` if no step has been rewarded.
    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// Splits the trace into log-probabilities and rewards of equal length.
    pub fn into_parts(self) -> Result<(Vec<Tensor>, Vec<f32>)> {
        if self.log_probs.len() != self.rewards.len() {
            return Err(anyhow!(
                "Episode trace has {} log-probabilities and {} rewards",
                self.log_probs.len(),
                self.rewards.len()
            ));
        }
        Ok((self.log_probs, self.rewards))
    }
}
