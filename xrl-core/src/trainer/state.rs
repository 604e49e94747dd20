//! Counters and statistics carried across episodes.
use serde::{Deserialize, Serialize};

/// How an episode is classified as won or lost.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Default)]
pub enum WinRule {
    /// An episode is won if it has at least as many positive rewards as
    /// negative ones.
    #[default]
    RewardCount,

    /// Episodes are not classified.
    Disabled,
}

impl WinRule {
    /// Returns `Some(true)` for a win, `Some(false)` for a loss and `None`
    /// if the rule is disabled.
    pub fn judge(&self, pos_reward_count: usize, neg_reward_count: usize) -> Option<bool> {
        match self {
            Self::RewardCount => Some(pos_reward_count >= neg_reward_count),
            Self::Disabled => None,
        }
    }
}

/// Progress of a training run.
///
/// This is the part of the training state that does not belong to the agent.
/// It is stored in checkpoints and restored exactly on resume.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct TrainingState {
    /// Number of environment steps taken since the start of the run.
    pub global_step: u64,

    /// Number of finished episodes.
    pub episode_index: u64,

    /// Number of won episodes.
    pub wins: u64,

    /// Number of lost episodes.
    pub losses: u64,

    /// Exponential moving average of the episode reward.
    pub running_reward: Option<f32>,
}

impl TrainingState {
    /// Updates the statistics with a finished episode and advances
    /// `episode_index`.
    pub fn finish_episode(
        &mut self,
        reward: f32,
        pos_reward_count: usize,
        neg_reward_count: usize,
        win_rule: WinRule,
        alpha: f32,
    ) {
        match win_rule.judge(pos_reward_count, neg_reward_count) {
            Some(true) => self.wins += 1,
            Some(false) => self.losses += 1,
            None => {}
        }
        self.running_reward = Some(match self.running_reward {
            Some(r) => (1.0 - alpha) * r + alpha * reward,
            None => reward,
        });
        self.episode_index += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_win_rule() {
        assert_eq!(WinRule::RewardCount.judge(2, 2), Some(true));
        assert_eq!(WinRule::RewardCount.judge(0, 1), Some(false));
        assert_eq!(WinRule::Disabled.judge(5, 0), None);
    }

    #[test]
    fn test_finish_episode() {
        let mut state = TrainingState::default();
        state.finish_episode(10.0, 3, 1, WinRule::RewardCount, 0.1);
        assert_eq!(state.running_reward, Some(10.0));
        assert_eq!((state.wins, state.losses, state.episode_index), (1, 0, 1));

        state.finish_episode(0.0, 0, 2, WinRule::RewardCount, 0.1);
        assert!((state.running_reward.unwrap() - 9.0).abs() < 1e-6);
        assert_eq!((state.wins, state.losses, state.episode_index), (1, 1, 2));

        state.finish_episode(0.0, 0, 2, WinRule::Disabled, 0.1);
        assert_eq!((state.wins, state.losses, state.episode_index), (1, 1, 3));
    }
}
