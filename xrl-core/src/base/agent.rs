//! Agent.
use super::Policy;
use crate::{record::Record, replay_buffer::Transition, TrainingState};
use anyhow::Result;
use std::path::Path;

/// Summary of a finished episode, given to [`Agent::end_episode`].
#[derive(Clone, Debug, PartialEq)]
pub struct EpisodeEnd {
    /// Number of environment steps in the episode.
    pub steps: usize,

    /// Sum of the rewards of the episode.
    pub reward: f32,

    /// `true` if the episode was cut at the step cap without reaching a terminal state.
    pub truncated: bool,
}

/// Represents a trainable policy.
///
/// The training loop calls [`Agent::observe`] after every environment step and
/// [`Agent::end_episode`] once per episode. What happens in these hooks depends
/// on the algorithm: a value-based agent stores the transition and takes an
/// optimization step, a policy-gradient agent accumulates the episode and
/// learns at its end.
pub trait Agent: Policy {
    /// Set the policy to training mode.
    fn train(&mut self);

    /// Set the policy to evaluation mode.
    fn eval(&mut self);

    /// Return if it is in training mode.
    fn is_train(&self) -> bool;

    /// Tag of the algorithm, stored in checkpoints to prevent restoring
    /// parameters into an agent of another kind.
    fn algorithm(&self) -> &'static str;

    /// Consumes a transition and optionally performs an optimization step.
    ///
    /// The returned record holds values to be sent to the metrics sink. It is
    /// empty when there is nothing to report.
    fn observe(&mut self, transition: Transition, state: &TrainingState) -> Result<Record>;

    /// Called at the end of an episode, before `state.episode_index` is advanced.
    fn end_episode(&mut self, end: &EpisodeEnd, state: &TrainingState) -> Result<Record>;

    /// Save all the mutable state of the agent in the given directory.
    ///
    /// This includes model parameters, optimizer state and, if the agent
    /// owns one, the replay buffer. The directory exists when this method is
    /// called.
    fn save_params(&self, path: &Path) -> Result<()>;

    /// Load the state written by [`Agent::save_params`] from the given directory.
    fn load_params(&mut self, path: &Path) -> Result<()>;
}
