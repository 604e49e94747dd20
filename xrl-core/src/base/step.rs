//! Environment step.

/// Outcome of an environment step: `(o_t+1, r_t, done_t)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Step<O> {
    /// Observation after the action.
    pub obs: O,

    /// Reward.
    pub reward: f32,

    /// `true` if the episode reached a terminal state.
    pub is_done: bool,
}

impl<O> Step<O> {
    /// Constructs a [`Step`] object.
    pub fn new(obs: O, reward: f32, is_done: bool) -> Self {
        Self {
            obs,
            reward,
            is_done,
        }
    }
}
