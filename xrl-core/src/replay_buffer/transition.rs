use serde::{Deserialize, Serialize};

/// One interaction `(s_t, a_t, s_t+1, r_t)` with an environment.
///
/// `next_state` is `None` exactly when the step ended the episode in a
/// terminal state. A transition cut by the step cap keeps its next state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Features of the state the action was taken in.
    pub state: Vec<f32>,

    /// Index of the action.
    pub action: usize,

    /// Features of the next state, `None` for terminal transitions.
    pub next_state: Option<Vec<f32>>,

    /// Reward.
    pub reward: f32,
}

impl Transition {
    /// Constructs a transition.
    pub fn new(state: Vec<f32>, action: usize, next_state: Option<Vec<f32>>, reward: f32) -> Self {
        Self {
            state,
            action,
            next_state,
            reward,
        }
    }

    /// Returns `true` if the transition ended an episode.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.next_state.is_none()
    }
}
