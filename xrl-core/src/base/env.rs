//! Environment.
use super::Step;
use anyhow::Result;

/// Represents an environment, typically an MDP with a discrete action space.
///
/// Implementations wrap an external simulator. Both [`Env::reset`] and
/// [`Env::step`] are expected to return promptly; an environment that can
/// block should be wrapped with [`WatchdogEnv`](crate::WatchdogEnv).
pub trait Env {
    /// Observation of the environment.
    type Obs;

    /// Starts a new episode and returns the initial observation.
    fn reset(&mut self) -> Result<Self::Obs>;

    /// Applies action `a`, which must be in `0..self.action_space_size()`.
    fn step(&mut self, a: usize) -> Result<Step<Self::Obs>>;

    /// The number of discrete actions.
    fn action_space_size(&self) -> usize;
}
