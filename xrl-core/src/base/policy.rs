//! Policy.
use crate::TrainingState;
use anyhow::Result;

/// A policy on an environment with a discrete action space.
///
/// Policy is a mapping from a feature vector to an action.
/// The mapping can be either of deterministic or stochastic.
pub trait Policy {
    /// Sample an action given the features of the current observation.
    ///
    /// `state` provides the global step, which drives exploration schedules.
    fn sample(&mut self, features: &[f32], state: &TrainingState) -> Result<usize>;
}
