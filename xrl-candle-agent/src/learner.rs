//! Agent selected from a configuration.
use crate::{
    dqn::{Dqn, DqnConfig},
    net::{Net, NetConfig},
    reinforce::{Reinforce, ReinforceConfig},
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use xrl_core::{
    record::Record, replay_buffer::Transition, Agent, EpisodeEnd, Policy, TrainingState,
};

/// Configuration of a [`Learner`].
///
/// In YAML, the `algorithm` key selects the variant and the other keys are
/// those of the agent configuration. The `net` key of `net_config` selects
/// the network:
///
/// ```yaml
/// algorithm: reinforce
/// model_config:
///   net_config:
///     net: cnn
///     height: 0
///     width: 0
///     conv:
///       - {out_channels: 32, kernel: 3, stride: 1}
///     units: [64, 32]
///     out_dim: 0
///   opt_config:
///     Adam:
///       lr: 0.0001
/// gamma: 0.99
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum LearnerConfig {
    /// Deep Q-network.
    Dqn(DqnConfig<NetConfig>),

    /// Monte-Carlo policy gradient.
    Reinforce(ReinforceConfig<NetConfig>),
}

impl LearnerConfig {
    /// Adapts the network to `height x width` frames and `n_actions` actions.
    pub fn dims(self, height: usize, width: usize, n_actions: usize) -> Self {
        match self {
            Self::Dqn(mut config) => {
                config.model_config = config.model_config.out_dim(n_actions);
                config.model_config.net_config = config.model_config.net_config.frame(height, width);
                Self::Dqn(config)
            }
            Self::Reinforce(mut config) => {
                config.model_config = config.model_config.out_dim(n_actions);
                config.model_config.net_config = config.model_config.net_config.frame(height, width);
                Self::Reinforce(config)
            }
        }
    }

    /// Checks the values.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Dqn(config) => {
                config.validate()?;
                config.model_config.net_config.validate()
            }
            Self::Reinforce(config) => {
                config.validate()?;
                config.model_config.net_config.validate()
            }
        }
    }
}

/// One of the agents of this crate.
pub enum Learner {
    /// Deep Q-network.
    Dqn(Dqn<Net>),

    /// Monte-Carlo policy gradient.
    Reinforce(Reinforce<Net>),
}

impl Learner {
    /// Builds the agent described by `config`.
    pub fn build(config: LearnerConfig) -> Result<Self> {
        Ok(match config {
            LearnerConfig::Dqn(config) => Self::Dqn(Dqn::build(config)?),
            LearnerConfig::Reinforce(config) => Self::Reinforce(Reinforce::build(config)?),
        })
    }

    fn agent(&self) -> &dyn Agent {
        match self {
            Self::Dqn(agent) => agent,
            Self::Reinforce(agent) => agent,
        }
    }

    fn agent_mut(&mut self) -> &mut dyn Agent {
        match self {
            Self::Dqn(agent) => agent,
            Self::Reinforce(agent) => agent,
        }
    }
}

impl Policy for Learner {
    fn sample(&mut self, features: &[f32], state: &TrainingState) -> Result<usize> {
        self.agent_mut().sample(features, state)
    }
}

impl Agent for Learner {
    fn train(&mut self) {
        self.agent_mut().train()
    }

    fn eval(&mut self) {
        self.agent_mut().eval()
    }

    fn is_train(&self) -> bool {
        self.agent().is_train()
    }

    fn algorithm(&self) -> &'static str {
        self.agent().algorithm()
    }

    fn observe(&mut self, transition: Transition, state: &TrainingState) -> Result<Record> {
        self.agent_mut().observe(transition, state)
    }

    fn end_episode(&mut self, end: &EpisodeEnd, state: &TrainingState) -> Result<Record> {
        self.agent_mut().end_episode(end, state)
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        self.agent().save_params(path)
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.agent_mut().load_params(path)
    }
}
