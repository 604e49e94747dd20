//! Configuration of REINFORCE agent.
use crate::{model::ModelConfig, Device};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};
use xrl_core::error::XrlError;

fn default_seed() -> u64 {
    42
}

/// Configuration of [`Reinforce`](super::Reinforce).
///
/// `C` is the configuration of the policy network, which outputs one logit
/// per action.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ReinforceConfig<C> {
    /// Configuration of the policy network and its optimizer.
    pub model_config: ModelConfig<C>,

    /// Discount factor.
    pub gamma: f32,

    /// Replaces the last reward of an episode cut at the step cap.
    #[serde(default)]
    pub truncation_penalty: Option<f32>,

    /// Seed of the random number generator used for sampling actions.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Device used for the model.
    #[serde(default)]
    pub device: Device,
}

impl<C> ReinforceConfig<C> {
    /// Creates a configuration with the defaults of the other parameters.
    pub fn new(model_config: ModelConfig<C>) -> Self {
        Self {
            model_config,
            gamma: 0.99,
            truncation_penalty: None,
            seed: default_seed(),
            device: Device::Cpu,
        }
    }

    /// Discount factor.
    pub fn gamma(mut self, v: f32) -> Self {
        self.gamma = v;
        self
    }

    /// Penalty for truncated episodes.
    pub fn truncation_penalty(mut self, v: Option<f32>) -> Self {
        self.truncation_penalty = v;
        self
    }

    /// Random seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Device.
    pub fn device(mut self, v: Device) -> Self {
        self.device = v;
        self
    }

    /// Checks the values.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(
                XrlError::InvalidConfig(format!("gamma must be in [0, 1]: {}", self.gamma)).into(),
            );
        }
        if !(self.model_config.opt_config.get_learning_rate() > 0.0) {
            return Err(XrlError::InvalidConfig("learning rate must be positive".into()).into());
        }
        if let Some(p) = self.truncation_penalty {
            if !p.is_finite() {
                return Err(XrlError::InvalidConfig(format!(
                    "truncation_penalty must be finite: {}",
                    p
                ))
                .into());
            }
        }
        Ok(())
    }
}

impl<C> ReinforceConfig<C>
where
    C: Serialize + for<'de> Deserialize<'de>,
{
    /// Constructs [`ReinforceConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`ReinforceConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
