//! Configuration of DQN agent.
use crate::{model::ModelConfig, Device};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};
use xrl_core::{error::XrlError, replay_buffer::ReplayBufferConfig, EpsilonSchedule};

/// Unit of the target network synchronization interval.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
pub enum SyncUnit {
    /// Finished episodes.
    Episodes,

    /// Environment steps.
    Steps,
}

/// When the target network is overwritten with the parameters of the
/// Q-network.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
pub struct TargetSync {
    /// Number of units between two synchronizations.
    pub interval: u64,

    /// Unit of `interval`.
    pub unit: SyncUnit,
}

impl TargetSync {
    /// Synchronizes every `interval` episodes.
    pub fn episodes(interval: u64) -> Self {
        Self {
            interval,
            unit: SyncUnit::Episodes,
        }
    }

    /// Synchronizes every `interval` environment steps.
    pub fn steps(interval: u64) -> Self {
        Self {
            interval,
            unit: SyncUnit::Steps,
        }
    }

    /// Returns `true` if a synchronization is due at count `n` of `unit`.
    pub fn is_due(&self, unit: SyncUnit, n: u64) -> bool {
        self.unit == unit && n % self.interval == 0
    }
}

fn default_eps_log_interval() -> u64 {
    100
}

fn default_seed() -> u64 {
    42
}

/// Configuration of [`Dqn`](super::Dqn).
///
/// `C` is the configuration of the Q-network.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct DqnConfig<C> {
    /// Configuration of the Q-network and its optimizer.
    pub model_config: ModelConfig<C>,

    /// Batch size for training.
    pub batch_size: usize,

    /// Discount factor.
    pub gamma: f32,

    /// Exploration schedule.
    pub epsilon: EpsilonSchedule,

    /// Synchronization of the target network.
    pub target_sync: TargetSync,

    /// Optimization starts when the replay buffer holds more transitions than this.
    pub replay_min_size: usize,

    /// Configuration of the replay buffer.
    pub replay_buffer: ReplayBufferConfig,

    /// Interval of recording epsilon in environment steps.
    #[serde(default = "default_eps_log_interval")]
    pub eps_log_interval: u64,

    /// Seed of the random number generator used for exploration.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Device used for the models.
    #[serde(default)]
    pub device: Device,
}

impl<C> DqnConfig<C> {
    /// Creates a configuration with the defaults of the other parameters.
    pub fn new(model_config: ModelConfig<C>) -> Self {
        Self {
            model_config,
            batch_size: 128,
            gamma: 0.97,
            epsilon: EpsilonSchedule::default(),
            target_sync: TargetSync::episodes(50),
            replay_min_size: 5000,
            replay_buffer: ReplayBufferConfig::default(),
            eps_log_interval: default_eps_log_interval(),
            seed: default_seed(),
            device: Device::Cpu,
        }
    }

    /// Batch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Discount factor.
    pub fn gamma(mut self, v: f32) -> Self {
        self.gamma = v;
        self
    }

    /// Exploration schedule.
    pub fn epsilon(mut self, v: EpsilonSchedule) -> Self {
        self.epsilon = v;
        self
    }

    /// Synchronization of the target network.
    pub fn target_sync(mut self, v: TargetSync) -> Self {
        self.target_sync = v;
        self
    }

    /// Warm-up size of the replay buffer.
    pub fn replay_min_size(mut self, v: usize) -> Self {
        self.replay_min_size = v;
        self
    }

    /// Configuration of the replay buffer.
    pub fn replay_buffer(mut self, v: ReplayBufferConfig) -> Self {
        self.replay_buffer = v;
        self
    }

    /// Interval of recording epsilon.
    pub fn eps_log_interval(mut self, v: u64) -> Self {
        self.eps_log_interval = v;
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
        let invalid = |msg: String| -> Result<()> { Err(XrlError::InvalidConfig(msg).into()) };

        if self.batch_size == 0 {
            return invalid("batch_size must be positive".into());
        }
        if self.batch_size > self.replay_buffer.capacity {
            return invalid(format!(
                "batch_size ({}) exceeds the replay buffer capacity ({})",
                self.batch_size, self.replay_buffer.capacity
            ));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return invalid(format!("gamma must be in [0, 1]: {}", self.gamma));
        }
        if self.target_sync.interval == 0 {
            return invalid("target_sync.interval must be positive".into());
        }
        if self.eps_log_interval == 0 {
            return invalid("eps_log_interval must be positive".into());
        }
        if !(self.model_config.opt_config.get_learning_rate() > 0.0) {
            return invalid("learning rate must be positive".into());
        }
        self.epsilon.validate()
    }
}

impl<C> DqnConfig<C>
where
    C: Serialize + for<'de> Deserialize<'de>,
{
    /// Constructs [`DqnConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`DqnConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mlp::MlpConfig, opt::OptimizerConfig};
    use tempdir::TempDir;

    fn config() -> DqnConfig<MlpConfig> {
        DqnConfig::new(ModelConfig::new(
            MlpConfig::new(4, vec![16], 2, false),
            OptimizerConfig::Adam { lr: 1e-3 },
        ))
        .batch_size(8)
        .replay_buffer(ReplayBufferConfig::default().capacity(100))
    }

    #[test]
    fn test_serde_dqn_config() -> Result<()> {
        let config = config().target_sync(TargetSync::steps(500));
        let dir = TempDir::new("dqn_config")?;
        let path = dir.path().join("dqn_config.yaml");
        config.save(&path)?;
        assert_eq!(DqnConfig::<MlpConfig>::load(&path)?, config);
        Ok(())
    }

    #[test]
    fn test_validate() {
        assert!(config().validate().is_ok());
        assert!(config().batch_size(0).validate().is_err());
        assert!(config().batch_size(101).validate().is_err());
        assert!(config().gamma(1.5).validate().is_err());
        assert!(config().target_sync(TargetSync::episodes(0)).validate().is_err());
    }

    #[test]
    fn test_target_sync_is_due() {
        let sync = TargetSync::episodes(10);
        assert!(sync.is_due(SyncUnit::Episodes, 0));
        assert!(sync.is_due(SyncUnit::Episodes, 20));
        assert!(!sync.is_due(SyncUnit::Episodes, 15));
        assert!(!sync.is_due(SyncUnit::Steps, 20));
    }
}
