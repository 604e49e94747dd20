//! Configuration of an experiment.
use crate::{CatchConfig, CatchEnv};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};
use xrl_candle_agent::LearnerConfig;
use xrl_core::{error::XrlError, TrainerConfig};

fn default_env_timeout_ms() -> u64 {
    5000
}

/// Everything needed to run a training experiment.
///
/// The input and output dimensions of the network in `agent` are overwritten
/// with those of the environment.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ExperimentConfig {
    /// Training loop.
    pub trainer: TrainerConfig,

    /// Agent, tagged by `algorithm`.
    pub agent: LearnerConfig,

    /// Environment.
    #[serde(default)]
    pub env: CatchConfig,

    /// An environment call taking longer than this aborts the run.
    #[serde(default = "default_env_timeout_ms")]
    pub env_timeout_ms: u64,
}

impl ExperimentConfig {
    /// Configuration of the agent with the dimensions of the environment.
    pub fn learner_config(&self) -> LearnerConfig {
        self.agent
            .clone()
            .dims(self.env.height, self.env.width, CatchEnv::N_ACTIONS)
    }

    /// Checks the values.
    pub fn validate(&self) -> Result<()> {
        self.trainer.validate()?;
        self.env.validate()?;
        self.learner_config().validate()?;
        if self.env_timeout_ms == 0 {
            return Err(XrlError::InvalidConfig("env_timeout_ms must be positive".into()).into());
        }
        Ok(())
    }

    /// Constructs [`ExperimentConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("Failed to open config {:?}", path))?;
        let rdr = BufReader::new(file);
        let config = serde_yaml::from_reader(rdr)
            .with_context(|| format!("Failed to parse config {:?}", path))?;
        Ok(config)
    }

    /// Saves [`ExperimentConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    const YAML: &str = r#"
trainer:
  experiment_name: catch_dqn
  checkpoint_dir: checkpoints
  max_episodes: 100
  max_steps_per_episode: 200
  save_every: 10
  checkpoint_retention: 3
agent:
  algorithm: dqn
  model_config:
    net_config:
      net: mlp
      in_dim: 0
      units: [32]
      out_dim: 0
    opt_config:
      Adam:
        lr: 0.001
  batch_size: 16
  gamma: 0.97
  epsilon:
    eps_start: 0.9
    eps_end: 0.05
    eps_decay: 1000.0
  target_sync:
    interval: 5
    unit: Episodes
  replay_min_size: 32
  replay_buffer:
    capacity: 1000
    seed: 0
env:
  width: 4
  height: 5
  rallies: 2
  seed: 1
"#;

    #[test]
    fn test_load_experiment_config() -> Result<()> {
        let dir = TempDir::new("experiment_config")?;
        let path = dir.path().join("catch.yaml");
        std::fs::write(&path, YAML)?;

        let config = ExperimentConfig::load(&path)?;
        assert_eq!(config.env_timeout_ms, 5000);
        assert_eq!(config.trainer.running_reward_alpha, 0.05);
        config.validate()?;

        match config.learner_config() {
            LearnerConfig::Dqn(c) => {
                let net = serde_yaml::to_value(&c.model_config.net_config)?;
                assert_eq!(net["in_dim"].as_u64(), Some(config.env.n_pixels() as u64));
                assert_eq!(net["out_dim"].as_u64(), Some(3));
            }
            _ => panic!("expected dqn"),
        }

        let path2 = dir.path().join("catch2.yaml");
        config.save(&path2)?;
        assert_eq!(ExperimentConfig::load(&path2)?, config);
        Ok(())
    }

    #[test]
    fn test_missing_key_fails() {
        let yaml = YAML.replace("  batch_size: 16\n", "");
        assert!(serde_yaml::from_str::<ExperimentConfig>(&yaml).is_err());
    }
}
