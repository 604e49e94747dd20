//! Configuration of [`Trainer`](super::Trainer).
use super::WinRule;
use crate::error::XrlError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::{Path, PathBuf},
};

fn default_flush_interval() -> u64 {
    1
}

fn default_running_reward_alpha() -> f32 {
    0.05
}

/// Configuration of [`Trainer`](super::Trainer).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct TrainerConfig {
    /// Name of the experiment, used as the directory of its checkpoints.
    pub experiment_name: String,

    /// Root directory of checkpoints.
    pub checkpoint_dir: PathBuf,

    /// Training stops when this number of episodes is reached.
    pub max_episodes: u64,

    /// Episodes are truncated after this number of steps.
    pub max_steps_per_episode: usize,

    /// Interval of saving checkpoints in episodes.
    pub save_every: u64,

    /// The maximum number of checkpoints kept on disk. `0` keeps all.
    pub checkpoint_retention: usize,

    /// Interval of flushing records in episodes.
    #[serde(default = "default_flush_interval")]
    pub flush_interval: u64,

    /// How episodes are counted as wins or losses.
    #[serde(default)]
    pub win_rule: WinRule,

    /// Smoothing factor of the running reward.
    #[serde(default = "default_running_reward_alpha")]
    pub running_reward_alpha: f32,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            experiment_name: "default".to_string(),
            checkpoint_dir: PathBuf::from("checkpoints"),
            max_episodes: 1000,
            max_steps_per_episode: 10_000,
            save_every: 100,
            checkpoint_retention: 5,
            flush_interval: default_flush_interval(),
            win_rule: WinRule::default(),
            running_reward_alpha: default_running_reward_alpha(),
        }
    }
}

impl TrainerConfig {
    /// Sets the name of the experiment.
    pub fn experiment_name(mut self, v: impl Into<String>) -> Self {
        self.experiment_name = v.into();
        self
    }

    /// Sets the root directory of checkpoints.
    pub fn checkpoint_dir(mut self, v: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = v.into();
        self
    }

    /// Sets the number of episodes.
    pub fn max_episodes(mut self, v: u64) -> Self {
        self.max_episodes = v;
        self
    }

    /// Sets the step cap of an episode.
    pub fn max_steps_per_episode(mut self, v: usize) -> Self {
        self.max_steps_per_episode = v;
        self
    }

    /// Sets the interval of saving checkpoints in episodes.
    pub fn save_every(mut self, v: u64) -> Self {
        self.save_every = v;
        self
    }

    /// Sets the number of checkpoints kept on disk.
    pub fn checkpoint_retention(mut self, v: usize) -> Self {
        self.checkpoint_retention = v;
        self
    }

    /// Sets the interval of flushing records in episodes.
    pub fn flush_interval(mut self, v: u64) -> Self {
        self.flush_interval = v;
        self
    }

    /// Sets the win rule.
    pub fn win_rule(mut self, v: WinRule) -> Self {
        self.win_rule = v;
        self
    }

    /// Sets the smoothing factor of the running reward.
    pub fn running_reward_alpha(mut self, v: f32) -> Self {
        self.running_reward_alpha = v;
        self
    }

    /// Checks the values.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> { Err(XrlError::InvalidConfig(msg).into()) };

        if self.experiment_name.is_empty()
            || self.experiment_name.starts_with('.')
            || self.experiment_name.contains(['/', '\\'])
        {
            return invalid(format!(
                "experiment_name must be a plain directory name: {:?}",
                self.experiment_name
            ));
        }
        if self.max_steps_per_episode == 0 {
            return invalid("max_steps_per_episode must be positive".into());
        }
        if self.save_every == 0 {
            return invalid("save_every must be positive".into());
        }
        if self.flush_interval == 0 {
            return invalid("flush_interval must be positive".into());
        }
        if !(self.running_reward_alpha > 0.0 && self.running_reward_alpha <= 1.0) {
            return invalid(format!(
                "running_reward_alpha must be in (0, 1]: {}",
                self.running_reward_alpha
            ));
        }
        Ok(())
    }

    /// Constructs [`TrainerConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`TrainerConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
