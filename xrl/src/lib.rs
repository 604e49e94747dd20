//! Reinforcement learning on Atari-style games.
//!
//! The workspace consists of the following crates:
//!
//! * `xrl-core` provides the traits of environments and agents, the replay
//!   buffer, the exploration schedule, records, checkpoints and the training
//!   loop.
//! * `xrl-candle-agent` implements DQN and REINFORCE agents with
//!   [candle](https://crates.io/crates/candle-core).
//! * `xrl-tensorboard` writes records as TensorBoard event files.
//! * `xrl` (this crate) puts them together: [`ExperimentConfig`] describes a
//!   run, [`Experiment`] builds and runs it on [`CatchEnv`], and the `xrl`
//!   binary drives it from the command line.
mod catch;
mod config;
pub use catch::{CatchConfig, CatchEnv, Frame, FrameExtractor};
pub use config::ExperimentConfig;

use anyhow::Result;
use std::time::Duration;
use xrl_candle_agent::Learner;
use xrl_core::{record::AggregateRecorder, Trainer, TrainingState, WatchdogEnv};

/// A trainer and an agent built from an [`ExperimentConfig`].
pub struct Experiment {
    /// Training loop on the environment.
    pub trainer: Trainer<WatchdogEnv<Frame>, FrameExtractor>,

    /// The agent.
    pub learner: Learner,
}

impl Experiment {
    /// Builds the environment, the trainer and the agent.
    pub fn build(config: &ExperimentConfig) -> Result<Self> {
        config.validate()?;
        let env = WatchdogEnv::new(
            CatchEnv::build(&config.env)?,
            Duration::from_millis(config.env_timeout_ms),
        );
        let trainer = Trainer::build(config.trainer.clone(), env, FrameExtractor)?;
        let learner = Learner::build(config.learner_config())?;
        Ok(Self { trainer, learner })
    }

    /// Resumes from the latest checkpoint, if any, and trains.
    pub fn run(&mut self, recorder: &mut dyn AggregateRecorder) -> Result<TrainingState> {
        self.trainer.resume(&mut self.learner)?;
        self.trainer.train(&mut self.learner, recorder)
    }
}
