//! Train [`Agent`].
mod config;
mod state;
mod stop;
use crate::{
    checkpoint::{CheckpointManager, CheckpointTag},
    error::XrlError,
    record::{AggregateRecorder, Record, RecordValue::Scalar},
    replay_buffer::Transition,
    Agent, EpisodeEnd, Env, FeatureExtractor,
};
use anyhow::Result;
pub use config::TrainerConfig;
use log::{debug, info, trace};
pub use state::{TrainingState, WinRule};
pub use stop::StopSignal;

struct EpisodeStats {
    end: EpisodeEnd,
    pos_reward_count: usize,
    neg_reward_count: usize,
}

/// Converts a timeout of the environment into an error with the position in
/// the run.
fn env_error(err: anyhow::Error, state: &TrainingState) -> anyhow::Error {
    match err.downcast_ref::<XrlError>() {
        Some(XrlError::EnvironmentTimeout(timeout_ms)) => XrlError::EnvironmentUnresponsive {
            episode: state.episode_index,
            step: state.global_step,
            timeout_ms: *timeout_ms,
        }
        .into(),
        _ => err,
    }
}

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Manages the training loop.
///
/// # Training loop
///
/// 0. Given an agent implementing [`Agent`] and a recorder implementing
///    [`AggregateRecorder`].
/// 1. Reset [`Env`] and extract the features of the initial observation.
/// 2. If the episode has reached `max_steps_per_episode`, it is truncated;
///    go to step 6.
/// 3. `global_step += 1`; sample an action and apply it to the environment.
/// 4. Build a [`Transition`], with no next state if the step was terminal,
///    and give it to [`Agent::observe`]. The agent may take an optimization
///    step here.
/// 5. Back to step 2 unless the episode is done.
/// 6. Call [`Agent::end_episode`], update wins, losses and the running
///    reward, then `episode_index += 1`.
/// 7. Flush records every `flush_interval` episodes and save a checkpoint
///    every `save_every` episodes.
/// 8. If the [`StopSignal`] is raised, save a checkpoint if none was saved
///    for this episode and return.
/// 9. Back to step 1 until `episode_index == max_episodes`.
///
/// # Interaction of objects
///
/// ```mermaid
/// graph LR
///     A[Agent]-->|action|B[Env]
///     B -->|Obs|C[FeatureExtractor]
///     C -->|features|A
///     B -->|reward, done|D[Transition]
///     D -->|Agent::observe|A
///     A -->|Agent::save_params|E[CheckpointManager]
/// ```
///
/// Environment errors are fatal. A timeout reported by
/// [`WatchdogEnv`](crate::WatchdogEnv) is returned as
/// [`XrlError::EnvironmentUnresponsive`].
pub struct Trainer<E, F>
where
    E: Env,
    F: FeatureExtractor<E::Obs>,
{
    config: TrainerConfig,
    env: E,
    extractor: F,
    checkpoints: CheckpointManager,
    stop: StopSignal,
    state: TrainingState,
}

impl<E, F> Trainer<E, F>
where
    E: Env,
    F: FeatureExtractor<E::Obs>,
{
    /// Constructs a trainer.
    pub fn build(config: TrainerConfig, env: E, extractor: F) -> Result<Self> {
        config.validate()?;
        let checkpoints = CheckpointManager::new(
            &config.checkpoint_dir,
            config.experiment_name.clone(),
            config.checkpoint_retention,
        );
        Ok(Self {
            config,
            env,
            extractor,
            checkpoints,
            stop: StopSignal::new(),
            state: TrainingState::default(),
        })
    }

    /// A handle to stop the training loop at the next episode boundary.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// The state of the run.
    pub fn state(&self) -> &TrainingState {
        &self.state
    }

    /// The checkpoints of the experiment.
    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    /// Restores the agent and the state of the run from the latest checkpoint.
    ///
    /// Starts a fresh run if no checkpoint exists. A corrupt checkpoint is an
    /// error.
    pub fn resume<A: Agent + ?Sized>(&mut self, agent: &mut A) -> Result<&TrainingState> {
        match self.checkpoints.load(CheckpointTag::Latest, agent) {
            Ok(state) => {
                info!(
                    "Resuming at episode {}, global step {}",
                    state.episode_index, state.global_step
                );
                self.state = state;
            }
            Err(e) => match e.downcast_ref::<XrlError>() {
                Some(XrlError::CheckpointNotFound(_)) => {
                    info!("No checkpoint found, starting a new run");
                    self.state = TrainingState::default();
                }
                _ => return Err(e),
            },
        }
        Ok(&self.state)
    }

    /// Runs the training loop until `max_episodes` or the stop signal.
    pub fn train<A: Agent + ?Sized>(
        &mut self,
        agent: &mut A,
        recorder: &mut dyn AggregateRecorder,
    ) -> Result<TrainingState> {
        if self.state.episode_index >= self.config.max_episodes {
            info!(
                "Nothing to do: {} of {} episodes done",
                self.state.episode_index, self.config.max_episodes
            );
            return Ok(self.state.clone());
        }
        agent.train();

        loop {
            let stats = self.run_episode(agent, recorder)?;
            self.end_episode(agent, recorder, stats)?;

            let saved = self.state.episode_index % self.config.save_every == 0;
            if saved {
                self.checkpoints.save(&self.state, agent)?;
            }

            if self.stop.is_raised() {
                info!("Stop requested at episode {}", self.state.episode_index);
                recorder.flush(self.state.global_step as i64);
                if !saved {
                    self.checkpoints.save(&self.state, agent)?;
                }
                break;
            }

            if self.state.episode_index >= self.config.max_episodes {
                recorder.flush(self.state.global_step as i64);
                if !saved {
                    self.checkpoints.save(&self.state, agent)?;
                }
                break;
            }
        }

        info!(
            "Training finished: episode {}, global step {}",
            self.state.episode_index, self.state.global_step
        );
        Ok(self.state.clone())
    }

    /// Runs one episode, giving every transition to the agent.
    fn run_episode<A: Agent + ?Sized>(
        &mut self,
        agent: &mut A,
        recorder: &mut dyn AggregateRecorder,
    ) -> Result<EpisodeStats> {
        let obs = self.env.reset().map_err(|e| env_error(e, &self.state))?;
        let mut features = self.extractor.extract(&obs)?;
        let mut stats = EpisodeStats {
            end: EpisodeEnd {
                steps: 0,
                reward: 0.0,
                truncated: false,
            },
            pos_reward_count: 0,
            neg_reward_count: 0,
        };

        loop {
            if stats.end.steps >= self.config.max_steps_per_episode {
                stats.end.truncated = true;
                break;
            }

            self.state.global_step += 1;
            let act = agent.sample(&features, &self.state)?;
            let step = self.env.step(act).map_err(|e| env_error(e, &self.state))?;
            trace!(
                "step {}: action {}, reward {}",
                self.state.global_step,
                act,
                step.reward
            );

            stats.end.steps += 1;
            stats.end.reward += step.reward;
            if step.reward > 0.0 {
                stats.pos_reward_count += 1;
            } else if step.reward < 0.0 {
                stats.neg_reward_count += 1;
            }

            let next = match step.is_done {
                true => None,
                false => Some(self.extractor.extract(&step.obs)?),
            };
            let transition = Transition::new(features, act, next.clone(), step.reward);
            let record = agent.observe(transition, &self.state)?;
            if !record.is_empty() {
                recorder.store(record);
            }

            match next {
                Some(f) => features = f,
                None => break,
            }
        }

        Ok(stats)
    }

    fn end_episode<A: Agent + ?Sized>(
        &mut self,
        agent: &mut A,
        recorder: &mut dyn AggregateRecorder,
        stats: EpisodeStats,
    ) -> Result<()> {
        let record = agent.end_episode(&stats.end, &self.state)?;
        if !record.is_empty() {
            recorder.store(record);
        }

        self.state.finish_episode(
            stats.end.reward,
            stats.pos_reward_count,
            stats.neg_reward_count,
            self.config.win_rule,
            self.config.running_reward_alpha,
        );
        let running_reward = self.state.running_reward.unwrap_or(stats.end.reward);
        debug!(
            "episode {}: reward {}, running reward {}, steps {}, truncated {}",
            self.state.episode_index,
            stats.end.reward,
            running_reward,
            stats.end.steps,
            stats.end.truncated
        );

        recorder.store(Record::from_slice(&[
            ("episode_reward", Scalar(stats.end.reward)),
            ("running_reward", Scalar(running_reward)),
            ("pos_reward_count", Scalar(stats.pos_reward_count as f32)),
            ("neg_reward_count", Scalar(stats.neg_reward_count as f32)),
            ("wins", Scalar(self.state.wins as f32)),
            ("losses", Scalar(self.state.losses as f32)),
            ("episode_steps", Scalar(stats.end.steps as f32)),
        ]));

        if self.state.episode_index % self.config.flush_interval == 0 {
            recorder.flush(self.state.global_step as i64);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dummy::{DummyAgent, DummyEnv},
        record::BufferedRecorder,
        IdentityExtractor, WatchdogEnv,
    };
    use std::time::Duration;
    use tempdir::TempDir;

    fn config(dir: &TempDir) -> TrainerConfig {
        TrainerConfig::default()
            .experiment_name("test")
            .checkpoint_dir(dir.path())
            .max_episodes(6)
            .max_steps_per_episode(100)
            .save_every(2)
            .checkpoint_retention(0)
    }

    #[test]
    fn test_train() -> Result<()> {
        let dir = TempDir::new("trainer")?;
        let mut trainer = Trainer::build(config(&dir), DummyEnv::new(5, 2), IdentityExtractor)?;
        let mut agent = DummyAgent::new(2);
        let mut recorder = BufferedRecorder::new();

        let state = trainer.train(&mut agent, &mut recorder)?;
        assert_eq!(state.episode_index, 6);
        assert_eq!(state.global_step, 30);
        // 3 positive and 2 negative rewards per episode
        assert_eq!((state.wins, state.losses), (6, 0));
        assert_eq!(state.running_reward, Some(1.0));
        assert_eq!(agent.state.observed, 30);
        assert_eq!(agent.state.terminals, 6);
        assert_eq!(agent.state.episodes, 6);
        assert!(agent.is_train());

        let ixs: Vec<_> = trainer
            .checkpoints()
            .list()?
            .iter()
            .map(|i| i.episode_index)
            .collect();
        assert_eq!(ixs, vec![2, 4, 6]);

        assert_eq!(recorder.len(), 6);
        let last = recorder.iter().last().unwrap();
        assert_eq!(last.get_scalar("step")?, 30.0);
        assert_eq!(last.get_scalar("episode_reward")?, 1.0);
        assert_eq!(last.get_scalar("wins")?, 6.0);
        Ok(())
    }

    #[test]
    fn test_truncation() -> Result<()> {
        let dir = TempDir::new("trainer")?;
        let config = config(&dir).max_episodes(2).max_steps_per_episode(4);
        let mut trainer = Trainer::build(config, DummyEnv::new(0, 2), IdentityExtractor)?;
        let mut agent = DummyAgent::new(2);

        let state = trainer.train(&mut agent, &mut BufferedRecorder::new())?;
        assert_eq!(state.global_step, 8);
        assert_eq!(agent.state.truncated, 2);
        assert_eq!(agent.state.terminals, 0);
        // Environment rewards only, +1 -1 +1 -1 per episode
        assert_eq!(state.running_reward, Some(0.0));
        Ok(())
    }

    #[test]
    fn test_stop_signal() -> Result<()> {
        let dir = TempDir::new("trainer")?;
        let config = config(&dir).max_episodes(100).save_every(10);
        let mut trainer = Trainer::build(config, DummyEnv::new(3, 2), IdentityExtractor)?;
        let mut agent = DummyAgent::new(2);

        // Raised before training: the first episode still completes
        trainer.stop_signal().raise();
        let state = trainer.train(&mut agent, &mut BufferedRecorder::new())?;
        assert_eq!(state.episode_index, 1);
        assert_eq!(state.global_step, 3);
        assert_eq!(trainer.checkpoints().latest()?.map(|i| i.episode_index), Some(1));
        Ok(())
    }

    #[test]
    fn test_resume() -> Result<()> {
        let dir = TempDir::new("trainer")?;

        let mut trainer = Trainer::build(config(&dir).max_episodes(4), DummyEnv::new(5, 2), IdentityExtractor)?;
        let mut agent = DummyAgent::new(2);
        trainer.resume(&mut agent)?;
        assert_eq!(trainer.state(), &TrainingState::default());
        let first = trainer.train(&mut agent, &mut BufferedRecorder::new())?;

        let mut trainer = Trainer::build(config(&dir), DummyEnv::new(5, 2), IdentityExtractor)?;
        let mut agent = DummyAgent::new(2);
        assert_eq!(trainer.resume(&mut agent)?, &first);
        assert_eq!(agent.state.observed, 20);

        let state = trainer.train(&mut agent, &mut BufferedRecorder::new())?;
        assert_eq!(state.episode_index, 6);
        assert_eq!(state.global_step, 30);
        assert_eq!(agent.state.observed, 30);
        Ok(())
    }

    #[test]
    fn test_environment_unresponsive() -> Result<()> {
        let dir = TempDir::new("trainer")?;
        let mut env = DummyEnv::new(5, 2);
        env.stall_at = Some((3, Duration::from_millis(500)));
        let env = WatchdogEnv::new(env, Duration::from_millis(50));
        let mut trainer = Trainer::build(config(&dir), env, IdentityExtractor)?;
        let mut agent = DummyAgent::new(2);

        let err = trainer
            .train(&mut agent, &mut BufferedRecorder::new())
            .unwrap_err();
        match err.downcast_ref::<XrlError>() {
            Some(XrlError::EnvironmentUnresponsive {
                episode,
                step,
                timeout_ms,
            }) => {
                assert_eq!((*episode, *step, *timeout_ms), (0, 3, 50));
            }
            _ => panic!("unexpected error: {:?}", err),
        }
        Ok(())
    }
}
