//! Environment and agent stubs used in tests.
use crate::{
    record::Record, replay_buffer::Transition, Agent, EpisodeEnd, Env, Policy, Step,
    TrainingState,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs::File, io::Write, path::Path, time::Duration};

/// Counts steps; rewards alternate between `+1` and `-1`.
///
/// The observation is `[t]`. An episode ends after `episode_len` steps; with
/// `episode_len == 0` it never ends.
pub struct DummyEnv {
    t: usize,
    episode_len: usize,
    n_actions: usize,

    /// The step of each episode at which the environment blocks.
    pub stall_at: Option<(usize, Duration)>,
}

impl DummyEnv {
    /// Constructs the environment.
    pub fn new(episode_len: usize, n_actions: usize) -> Self {
        Self {
            t: 0,
            episode_len,
            n_actions,
            stall_at: None,
        }
    }
}

impl Env for DummyEnv {
    type Obs = Vec<f32>;

    fn reset(&mut self) -> Result<Vec<f32>> {
        self.t = 0;
        Ok(vec![0.0])
    }

    fn step(&mut self, a: usize) -> Result<Step<Vec<f32>>> {
        assert!(a < self.n_actions);
        self.t += 1;
        if let Some((t, d)) = self.stall_at {
            if t == self.t {
                std::thread::sleep(d);
            }
        }
        let reward = if self.t % 2 == 1 { 1.0 } else { -1.0 };
        let is_done = self.episode_len > 0 && self.t >= self.episode_len;
        Ok(Step::new(vec![self.t as f32], reward, is_done))
    }

    fn action_space_size(&self) -> usize {
        self.n_actions
    }
}

/// Counters persisted by [`DummyAgent`].
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct DummyAgentState {
    /// Number of observed transitions.
    pub observed: u64,

    /// Number of observed terminal transitions.
    pub terminals: u64,

    /// Number of finished episodes.
    pub episodes: u64,

    /// Number of truncated episodes.
    pub truncated: u64,
}

/// An agent that counts what it is given.
pub struct DummyAgent {
    n_actions: usize,
    train: bool,

    /// The counters.
    pub state: DummyAgentState,
}

impl DummyAgent {
    /// Constructs the agent.
    pub fn new(n_actions: usize) -> Self {
        Self {
            n_actions,
            train: false,
            state: DummyAgentState::default(),
        }
    }
}

impl Policy for DummyAgent {
    fn sample(&mut self, _features: &[f32], state: &TrainingState) -> Result<usize> {
        Ok(state.global_step as usize % self.n_actions)
    }
}

impl Agent for DummyAgent {
    fn train(&mut self) {
        self.train = true;
    }

    fn eval(&mut self) {
        self.train = false;
    }

    fn is_train(&self) -> bool {
        self.train
    }

    fn algorithm(&self) -> &'static str {
        "dummy"
    }

    fn observe(&mut self, transition: Transition, _state: &TrainingState) -> Result<Record> {
        self.state.observed += 1;
        if transition.is_terminal() {
            self.state.terminals += 1;
        }
        Ok(Record::empty())
    }

    fn end_episode(&mut self, end: &EpisodeEnd, _state: &TrainingState) -> Result<Record> {
        self.state.episodes += 1;
        if end.truncated {
            self.state.truncated += 1;
        }
        Ok(Record::from_scalar("dummy_steps", end.steps as f32))
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        let mut file = File::create(path.join("agent.yaml"))?;
        file.write_all(serde_yaml::to_string(&self.state)?.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        let path = path.join("agent.yaml");
        let file = File::open(&path).with_context(|| format!("Failed to open {:?}", path))?;
        self.state = serde_yaml::from_reader(file)?;
        Ok(())
    }
}
