//! DQN agent implemented with candle.
use super::{config::DqnConfig, explorer::argmax, EpsilonGreedy, SyncUnit, TargetSync};
use crate::{
    model::{features_to_tensor, Model, SubModel1},
    opt::Optimizer,
    util::{clamp_grads, copy_varmap, smooth_l1_loss},
};
use anyhow::Result;
use candle_core::{shape::D, Device, Tensor};
use log::{debug, info, trace};
use rand::{rngs::StdRng, SeedableRng};
use std::path::Path;
use xrl_core::{
    error::XrlError,
    record::{Record, RecordValue},
    replay_buffer::{ReplayBuffer, Transition},
    Agent, EpisodeEnd, ExperienceBufferBase, Policy, ReplayBufferBase, TrainingState,
};

const GRAD_CLAMP: f64 = 1.0;

/// Regression targets `r + gamma * c`.
///
/// `continuation[i]` is the maximal action value of the target network at
/// the next state of transition `i`, or `None` if the transition is terminal,
/// in which case the target is the reward alone.
pub fn bellman_targets(rewards: &[f32], continuation: &[Option<f32>], gamma: f32) -> Vec<f32> {
    rewards
        .iter()
        .zip(continuation.iter())
        .map(|(r, c)| match c {
            Some(q) => r + gamma * q,
            None => *r,
        })
        .collect()
}

#[allow(clippy::upper_case_acronyms)]
/// DQN agent implemented with candle.
///
/// The agent owns its replay buffer. Each observed transition is pushed to
/// the buffer and, once the buffer holds more than `replay_min_size`
/// transitions, an optimization step is taken on a uniformly sampled batch.
pub struct Dqn<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
{
    qnet: Model<Q>,
    qnet_tgt: Model<Q>,
    opt: Optimizer,
    buffer: ReplayBuffer,
    explorer: EpsilonGreedy,
    batch_size: usize,
    gamma: f32,
    target_sync: TargetSync,
    replay_min_size: usize,
    eps_log_interval: u64,
    device: Device,
    train: bool,
    n_opts: u64,
    rng: StdRng,
}

impl<Q> Dqn<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: Clone,
{
    /// Constructs DQN agent.
    ///
    /// The target network starts as a copy of the Q-network.
    pub fn build(config: DqnConfig<Q::Config>) -> Result<Self> {
        config.validate()?;
        let device = config.device.to_candle()?;
        let qnet = Model::build(config.model_config.net_config.clone(), device.clone())?;
        let qnet_tgt = Model::build(config.model_config.net_config, device.clone())?;
        let opt = config.model_config.opt_config.build(qnet.varmap())?;

        let mut dqn = Self {
            qnet,
            qnet_tgt,
            opt,
            buffer: ReplayBuffer::build(&config.replay_buffer)?,
            explorer: EpsilonGreedy::new(config.epsilon),
            batch_size: config.batch_size,
            gamma: config.gamma,
            target_sync: config.target_sync,
            replay_min_size: config.replay_min_size,
            eps_log_interval: config.eps_log_interval,
            device,
            train: false,
            n_opts: 0,
            rng: StdRng::seed_from_u64(config.seed),
        };
        dqn.sync_target()?;
        Ok(dqn)
    }
}

impl<Q> Dqn<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
{
    /// Overwrites the target network with the parameters of the Q-network.
    pub fn sync_target(&mut self) -> Result<()> {
        copy_varmap(self.qnet_tgt.varmap(), self.qnet.varmap())?;
        info!("Synchronized target network after {} optimization steps", self.n_opts);
        Ok(())
    }

    /// The replay buffer.
    pub fn buffer(&self) -> &ReplayBuffer {
        &self.buffer
    }

    /// The Q-network.
    pub fn qnet(&self) -> &Model<Q> {
        &self.qnet
    }

    /// The target network.
    pub fn qnet_tgt(&self) -> &Model<Q> {
        &self.qnet_tgt
    }

    /// Number of optimization steps taken.
    pub fn n_opts(&self) -> u64 {
        self.n_opts
    }

    fn action_values(&self, features: &[f32]) -> Result<Vec<f32>> {
        let xs = features_to_tensor(std::iter::once(features), &self.device)?;
        Ok(self.qnet.forward(&xs)?.detach().squeeze(0)?.to_vec1()?)
    }

    /// Takes an optimization step on a sampled batch.
    ///
    /// Returns `None` without touching the parameters if the buffer holds
    /// fewer transitions than the batch size.
    pub fn opt_step(&mut self, global_step: u64) -> Result<Option<f32>> {
        let batch = match self.buffer.batch(self.batch_size) {
            Ok(batch) => batch,
            Err(e) => match e.downcast_ref::<XrlError>() {
                Some(XrlError::InsufficientData { .. }) => return Ok(None),
                _ => return Err(e),
            },
        };
        let loss = self.update_critic(&batch)?;
        self.n_opts += 1;

        if !loss.is_finite() {
            return Err(XrlError::NumericDivergence {
                loss,
                step: global_step,
            }
            .into());
        }
        Ok(Some(loss))
    }

    fn update_critic(&mut self, batch: &[Transition]) -> Result<f32> {
        let n = batch.len();
        let states = features_to_tensor(batch.iter().map(|t| t.state.as_slice()), &self.device)?;
        let actions = {
            let a: Vec<u32> = batch.iter().map(|t| t.action as u32).collect();
            Tensor::from_vec(a, (n, 1), &self.device)?
        };
        let rewards: Vec<f32> = batch.iter().map(|t| t.reward).collect();

        // The target network only sees non-terminal next states
        let mut continuation = vec![None; n];
        let non_terminal: Vec<(usize, &[f32])> = batch
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.next_state.as_deref().map(|s| (i, s)))
            .collect();
        if !non_terminal.is_empty() {
            let next_states =
                features_to_tensor(non_terminal.iter().map(|(_, s)| *s), &self.device)?;
            let max_q: Vec<f32> = self
                .qnet_tgt
                .forward(&next_states)?
                .detach()
                .max(D::Minus1)?
                .to_vec1()?;
            for ((i, _), q) in non_terminal.iter().zip(max_q) {
                continuation[*i] = Some(q);
            }
        }
        let tgt = Tensor::from_vec(
            bellman_targets(&rewards, &continuation, self.gamma),
            (n,),
            &self.device,
        )?;

        let pred = self
            .qnet
            .forward(&states)?
            .gather(&actions, D::Minus1)?
            .squeeze(D::Minus1)?;
        let loss = smooth_l1_loss(&pred, &tgt)?;

        let mut grads = loss.backward()?;
        clamp_grads(&mut grads, &self.opt.vars(), GRAD_CLAMP)?;
        self.opt.step(&grads)?;

        Ok(loss.to_scalar::<f32>()?)
    }
}

impl<Q> Policy for Dqn<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
{
    /// Epsilon-greedy in training mode, greedy in evaluation mode.
    fn sample(&mut self, features: &[f32], state: &TrainingState) -> Result<usize> {
        let q = self.action_values(features)?;
        let a = match self.train {
            true => self.explorer.action(&q, state.global_step, &mut self.rng),
            false => argmax(&q),
        };
        trace!("q = {:?}, a = {}", q, a);
        Ok(a)
    }
}

impl<Q> Agent for Dqn<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
{
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
        "dqn"
    }

    fn observe(&mut self, transition: Transition, state: &TrainingState) -> Result<Record> {
        let mut record = Record::empty();
        self.buffer.push(transition)?;

        if self.buffer.len() > self.replay_min_size {
            if let Some(loss) = self.opt_step(state.global_step)? {
                record.insert("loss", RecordValue::Scalar(loss));
            }
        }

        if self.target_sync.is_due(SyncUnit::Steps, state.global_step) {
            self.sync_target()?;
        }

        if state.global_step % self.eps_log_interval == 0 {
            let eps = self.explorer.epsilon(state.global_step);
            debug!("global step {}: eps = {}", state.global_step, eps);
            record.insert("eps", RecordValue::Scalar(eps as f32));
        }

        Ok(record)
    }

    fn end_episode(&mut self, _end: &EpisodeEnd, state: &TrainingState) -> Result<Record> {
        // `episode_index` is advanced after this call
        if self
            .target_sync
            .is_due(SyncUnit::Episodes, state.episode_index + 1)
        {
            self.sync_target()?;
        }
        Ok(Record::empty())
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        self.qnet.save(path.join("qnet.safetensors"))?;
        self.qnet_tgt.save(path.join("qnet_tgt.safetensors"))?;
        self.opt.save(path.join("opt.safetensors"))?;
        self.buffer.save(path.join("replay_buffer.bin"))?;
        Ok(())
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.qnet.load(path.join("qnet.safetensors"))?;
        self.qnet_tgt.load(path.join("qnet_tgt.safetensors"))?;
        self.opt.load(path.join("opt.safetensors"))?;
        self.buffer.load(path.join("replay_buffer.bin"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mlp::{Mlp, MlpConfig},
        model::ModelConfig,
        opt::OptimizerConfig,
        util::named_vars,
    };
    use candle_nn::VarMap;
    use tempdir::TempDir;
    use xrl_core::{replay_buffer::ReplayBufferConfig, EpsilonSchedule};

    fn config() -> DqnConfig<MlpConfig> {
        DqnConfig::new(ModelConfig::new(
            MlpConfig::new(3, vec![16], 2, false),
            OptimizerConfig::Adam { lr: 1e-2 },
        ))
        .batch_size(4)
        .gamma(0.9)
        .epsilon(EpsilonSchedule::new(0.9, 0.05, 100.0).unwrap())
        .target_sync(TargetSync::episodes(3))
        .replay_min_size(4)
        .replay_buffer(ReplayBufferConfig::default().capacity(50))
        .eps_log_interval(5)
    }

    fn params(varmap: &VarMap) -> Vec<Vec<f32>> {
        named_vars(varmap)
            .unwrap()
            .iter()
            .map(|(_, v)| v.flatten_all().unwrap().to_vec1().unwrap())
            .collect()
    }

    fn transition(i: usize) -> Transition {
        let s = vec![i as f32 * 0.1, 1.0, -0.5];
        let next = if i % 5 == 4 {
            None
        } else {
            Some(vec![(i + 1) as f32 * 0.1, 1.0, -0.5])
        };
        Transition::new(s, i % 2, next, if i % 3 == 0 { 1.0 } else { 0.0 })
    }

    fn state(global_step: u64, episode_index: u64) -> TrainingState {
        TrainingState {
            global_step,
            episode_index,
            ..TrainingState::default()
        }
    }

    #[test]
    fn test_bellman_targets() {
        let targets = bellman_targets(&[1.0, -2.0, 0.5], &[None, Some(3.0), None], 0.9);
        assert_eq!(targets, vec![1.0, -2.0 + 0.9 * 3.0, 0.5]);

        // Terminal targets do not depend on gamma
        for gamma in [0.0, 0.5, 0.99, 1.0] {
            assert_eq!(bellman_targets(&[7.5], &[None], gamma), vec![7.5]);
        }
    }

    #[test]
    fn test_target_sync() -> Result<()> {
        let mut dqn = Dqn::<Mlp>::build(config())?;
        dqn.train();
        assert_eq!(params(dqn.qnet().varmap()), params(dqn.qnet_tgt().varmap()));
        let initial = params(dqn.qnet_tgt().varmap());

        // Learner updates do not reach the target network
        for i in 0..10 {
            dqn.observe(transition(i), &state(i as u64 + 1, 1))?;
        }
        assert!(dqn.n_opts() > 0);
        assert_ne!(params(dqn.qnet().varmap()), initial);
        assert_eq!(params(dqn.qnet_tgt().varmap()), initial);

        // Not due after the second episode
        dqn.end_episode(&end(), &state(10, 1))?;
        assert_eq!(params(dqn.qnet_tgt().varmap()), initial);

        dqn.end_episode(&end(), &state(10, 2))?;
        assert_eq!(params(dqn.qnet_tgt().varmap()), params(dqn.qnet().varmap()));
        Ok(())
    }

    fn end() -> EpisodeEnd {
        EpisodeEnd {
            steps: 10,
            reward: 1.0,
            truncated: false,
        }
    }

    #[test]
    fn test_step_unit_sync() -> Result<()> {
        let mut dqn = Dqn::<Mlp>::build(config().target_sync(TargetSync::steps(7)))?;
        dqn.train();
        for i in 0..6 {
            dqn.observe(transition(i), &state(i as u64 + 1, 0))?;
        }
        assert_ne!(params(dqn.qnet().varmap()), params(dqn.qnet_tgt().varmap()));
        dqn.observe(transition(6), &state(7, 0))?;
        assert_eq!(params(dqn.qnet().varmap()), params(dqn.qnet_tgt().varmap()));
        Ok(())
    }

    #[test]
    fn test_warm_up_and_records() -> Result<()> {
        let mut dqn = Dqn::<Mlp>::build(config())?;
        dqn.train();
        for i in 0..4 {
            let record = dqn.observe(transition(i), &state(i as u64 + 1, 0))?;
            assert!(record.get("loss").is_none());
        }
        assert_eq!(dqn.n_opts(), 0);

        // 5 > replay_min_size, and step 5 is a logging step
        let record = dqn.observe(transition(4), &state(5, 0))?;
        assert!(record.get_scalar("loss")?.is_finite());
        let eps = record.get_scalar("eps")?;
        assert!((eps as f64 - dqn.explorer.epsilon(5)).abs() < 1e-6);
        assert_eq!(dqn.n_opts(), 1);
        Ok(())
    }

    #[test]
    fn test_insufficient_data_skips() -> Result<()> {
        let mut dqn = Dqn::<Mlp>::build(config().replay_min_size(0).batch_size(8))?;
        dqn.buffer.push(transition(0))?;
        let before = params(dqn.qnet().varmap());
        assert_eq!(dqn.opt_step(1)?, None);
        assert_eq!(params(dqn.qnet().varmap()), before);
        Ok(())
    }

    #[test]
    fn test_non_finite_loss_diverges() -> Result<()> {
        for bad in [f32::NAN, f32::INFINITY] {
            let mut dqn = Dqn::<Mlp>::build(config().replay_min_size(0))?;
            for i in 0..6 {
                let mut tr = transition(i);
                tr.reward = bad;
                dqn.buffer.push(tr)?;
            }
            let err = dqn.opt_step(7).unwrap_err();
            match err.downcast_ref::<XrlError>() {
                Some(XrlError::NumericDivergence { step, loss }) => {
                    assert_eq!(*step, 7);
                    assert!(!loss.is_finite());
                }
                _ => panic!("unexpected error: {}", err),
            }
        }
        Ok(())
    }

    #[test]
    fn test_greedy_in_eval_mode() -> Result<()> {
        let mut dqn = Dqn::<Mlp>::build(config())?;
        dqn.eval();
        let features = [0.3, 1.0, -0.5];
        let greedy = argmax(&dqn.action_values(&features)?);
        for step in 0..20 {
            assert_eq!(dqn.sample(&features, &state(step, 0))?, greedy);
        }
        Ok(())
    }

    #[test]
    fn test_save_and_load_params() -> Result<()> {
        let dir = TempDir::new("dqn")?;
        let mut src = Dqn::<Mlp>::build(config())?;
        src.train();
        for i in 0..12 {
            src.observe(transition(i), &state(i as u64 + 1, 0))?;
        }
        src.save_params(dir.path())?;

        let mut dst = Dqn::<Mlp>::build(config().seed(7))?;
        dst.load_params(dir.path())?;
        assert_eq!(params(dst.qnet().varmap()), params(src.qnet().varmap()));
        assert_eq!(params(dst.qnet_tgt().varmap()), params(src.qnet_tgt().varmap()));
        assert_eq!(dst.buffer().snapshot(), src.buffer().snapshot());
        assert_eq!(dst.opt.step_t(), src.opt.step_t());
        Ok(())
    }
}
