//! REINFORCE agent implemented with candle.
use super::{EpisodeTrace, ReinforceConfig};
use crate::{
    dqn::argmax,
    model::{features_to_tensor, Model, SubModel1},
    opt::Optimizer,
};
use anyhow::Result;
use candle_core::{shape::D, Device, Tensor};
use candle_nn::ops::log_softmax;
use log::{debug, trace};
use rand::{distributions::WeightedIndex, rngs::StdRng, Rng, SeedableRng};
use std::path::Path;
use xrl_core::{
    error::XrlError,
    record::{Record, RecordValue},
    replay_buffer::Transition,
    Agent, EpisodeEnd, Policy, TrainingState,
};

/// Discounted returns `R_t = r_t + gamma * R_{t+1}` of an episode.
pub fn discounted_returns(rewards: &[f32], gamma: f32) -> Vec<f32> {
    let mut returns = vec![0f32; rewards.len()];
    let mut r = 0f32;
    for (ret, reward) in returns.iter_mut().zip(rewards.iter()).rev() {
        r = reward + gamma * r;
        *ret = r;
    }
    returns
}

/// Shifts and scales `returns` to zero mean and unit sample standard deviation.
///
/// `f32::EPSILON` is added to the standard deviation, which is 0 for a single
/// value.
pub fn normalize_returns(returns: &mut [f32]) {
    let n = returns.len();
    if n == 0 {
        return;
    }
    let mean = returns.iter().sum::<f32>() / n as f32;
    let std = match n {
        1 => 0.0,
        _ => {
            let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f32>() / (n - 1) as f32;
            var.sqrt()
        }
    };
    for r in returns.iter_mut() {
        *r = (*r - mean) / (std + f32::EPSILON);
    }
}

/// Replaces the last reward of a truncated episode by the penalty.
fn penalize_truncation(rewards: &mut [f32], truncated: bool, penalty: Option<f32>) {
    if let (true, Some(p), Some(last)) = (truncated, penalty, rewards.last_mut()) {
        *last = p;
    }
}

/// REINFORCE agent implemented with candle.
///
/// Actions are sampled from the softmax of the policy network's output.
/// The log-probabilities and rewards of an episode are kept in an
/// [`EpisodeTrace`]; at the end of the episode one gradient step is taken on
/// `sum_t(-log_prob_t * R_t)` with normalized returns `R_t`.
pub struct Reinforce<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
{
    policy: Model<Q>,
    opt: Optimizer,
    gamma: f32,
    truncation_penalty: Option<f32>,
    trace: EpisodeTrace,
    device: Device,
    train: bool,
    n_opts: u64,
    rng: StdRng,
}

impl<Q> Reinforce<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
{
    /// Constructs REINFORCE agent.
    pub fn build(config: ReinforceConfig<Q::Config>) -> Result<Self> {
        config.validate()?;
        let device = config.device.to_candle()?;
        let policy = Model::build(config.model_config.net_config, device.clone())?;
        let opt = config.model_config.opt_config.build(policy.varmap())?;

        Ok(Self {
            policy,
            opt,
            gamma: config.gamma,
            truncation_penalty: config.truncation_penalty,
            trace: EpisodeTrace::default(),
            device,
            train: false,
            n_opts: 0,
            rng: StdRng::seed_from_u64(config.seed),
        })
    }

    /// The policy network.
    pub fn policy(&self) -> &Model<Q> {
        &self.policy
    }

    /// Number of optimization steps taken.
    pub fn n_opts(&self) -> u64 {
        self.n_opts
    }

    /// Log-probabilities of the actions, with the computation graph.
    fn log_probs(&self, features: &[f32]) -> Result<Tensor> {
        let xs = features_to_tensor(std::iter::once(features), &self.device)?;
        let logits = self.policy.forward(&xs)?;
        Ok(log_softmax(&logits, D::Minus1)?.squeeze(0)?)
    }

    fn update_policy(&mut self, log_probs: Vec<Tensor>, returns: Vec<f32>) -> Result<f32> {
        let n = returns.len();
        let log_probs = Tensor::stack(&log_probs, 0)?;
        let returns = Tensor::from_vec(returns, (n,), &self.device)?;
        let loss = (log_probs * returns)?.sum_all()?.neg()?;
        self.opt.backward_step(&loss)?;
        self.n_opts += 1;
        Ok(loss.to_scalar::<f32>()?)
    }
}

impl<Q> Policy for Reinforce<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
{
    /// Samples from the policy in training mode, takes the most probable
    /// action in evaluation mode.
    fn sample(&mut self, features: &[f32], _state: &TrainingState) -> Result<usize> {
        let log_probs = self.log_probs(features)?;
        let probs: Vec<f32> = log_probs.detach().exp()?.to_vec1()?;

        if !self.train {
            return Ok(argmax(&probs));
        }

        let a = self.rng.sample(WeightedIndex::new(&probs)?);
        trace!("probs = {:?}, a = {}", probs, a);
        self.trace.push_log_prob(log_probs.get(a)?);
        Ok(a)
    }
}

impl<Q> Agent for Reinforce<Q>
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
        "reinforce"
    }

    fn observe(&mut self, transition: Transition, _state: &TrainingState) -> Result<Record> {
        if self.train {
            self.trace.push_reward(transition.reward);
        }
        Ok(Record::empty())
    }

    fn end_episode(&mut self, end: &EpisodeEnd, state: &TrainingState) -> Result<Record> {
        let trace = std::mem::take(&mut self.trace);
        if !self.train || trace.is_empty() {
            return Ok(Record::empty());
        }

        let (log_probs, mut rewards) = trace.into_parts()?;
        penalize_truncation(&mut rewards, end.truncated, self.truncation_penalty);
        let mut returns = discounted_returns(&rewards, self.gamma);
        normalize_returns(&mut returns);

        let loss = self.update_policy(log_probs, returns)?;
        debug!(
            "episode {}: {} steps, loss = {}",
            state.episode_index,
            rewards.len(),
            loss
        );
        if !loss.is_finite() {
            return Err(XrlError::NumericDivergence {
                loss,
                step: state.global_step,
            }
            .into());
        }

        Ok(Record::from_slice(&[("loss", RecordValue::Scalar(loss))]))
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        self.policy.save(path.join("policy.safetensors"))?;
        self.opt.save(path.join("opt.safetensors"))?;
        Ok(())
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.policy.load(path.join("policy.safetensors"))?;
        self.opt.load(path.join("opt.safetensors"))?;
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
    use tempdir::TempDir;

    fn config() -> ReinforceConfig<MlpConfig> {
        ReinforceConfig::new(ModelConfig::new(
            MlpConfig::new(2, vec![8], 3, false),
            OptimizerConfig::Adam { lr: 1e-2 },
        ))
        .gamma(0.9)
    }

    fn params(agent: &Reinforce<Mlp>) -> Vec<Vec<f32>> {
        named_vars(agent.policy().varmap())
            .unwrap()
            .iter()
            .map(|(_, v)| v.flatten_all().unwrap().to_vec1().unwrap())
            .collect()
    }

    fn run_steps(agent: &mut Reinforce<Mlp>, n: usize) -> Result<()> {
        let state = TrainingState::default();
        for i in 0..n {
            let features = vec![i as f32, 1.0];
            let a = agent.sample(&features, &state)?;
            assert!(a < 3);
            let reward = if a == 0 { 1.0 } else { 0.0 };
            agent.observe(Transition::new(features, a, None, reward), &state)?;
        }
        Ok(())
    }

    fn end(steps: usize, truncated: bool) -> EpisodeEnd {
        EpisodeEnd {
            steps,
            reward: 0.0,
            truncated,
        }
    }

    #[test]
    fn test_discounted_returns() {
        assert_eq!(discounted_returns(&[1.0, 1.0, 1.0], 0.5), vec![1.75, 1.5, 1.0]);
        assert_eq!(discounted_returns(&[0.0, 2.0], 1.0), vec![2.0, 2.0]);
        assert!(discounted_returns(&[], 0.9).is_empty());
    }

    #[test]
    fn test_normalize_returns() {
        let mut returns = vec![1.75, 1.5, 1.0];
        normalize_returns(&mut returns);
        let mean = returns.iter().sum::<f32>() / 3.0;
        let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f32>() / 2.0;
        assert!(mean.abs() < 1e-6);
        assert!((var - 1.0).abs() < 1e-4);

        let mut returns = vec![5.0];
        normalize_returns(&mut returns);
        assert_eq!(returns, vec![0.0]);
    }

    #[test]
    fn test_penalize_truncation() {
        let mut rewards = vec![1.0, 0.0, 0.0];
        penalize_truncation(&mut rewards, false, Some(-25.0));
        assert_eq!(rewards, vec![1.0, 0.0, 0.0]);
        penalize_truncation(&mut rewards, true, None);
        assert_eq!(rewards, vec![1.0, 0.0, 0.0]);
        penalize_truncation(&mut rewards, true, Some(-25.0));
        assert_eq!(rewards, vec![1.0, 0.0, -25.0]);
    }

    #[test]
    fn test_end_episode_updates_and_clears() -> Result<()> {
        let mut agent = Reinforce::<Mlp>::build(config())?;
        agent.train();
        let before = params(&agent);

        run_steps(&mut agent, 6)?;
        assert_eq!(agent.trace.len(), 6);
        let record = agent.end_episode(&end(6, false), &TrainingState::default())?;
        assert!(record.get_scalar("loss")?.is_finite());
        assert!(agent.trace.is_empty());
        assert_eq!(agent.n_opts(), 1);
        assert_ne!(params(&agent), before);
        Ok(())
    }

    #[test]
    fn test_empty_trace_is_noop() -> Result<()> {
        let mut agent = Reinforce::<Mlp>::build(config())?;
        agent.train();
        let before = params(&agent);
        let record = agent.end_episode(&end(0, true), &TrainingState::default())?;
        assert!(record.is_empty());
        assert_eq!(agent.n_opts(), 0);
        assert_eq!(params(&agent), before);
        Ok(())
    }

    #[test]
    fn test_eval_mode_does_not_learn() -> Result<()> {
        let mut agent = Reinforce::<Mlp>::build(config())?;
        agent.eval();
        run_steps(&mut agent, 4)?;
        assert!(agent.trace.is_empty());
        agent.end_episode(&end(4, false), &TrainingState::default())?;
        assert_eq!(agent.n_opts(), 0);
        Ok(())
    }

    #[test]
    fn test_non_finite_reward_diverges() -> Result<()> {
        let mut agent = Reinforce::<Mlp>::build(config())?;
        agent.train();
        let state = TrainingState {
            global_step: 12,
            ..Default::default()
        };
        for reward in [0.0, f32::INFINITY, 1.0] {
            let features = vec![reward.min(1.0), 1.0];
            let a = agent.sample(&features, &state)?;
            agent.observe(Transition::new(features, a, None, reward), &state)?;
        }
        let err = agent.end_episode(&end(3, false), &state).unwrap_err();
        match err.downcast_ref::<XrlError>() {
            Some(XrlError::NumericDivergence { step, loss }) => {
                assert_eq!(*step, 12);
                assert!(!loss.is_finite());
            }
            _ => panic!("unexpected error: {}", err),
        }
        assert!(agent.trace.is_empty());
        Ok(())
    }

    #[test]
    fn test_save_and_load_params() -> Result<()> {
        let dir = TempDir::new("reinforce")?;
        let mut src = Reinforce::<Mlp>::build(config())?;
        src.train();
        run_steps(&mut src, 5)?;
        src.end_episode(&end(5, false), &TrainingState::default())?;
        src.save_params(dir.path())?;

        let mut dst = Reinforce::<Mlp>::build(config().seed(3))?;
        dst.load_params(dir.path())?;
        assert_eq!(params(&dst), params(&src));
        assert_eq!(dst.opt.step_t(), 1);
        Ok(())
    }
}
