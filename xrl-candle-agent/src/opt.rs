//! Optimizers.
//!
//! The update rule follows [`candle_nn::AdamW`]. It is reimplemented here so
//! that the moment estimates can be saved and restored with checkpoints.
use crate::util::{named_vars, sync_file};
use anyhow::{Context, Result};
use candle_core::{backprop::GradStore, Tensor, Var};
use candle_nn::{ParamsAdamW, VarMap};
use log::info;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path};

const STEP_KEY: &str = "step_t";

/// Configuration of optimizer for training neural networks in an RL agent.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum OptimizerConfig {
    /// AdamW optimizer.
    AdamW {
        /// Learning rate.
        lr: f64,
        /// Decay of the first moment estimate.
        #[serde(default = "default_beta1")]
        beta1: f64,
        /// Decay of the second moment estimate.
        #[serde(default = "default_beta2")]
        beta2: f64,
        /// Added to the denominator for numerical stability.
        #[serde(default = "default_eps")]
        eps: f64,
        /// Decoupled weight decay.
        #[serde(default = "default_weight_decay")]
        weight_decay: f64,
    },

    /// Adam optimizer.
    Adam {
        /// Learning rate.
        lr: f64,
    },
}

fn default_beta1() -> f64 {
    ParamsAdamW::default().beta1
}

fn default_beta2() -> f64 {
    ParamsAdamW::default().beta2
}

fn default_eps() -> f64 {
    ParamsAdamW::default().eps
}

fn default_weight_decay() -> f64 {
    ParamsAdamW::default().weight_decay
}

impl OptimizerConfig {
    /// Constructs an optimizer of the variables in `varmap`.
    pub fn build(&self, varmap: &VarMap) -> Result<Optimizer> {
        Optimizer::new(self.params(), varmap)
    }

    /// Override learning rate.
    pub fn learning_rate(self, lr: f64) -> Self {
        match self {
            Self::AdamW {
                lr: _,
                beta1,
                beta2,
                eps,
                weight_decay,
            } => Self::AdamW {
                lr,
                beta1,
                beta2,
                eps,
                weight_decay,
            },
            Self::Adam { lr: _ } => Self::Adam { lr },
        }
    }

    /// Returns the learning rate.
    pub fn get_learning_rate(&self) -> f64 {
        match self {
            Self::AdamW { lr, .. } => *lr,
            Self::Adam { lr } => *lr,
        }
    }

    fn params(&self) -> ParamsAdamW {
        match self {
            Self::AdamW {
                lr,
                beta1,
                beta2,
                eps,
                weight_decay,
            } => ParamsAdamW {
                lr: *lr,
                beta1: *beta1,
                beta2: *beta2,
                eps: *eps,
                weight_decay: *weight_decay,
            },
            Self::Adam { lr } => ParamsAdamW {
                lr: *lr,
                weight_decay: 0.0,
                ..ParamsAdamW::default()
            },
        }
    }
}

struct VarAdam {
    name: String,
    var: Var,
    first_moment: Var,
    second_moment: Var,
}

/// Adam optimizer with decoupled weight decay.
pub struct Optimizer {
    vars: Vec<VarAdam>,
    step_t: usize,
    params: ParamsAdamW,
}

impl Optimizer {
    fn new(params: ParamsAdamW, varmap: &VarMap) -> Result<Self> {
        let vars = named_vars(varmap)?
            .into_iter()
            .map(|(name, var)| {
                let first_moment = Var::zeros(var.shape(), var.dtype(), var.device())?;
                let second_moment = Var::zeros(var.shape(), var.dtype(), var.device())?;
                Ok(VarAdam {
                    name,
                    var,
                    first_moment,
                    second_moment,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            vars,
            step_t: 0,
            params,
        })
    }

    /// The optimized variables.
    pub fn vars(&self) -> Vec<Var> {
        self.vars.iter().map(|v| v.var.clone()).collect()
    }

    /// Number of steps taken.
    pub fn step_t(&self) -> usize {
        self.step_t
    }

    /// Computes gradients of `loss` and applies a step.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        let grads = loss.backward()?;
        self.step(&grads)
    }

    /// Applies a step with the given gradients.
    ///
    /// Variables without a gradient are left untouched.
    pub fn step(&mut self, grads: &GradStore) -> Result<()> {
        self.step_t += 1;
        let lr = self.params.lr;
        let lambda = self.params.weight_decay;
        let lr_lambda = lr * lambda;
        let beta1 = self.params.beta1;
        let beta2 = self.params.beta2;
        let scale_m = 1f64 / (1f64 - beta1.powi(self.step_t as i32));
        let scale_v = 1f64 / (1f64 - beta2.powi(self.step_t as i32));

        for var in self.vars.iter() {
            let theta = &var.var;
            let m = &var.first_moment;
            let v = &var.second_moment;
            if let Some(g) = grads.get(theta) {
                let next_m = ((m.as_tensor() * beta1)? + (g * (1.0 - beta1))?)?;
                let next_v = ((v.as_tensor() * beta2)? + (g.sqr()? * (1.0 - beta2))?)?;
                let m_hat = (&next_m * scale_m)?;
                let v_hat = (&next_v * scale_v)?;
                let next_theta = (theta.as_tensor() * (1f64 - lr_lambda))?;
                let adjusted_grad = (m_hat / (v_hat.sqrt()? + self.params.eps)?)?;
                let next_theta = (next_theta - (adjusted_grad * lr)?)?;
                m.set(&next_m)?;
                v.set(&next_v)?;
                theta.set(&next_theta)?;
            }
        }

        Ok(())
    }

    /// Saves the moment estimates and the step counter in safetensors format.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut tensors = HashMap::new();
        for var in self.vars.iter() {
            tensors.insert(format!("m.{}", var.name), var.first_moment.as_tensor().copy()?);
            tensors.insert(format!("v.{}", var.name), var.second_moment.as_tensor().copy()?);
        }
        tensors.insert(
            STEP_KEY.to_string(),
            Tensor::new(&[self.step_t as u32], &candle_core::Device::Cpu)?,
        );
        candle_core::safetensors::save(&tensors, path)?;
        sync_file(path)?;
        info!("Save optimizer state to {:?}", path);
        Ok(())
    }

    /// Loads the state written by [`Optimizer::save`].
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let device = match self.vars.first() {
            Some(var) => var.var.device().clone(),
            None => candle_core::Device::Cpu,
        };
        let tensors = candle_core::safetensors::load(path, &device)
            .with_context(|| format!("Failed to read optimizer state {:?}", path))?;
        let get = |key: &str| {
            tensors
                .get(key)
                .with_context(|| format!("{} is missing in {:?}", key, path))
        };

        for var in self.vars.iter() {
            var.first_moment.set(get(&format!("m.{}", var.name))?)?;
            var.second_moment.set(get(&format!("v.{}", var.name))?)?;
        }
        self.step_t = get(STEP_KEY)?.to_vec1::<u32>()?[0] as usize;
        info!("Load optimizer state from {:?}", path);
        Ok(())
    }
}
