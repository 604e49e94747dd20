//! Interface of neural networks used in RL agents.
use crate::{
    opt::OptimizerConfig,
    util::{sync_file, OutDim},
};
use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Neural network model not owing its [`VarMap`] internally.
pub trait SubModel1 {
    /// Configuration from which [`SubModel1`] is constructed.
    type Config;

    /// Input of the [`SubModel1`].
    type Input;

    /// Output of the [`SubModel1`].
    type Output;

    /// Builds [`SubModel1`] with [`VarBuilder`] and [`SubModel1::Config`].
    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self>
    where
        Self: Sized;

    /// A generalized forward function.
    fn forward(&self, input: &Self::Input) -> Result<Self::Output>;
}

/// Configuration of a network together with its optimizer.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ModelConfig<C> {
    /// Configuration of the network.
    pub net_config: C,

    /// Configuration of the optimizer, including the learning rate.
    pub opt_config: OptimizerConfig,
}

impl<C: OutDim> ModelConfig<C> {
    /// Creates the configuration.
    pub fn new(net_config: C, opt_config: OptimizerConfig) -> Self {
        Self {
            net_config,
            opt_config,
        }
    }

    /// Sets output dimension of the network.
    pub fn out_dim(mut self, v: usize) -> Self {
        self.net_config.set_out_dim(v);
        self
    }

    /// Sets the learning rate.
    pub fn learning_rate(mut self, lr: f64) -> Self {
        self.opt_config = self.opt_config.learning_rate(lr);
        self
    }
}

/// A network owning its parameters in a [`VarMap`].
pub struct Model<Q> {
    device: Device,
    varmap: VarMap,
    net: Q,
}

impl<Q> Model<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
{
    /// Constructs the network with freshly initialized parameters.
    pub fn build(config: Q::Config, device: Device) -> Result<Self> {
        let varmap = VarMap::new();
        let net = {
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
            Q::build(vb, config)?
        };
        Ok(Self {
            device,
            varmap,
            net,
        })
    }

    /// Applies the network to a batch of feature vectors.
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        self.net.forward(xs)
    }

    /// Returns the parameters.
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// The device of the parameters.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Saves the parameters in safetensors format.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        let path = path.as_ref();
        self.varmap.save(path)?;
        sync_file(path)?;
        info!("Save model to {:?}", path);
        Ok(())
    }

    /// Loads the parameters saved with [`Model::save`].
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        let path = path.as_ref();
        self.varmap
            .load(path)
            .with_context(|| format!("Failed to load model from {:?}", path))?;
        info!("Load model from {:?}", path);
        Ok(())
    }
}

/// Stacks feature vectors of the same length into a `(n, dim)` tensor.
pub fn features_to_tensor<'a>(
    features: impl ExactSizeIterator<Item = &'a [f32]>,
    device: &Device,
) -> Result<Tensor> {
    let n = features.len();
    let mut dim = None;
    let mut data = vec![];
    for f in features {
        match dim {
            None => dim = Some(f.len()),
            Some(d) if d != f.len() => {
                return Err(anyhow::anyhow!(
                    "Feature vectors differ in length: {} and {}",
                    d,
                    f.len()
                ))
            }
            _ => {}
        }
        data.extend_from_slice(f);
    }
    Ok(Tensor::from_vec(data, (n, dim.unwrap_or(0)), device)?)
}
