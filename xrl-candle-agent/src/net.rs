//! Network selected from a configuration.
use crate::{
    cnn::{Cnn, CnnConfig},
    mlp::{Mlp, MlpConfig},
    model::SubModel1,
    util::OutDim,
};
use anyhow::Result;
use candle_core::Tensor;
use candle_nn::VarBuilder;
use serde::{Deserialize, Serialize};

/// Configuration of a [`Net`], tagged by `net` in YAML.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(tag = "net", rename_all = "snake_case")]
pub enum NetConfig {
    /// Multilayer perceptron on flattened frames.
    Mlp(MlpConfig),

    /// Convolutional network on frames.
    Cnn(CnnConfig),
}

impl NetConfig {
    /// Adapts the input of the network to `height x width` frames.
    pub fn frame(self, height: usize, width: usize) -> Self {
        match self {
            Self::Mlp(config) => Self::Mlp(config.in_dim(height * width)),
            Self::Cnn(config) => Self::Cnn(config.frame(height, width)),
        }
    }

    /// Checks that the layers fit the input.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Mlp(_) => Ok(()),
            Self::Cnn(config) => config.validate(),
        }
    }
}

impl OutDim for NetConfig {
    fn get_out_dim(&self) -> usize {
        match self {
            Self::Mlp(config) => config.get_out_dim(),
            Self::Cnn(config) => config.get_out_dim(),
        }
    }

    fn set_out_dim(&mut self, v: usize) {
        match self {
            Self::Mlp(config) => config.set_out_dim(v),
            Self::Cnn(config) => config.set_out_dim(v),
        }
    }
}

/// One of the networks of this crate.
pub enum Net {
    Mlp(Mlp),
    Cnn(Cnn),
}

impl SubModel1 for Net {
    type Config = NetConfig;
    type Input = Tensor;
    type Output = Tensor;

    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self> {
        config.validate()?;
        Ok(match config {
            NetConfig::Mlp(config) => Self::Mlp(Mlp::build(vb, config)?),
            NetConfig::Cnn(config) => Self::Cnn(Cnn::build(vb, config)?),
        })
    }

    fn forward(&self, xs: &Self::Input) -> Result<Tensor> {
        match self {
            Self::Mlp(net) => net.forward(xs),
            Self::Cnn(net) => net.forward(xs),
        }
    }
}

impl From<MlpConfig> for NetConfig {
    fn from(config: MlpConfig) -> Self {
        Self::Mlp(config)
    }
}

impl From<CnnConfig> for NetConfig {
    fn from(config: CnnConfig) -> Self {
        Self::Cnn(config)
    }
}
