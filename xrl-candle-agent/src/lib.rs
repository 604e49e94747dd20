//! RL agents implemented with [candle](https://crates.io/crates/candle-core).
//!
//! * [`dqn::Dqn`]: deep Q-network with experience replay and a target network.
//! * [`reinforce::Reinforce`]: Monte-Carlo policy gradient with normalized returns.
//!
//! Both implement [`xrl_core::Agent`] on top of a [`net::Net`], either an
//! MLP or a CNN. [`Learner`] selects the agent and its network from a
//! configuration.
pub mod cnn;
pub mod dqn;
mod learner;
pub mod mlp;
pub mod model;
pub mod net;
pub mod opt;
pub mod reinforce;
pub mod util;
use anyhow::Result;
pub use learner::{Learner, LearnerConfig};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
/// Device for using candle.
///
/// This enum is added because [`candle_core::Device`] does not support serialization.
pub enum Device {
    /// The main CPU device.
    #[default]
    Cpu,

    /// The main GPU device.
    Cuda(usize),
}

impl Device {
    /// Returns the candle device.
    pub fn to_candle(self) -> Result<candle_core::Device> {
        Ok(match self {
            Self::Cpu => candle_core::Device::Cpu,
            Self::Cuda(n) => candle_core::Device::new_cuda(n)?,
        })
    }
}
