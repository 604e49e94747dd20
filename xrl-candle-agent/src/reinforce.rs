//! REINFORCE agent.
mod base;
mod config;
mod trace;
pub use base::{discounted_returns, normalize_returns, Reinforce};
pub use config::ReinforceConfig;
pub use trace::EpisodeTrace;
