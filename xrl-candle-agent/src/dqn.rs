//! DQN agent.
mod base;
mod config;
mod explorer;
pub use base::{bellman_targets, Dqn};
pub use config::{DqnConfig, SyncUnit, TargetSync};
pub use explorer::{argmax, EpsilonGreedy};
