#![warn(missing_docs)]
//! Training core for reinforcement learning agents on Atari-style environments.
//!
//! This crate holds everything that does not depend on a deep learning backend:
//!
//! * the interfaces of environments, feature extractors and agents ([`Env`],
//!   [`FeatureExtractor`], [`Policy`], [`Agent`]),
//! * the experience replay buffer ([`replay_buffer`]),
//! * the exploration schedule ([`EpsilonSchedule`]),
//! * the metrics records ([`record`]),
//! * the checkpoint manager ([`checkpoint`]),
//! * and the training loop ([`Trainer`]).
//!
//! Agents built on a backend (see `xrl-candle-agent`) implement [`Agent`] and are
//! driven by [`Trainer`].
pub mod checkpoint;
pub mod dummy;
pub mod error;
pub mod record;
pub mod replay_buffer;

mod base;
pub use base::{
    Agent, EpisodeEnd, Env, ExperienceBufferBase, FeatureExtractor, IdentityExtractor, Policy,
    ReplayBufferBase, Step,
};

mod schedule;
pub use schedule::EpsilonSchedule;

mod watchdog;
pub use watchdog::WatchdogEnv;

mod trainer;
pub use trainer::{StopSignal, Trainer, TrainerConfig, TrainingState, WinRule};
