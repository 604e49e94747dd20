//! Experience replay.
//!
//! [`ReplayBuffer`] is a bounded FIFO store of [`Transition`]s backed by a
//! fixed-capacity arena. When full, a push overwrites the oldest slot.
//! Batches are sampled uniformly without replacement and are returned as
//! clones, so nothing outside the buffer aliases its contents.
mod base;
mod config;
mod transition;
pub use base::{ReplayBuffer, ReplayBufferSnapshot};
pub use config::ReplayBufferConfig;
pub use transition::Transition;
