//! Saving and restoring training runs.
//!
//! A checkpoint is a directory `<root>/<experiment>/ep<episode:08>/` holding
//! `meta.yaml` ([`CheckpointMeta`]) and whatever the agent writes in
//! [`Agent::save_params`](crate::Agent::save_params). Directories are written
//! under a hidden staging name and renamed into place, so a crash during a
//! save never leaves a partially written checkpoint under a valid name.
//!
//! ```no_run
//! # use xrl_core::{checkpoint::{CheckpointManager, CheckpointTag}, dummy::DummyAgent};
//! # fn main() -> anyhow::Result<()> {
//! let manager = CheckpointManager::new("/tmp/checkpoints", "pong", 3);
//! let mut agent = DummyAgent::new(2);
//! let state = manager.load(CheckpointTag::Latest, &mut agent)?;
//! println!("resuming at episode {}", state.episode_index);
//! # Ok(())
//! # }
//! ```
mod manager;
mod meta;
pub use manager::{CheckpointInfo, CheckpointManager, CheckpointTag};
pub use meta::{CheckpointMeta, CHECKPOINT_FORMAT_VERSION};
