use crate::TrainingState;
use anyhow::Result;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

/// Version of the checkpoint layout.
pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

/// Contents of `meta.yaml` in a checkpoint directory.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct CheckpointMeta {
    /// Layout version, [`CHECKPOINT_FORMAT_VERSION`] when written.
    pub version: u32,

    /// Name of the experiment.
    pub experiment: String,

    /// Tag of the algorithm of the agent.
    pub algorithm: String,

    /// Counters and statistics of the run.
    pub state: TrainingState,

    /// When the checkpoint was written.
    pub created_at: DateTime<Local>,
}

impl CheckpointMeta {
    pub(super) fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_yaml::from_reader(BufReader::new(file))?)
    }

    pub(super) fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(serde_yaml::to_string(self)?.as_bytes())?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }
}
