//! Ring buffer of transitions.
use super::{ReplayBufferConfig, Transition};
use crate::{error::XrlError, ExperienceBufferBase, ReplayBufferBase};
use anyhow::{Context, Result};
use log::{info, warn};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

/// Contents of a [`ReplayBuffer`] in insertion order, oldest first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplayBufferSnapshot {
    /// Capacity of the buffer the snapshot was taken from.
    pub capacity: usize,

    /// Transitions, oldest first.
    pub transitions: Vec<Transition>,
}

/// A bounded FIFO store of transitions with uniform sampling.
pub struct ReplayBuffer {
    capacity: usize,

    /// Slot written by the next push once the arena is full.
    i: usize,

    data: Vec<Transition>,
    rng: StdRng,
}

impl ReplayBuffer {
    /// Samples `batch_size` distinct transitions uniformly at random.
    ///
    /// Transitions are drawn without replacement within a call; successive
    /// calls are independent.
    pub fn sample(&mut self, batch_size: usize) -> Result<Vec<Transition>> {
        let len = self.data.len();
        if len < batch_size {
            return Err(XrlError::InsufficientData {
                len,
                requested: batch_size,
            }
            .into());
        }

        let ixs = rand::seq::index::sample(&mut self.rng, len, batch_size);
        Ok(ixs.iter().map(|ix| self.data[ix].clone()).collect())
    }

    /// The maximum number of transitions.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates over the transitions in insertion order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        let (newer, older) = if self.data.len() < self.capacity {
            (&self.data[..], &self.data[..0])
        } else {
            (&self.data[..self.i], &self.data[self.i..])
        };
        older.iter().chain(newer.iter())
    }

    /// Takes a snapshot of the contents.
    pub fn snapshot(&self) -> ReplayBufferSnapshot {
        ReplayBufferSnapshot {
            capacity: self.capacity,
            transitions: self.iter().cloned().collect(),
        }
    }

    /// Replaces the contents with those of `snapshot`.
    ///
    /// The capacity of this buffer is kept. If the snapshot holds more
    /// transitions than fit, the oldest ones are evicted as by [`push`].
    ///
    /// [`push`]: ExperienceBufferBase::push
    pub fn restore(&mut self, snapshot: ReplayBufferSnapshot) {
        if snapshot.capacity != self.capacity {
            warn!(
                "Restoring a replay buffer of capacity {} into one of capacity {}",
                snapshot.capacity, self.capacity
            );
        }
        self.data.clear();
        self.i = 0;
        for tr in snapshot.transitions {
            self.push_transition(tr);
        }
    }

    /// Writes the contents to `path` with bincode.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create replay buffer file {:?}", path))?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, &self.snapshot())?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        info!("Saved {} transitions to {:?}", self.len(), path);
        Ok(())
    }

    /// Reads the contents written by [`ReplayBuffer::save`].
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open replay buffer file {:?}", path))?;
        let snapshot: ReplayBufferSnapshot = bincode::deserialize_from(BufReader::new(file))
            .with_context(|| format!("Failed to decode replay buffer file {:?}", path))?;
        self.restore(snapshot);
        info!("Loaded {} transitions from {:?}", self.len(), path);
        Ok(())
    }

    #[inline]
    fn push_transition(&mut self, tr: Transition) {
        if self.data.len() < self.capacity {
            self.data.push(tr);
        } else {
            self.data[self.i] = tr;
        }
        self.i = (self.i + 1) % self.capacity;
    }
}

impl ExperienceBufferBase for ReplayBuffer {
    type Item = Transition;

    fn push(&mut self, tr: Self::Item) -> Result<()> {
        self.push_transition(tr);
        Ok(())
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

impl ReplayBufferBase for ReplayBuffer {
    type Config = ReplayBufferConfig;
    type Batch = Vec<Transition>;

    fn build(config: &Self::Config) -> Result<Self> {
        if config.capacity == 0 {
            return Err(XrlError::InvalidConfig("replay buffer capacity must be positive".into()).into());
        }

        Ok(Self {
            capacity: config.capacity,
            i: 0,
            data: Vec::with_capacity(config.capacity.min(1 << 16)),
            rng: StdRng::seed_from_u64(config.seed),
        })
    }

    fn batch(&mut self, size: usize) -> Result<Self::Batch> {
        self.sample(size)
    }
}
