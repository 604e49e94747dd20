use super::{CheckpointMeta, CHECKPOINT_FORMAT_VERSION};
use crate::{error::XrlError, Agent, TrainingState};
use anyhow::{Context, Result};
use chrono::Local;
use log::{info, warn};
use std::{
    fs,
    path::{Path, PathBuf},
};

const META_FILE: &str = "meta.yaml";
const STAGING_PREFIX: &str = ".staging-";
const OLD_PREFIX: &str = ".old-";

/// Selects a checkpoint to load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckpointTag {
    /// The checkpoint with the largest episode index.
    Latest,

    /// The checkpoint taken at the given episode index.
    Episode(u64),
}

/// A checkpoint found on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckpointInfo {
    /// Episode index at which the checkpoint was taken.
    pub episode_index: u64,

    /// Directory of the checkpoint.
    pub path: PathBuf,
}

/// Removes a staging directory unless it has been renamed into place.
struct StagingDir {
    path: PathBuf,
    committed: bool,
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_dir_all(&self.path);
        }
    }
}

/// Saves and restores checkpoints of an experiment.
pub struct CheckpointManager {
    dir: PathBuf,
    experiment: String,
    retention: usize,
}

fn dir_name(episode_index: u64) -> String {
    format!("ep{:08}", episode_index)
}

fn parse_dir_name(name: &str) -> Option<u64> {
    let digits = name.strip_prefix("ep")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn corrupt(path: &Path, reason: impl Into<String>) -> anyhow::Error {
    XrlError::CheckpointCorrupt {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
    .into()
}

impl CheckpointManager {
    /// Manages checkpoints of `experiment` under `root`, keeping at most
    /// `retention` of them (`0` keeps all).
    pub fn new(root: impl AsRef<Path>, experiment: impl Into<String>, retention: usize) -> Self {
        let experiment = experiment.into();
        Self {
            dir: root.as_ref().join(&experiment),
            experiment,
            retention,
        }
    }

    /// Directory holding the checkpoints of the experiment.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Lists the checkpoints, oldest first.
    ///
    /// Staging directories of unfinished saves are not listed. A checkpoint
    /// moved aside by an interrupted overwrite is listed in place of the
    /// missing one.
    pub fn list(&self) -> Result<Vec<CheckpointInfo>> {
        if !self.dir.is_dir() {
            return Ok(vec![]);
        }

        let mut infos = vec![];
        let mut orphans = vec![];
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read checkpoint directory {:?}", self.dir))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(episode_index) = parse_dir_name(name) {
                infos.push(CheckpointInfo {
                    episode_index,
                    path: entry.path(),
                });
            } else if let Some(episode_index) =
                name.strip_prefix(OLD_PREFIX).and_then(parse_dir_name)
            {
                orphans.push(CheckpointInfo {
                    episode_index,
                    path: entry.path(),
                });
            }
        }
        for orphan in orphans {
            if !infos.iter().any(|i| i.episode_index == orphan.episode_index) {
                infos.push(orphan);
            }
        }
        infos.sort_by_key(|info| info.episode_index);
        Ok(infos)
    }

    /// Returns the newest checkpoint, if any.
    pub fn latest(&self) -> Result<Option<CheckpointInfo>> {
        Ok(self.list()?.pop())
    }

    /// Saves the state of a run taken at the end of episode `state.episode_index`.
    ///
    /// An existing checkpoint of the same episode is replaced. Returns the
    /// directory of the checkpoint.
    pub fn save<A: Agent + ?Sized>(&self, state: &TrainingState, agent: &A) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create checkpoint directory {:?}", self.dir))?;
        self.remove_stale_dirs()?;

        let name = dir_name(state.episode_index);
        let target = self.dir.join(&name);
        let mut staging = StagingDir {
            path: self.dir.join(format!("{}{}", STAGING_PREFIX, name)),
            committed: false,
        };
        fs::create_dir(&staging.path)
            .with_context(|| format!("Failed to create {:?}", staging.path))?;

        agent
            .save_params(&staging.path)
            .with_context(|| format!("Failed to save agent in {:?}", staging.path))?;
        let meta = CheckpointMeta {
            version: CHECKPOINT_FORMAT_VERSION,
            experiment: self.experiment.clone(),
            algorithm: agent.algorithm().to_string(),
            state: state.clone(),
            created_at: Local::now(),
        };
        meta.save(staging.path.join(META_FILE))?;

        if target.exists() {
            let old = self.dir.join(format!("{}{}", OLD_PREFIX, name));
            fs::rename(&target, &old)?;
            fs::rename(&staging.path, &target)?;
            staging.committed = true;
            fs::remove_dir_all(&old)?;
        } else {
            fs::rename(&staging.path, &target)?;
            staging.committed = true;
        }
        info!(
            "Saved checkpoint {:?} (global step {})",
            target, state.global_step
        );

        self.apply_retention()?;
        Ok(target)
    }

    /// Restores the agent from a checkpoint and returns the state of the run.
    ///
    /// Fails with [`XrlError::CheckpointNotFound`] if no checkpoint matches
    /// `tag` and with [`XrlError::CheckpointCorrupt`] if the checkpoint
    /// cannot be read or was written by an agent of another algorithm.
    pub fn load<A: Agent + ?Sized>(&self, tag: CheckpointTag, agent: &mut A) -> Result<TrainingState> {
        let path = match tag {
            CheckpointTag::Latest => match self.latest()? {
                Some(info) => info.path,
                None => {
                    return Err(XrlError::CheckpointNotFound(format!(
                        "no checkpoint in {:?}",
                        self.dir
                    ))
                    .into())
                }
            },
            CheckpointTag::Episode(ix) => {
                let found = self.list()?.into_iter().find(|i| i.episode_index == ix);
                match found {
                    Some(info) => info.path,
                    None => {
                        let path = self.dir.join(dir_name(ix));
                        return Err(XrlError::CheckpointNotFound(format!("{:?}", path)).into());
                    }
                }
            }
        };

        let meta = CheckpointMeta::load(path.join(META_FILE))
            .map_err(|e| corrupt(&path, format!("failed to read {}: {:#}", META_FILE, e)))?;
        if meta.version != CHECKPOINT_FORMAT_VERSION {
            return Err(corrupt(
                &path,
                format!("unsupported format version {}", meta.version),
            ));
        }
        if meta.algorithm != agent.algorithm() {
            return Err(corrupt(
                &path,
                format!(
                    "written by a {} agent, cannot restore into a {} agent",
                    meta.algorithm,
                    agent.algorithm()
                ),
            ));
        }
        agent
            .load_params(&path)
            .map_err(|e| corrupt(&path, format!("{:#}", e)))?;

        info!(
            "Loaded checkpoint {:?} (episode {}, global step {})",
            path, meta.state.episode_index, meta.state.global_step
        );
        Ok(meta.state)
    }

    /// Cleans up directories left behind by interrupted saves.
    ///
    /// A checkpoint moved aside by an overwrite that did not complete is
    /// renamed back if it has not been replaced.
    fn remove_stale_dirs(&self) -> Result<()> {
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(STAGING_PREFIX) {
                warn!("Removing unfinished checkpoint {:?}", entry.path());
                fs::remove_dir_all(entry.path())?;
            } else if let Some(orig) = name.strip_prefix(OLD_PREFIX) {
                let target = self.dir.join(orig);
                if parse_dir_name(orig).is_some() && !target.exists() {
                    warn!("Restoring checkpoint {:?} to {:?}", entry.path(), target);
                    fs::rename(entry.path(), &target)?;
                } else {
                    warn!("Removing replaced checkpoint {:?}", entry.path());
                    fs::remove_dir_all(entry.path())?;
                }
            }
        }
        Ok(())
    }

    fn apply_retention(&self) -> Result<()> {
        if self.retention == 0 {
            return Ok(());
        }
        let infos = self.list()?;
        if infos.len() > self.retention {
            for info in &infos[..infos.len() - self.retention] {
                info!("Removing checkpoint {:?}", info.path);
                fs::remove_dir_all(&info.path)
                    .with_context(|| format!("Failed to remove {:?}", info.path))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dummy::DummyAgent;
    use tempdir::TempDir;

    fn state(episode_index: u64) -> TrainingState {
        TrainingState {
            global_step: episode_index * 10 + 3,
            episode_index,
            wins: episode_index / 2,
            losses: episode_index - episode_index / 2,
            running_reward: Some(-1.5),
        }
    }

    fn agent(observed: u64) -> DummyAgent {
        let mut agent = DummyAgent::new(2);
        agent.state.observed = observed;
        agent
    }

    fn kind(err: &anyhow::Error) -> &XrlError {
        err.downcast_ref::<XrlError>().expect("not an XrlError")
    }

    #[test]
    fn test_round_trip() -> Result<()> {
        let dir = TempDir::new("checkpoint")?;
        let manager = CheckpointManager::new(dir.path(), "exp", 0);

        let path = manager.save(&state(4), &agent(41))?;
        assert_eq!(path, dir.path().join("exp").join("ep00000004"));
        assert!(path.join("meta.yaml").is_file());

        let mut restored = DummyAgent::new(2);
        let s = manager.load(CheckpointTag::Latest, &mut restored)?;
        assert_eq!(s, state(4));
        assert_eq!(restored.state.observed, 41);

        let s = manager.load(CheckpointTag::Episode(4), &mut restored)?;
        assert_eq!(s, state(4));
        Ok(())
    }

    #[test]
    fn test_latest_and_overwrite() -> Result<()> {
        let dir = TempDir::new("checkpoint")?;
        let manager = CheckpointManager::new(dir.path(), "exp", 0);
        for ix in [2, 10, 6] {
            manager.save(&state(ix), &agent(ix))?;
        }
        manager.save(&state(6), &agent(100))?;

        let ixs: Vec<_> = manager.list()?.iter().map(|i| i.episode_index).collect();
        assert_eq!(ixs, vec![2, 6, 10]);
        assert_eq!(manager.latest()?.map(|i| i.episode_index), Some(10));

        let mut restored = DummyAgent::new(2);
        manager.load(CheckpointTag::Episode(6), &mut restored)?;
        assert_eq!(restored.state.observed, 100);
        Ok(())
    }

    #[test]
    fn test_retention() -> Result<()> {
        let dir = TempDir::new("checkpoint")?;
        let manager = CheckpointManager::new(dir.path(), "exp", 3);
        for ix in 1..=7 {
            manager.save(&state(ix), &agent(ix))?;
        }
        let ixs: Vec<_> = manager.list()?.iter().map(|i| i.episode_index).collect();
        assert_eq!(ixs, vec![5, 6, 7]);
        Ok(())
    }

    #[test]
    fn test_not_found() -> Result<()> {
        let dir = TempDir::new("checkpoint")?;
        let manager = CheckpointManager::new(dir.path(), "exp", 0);
        let mut agent = DummyAgent::new(2);

        let err = manager.load(CheckpointTag::Latest, &mut agent).unwrap_err();
        assert!(matches!(kind(&err), XrlError::CheckpointNotFound(_)));

        manager.save(&state(1), &agent)?;
        let err = manager.load(CheckpointTag::Episode(2), &mut agent).unwrap_err();
        assert!(matches!(kind(&err), XrlError::CheckpointNotFound(_)));
        Ok(())
    }

    #[test]
    fn test_corrupt() -> Result<()> {
        let dir = TempDir::new("checkpoint")?;
        let manager = CheckpointManager::new(dir.path(), "exp", 0);
        let mut agent = DummyAgent::new(2);

        let path = manager.save(&state(1), &agent)?;
        fs::write(path.join("meta.yaml"), "version: [")?;
        let err = manager.load(CheckpointTag::Latest, &mut agent).unwrap_err();
        assert!(matches!(kind(&err), XrlError::CheckpointCorrupt { .. }));

        let path = manager.save(&state(2), &agent)?;
        fs::remove_file(path.join("agent.yaml"))?;
        let err = manager.load(CheckpointTag::Latest, &mut agent).unwrap_err();
        assert!(matches!(kind(&err), XrlError::CheckpointCorrupt { .. }));
        Ok(())
    }

    #[test]
    fn test_staging_is_ignored_and_removed() -> Result<()> {
        let dir = TempDir::new("checkpoint")?;
        let manager = CheckpointManager::new(dir.path(), "exp", 0);
        let agent = agent(1);
        manager.save(&state(1), &agent)?;

        // A save interrupted before the rename
        let staging = manager.dir().join(".staging-ep00000002");
        fs::create_dir(&staging)?;
        fs::write(staging.join("meta.yaml"), "garbage")?;

        assert_eq!(manager.latest()?.map(|i| i.episode_index), Some(1));
        let mut restored = DummyAgent::new(2);
        assert_eq!(manager.load(CheckpointTag::Latest, &mut restored)?, state(1));

        manager.save(&state(3), &agent)?;
        assert!(!staging.exists());
        Ok(())
    }

    #[test]
    fn test_interrupted_overwrite_keeps_previous_copy() -> Result<()> {
        let dir = TempDir::new("checkpoint")?;
        let manager = CheckpointManager::new(dir.path(), "exp", 0);
        manager.save(&state(5), &agent(55))?;

        // An overwrite of episode 5 stopped between the two renames
        let target = manager.dir().join("ep00000005");
        let old = manager.dir().join(".old-ep00000005");
        fs::rename(&target, &old)?;
        fs::create_dir(manager.dir().join(".staging-ep00000005"))?;

        let ixs: Vec<_> = manager.list()?.iter().map(|i| i.episode_index).collect();
        assert_eq!(ixs, vec![5]);
        let mut restored = DummyAgent::new(2);
        assert_eq!(manager.load(CheckpointTag::Latest, &mut restored)?, state(5));
        assert_eq!(restored.state.observed, 55);
        let mut restored = DummyAgent::new(2);
        manager.load(CheckpointTag::Episode(5), &mut restored)?;
        assert_eq!(restored.state.observed, 55);

        // The next save puts it back in place
        manager.save(&state(6), &agent(66))?;
        assert!(!old.exists());
        assert!(target.join("meta.yaml").is_file());
        assert!(!manager.dir().join(".staging-ep00000005").exists());
        let ixs: Vec<_> = manager.list()?.iter().map(|i| i.episode_index).collect();
        assert_eq!(ixs, vec![5, 6]);
        Ok(())
    }
}
