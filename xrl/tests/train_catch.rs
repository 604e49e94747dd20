use anyhow::Result;
use tempdir::TempDir;
use xrl::{Experiment, ExperimentConfig};
use xrl_core::{error::XrlError, record::BufferedRecorder};

fn dqn_config(checkpoint_dir: &std::path::Path, max_episodes: u64) -> Result<ExperimentConfig> {
    let yaml = format!(
        r#"
trainer:
  experiment_name: catch
  checkpoint_dir: {:?}
  max_episodes: {}
  max_steps_per_episode: 100
  save_every: 2
  checkpoint_retention: 0
agent:
  algorithm: dqn
  model_config:
    net_config:
      net: mlp
      in_dim: 0
      units: [16]
      out_dim: 0
    opt_config:
      Adam:
        lr: 0.001
  batch_size: 8
  gamma: 0.9
  epsilon:
    eps_start: 0.9
    eps_end: 0.05
    eps_decay: 100.0
  target_sync:
    interval: 2
    unit: Episodes
  replay_min_size: 20
  replay_buffer:
    capacity: 500
    seed: 0
"#,
        checkpoint_dir, max_episodes
    );
    Ok(serde_yaml::from_str(&yaml)?)
}

fn reinforce_config(checkpoint_dir: &std::path::Path) -> Result<ExperimentConfig> {
    let yaml = format!(
        r#"
trainer:
  experiment_name: catch
  checkpoint_dir: {:?}
  max_episodes: 3
  max_steps_per_episode: 100
  save_every: 3
  checkpoint_retention: 2
agent:
  algorithm: reinforce
  model_config:
    net_config:
      net: cnn
      height: 0
      width: 0
      conv:
        - {{out_channels: 8, kernel: 2, stride: 1}}
      units: [16]
      out_dim: 0
    opt_config:
      Adam:
        lr: 0.0001
  gamma: 0.99
env:
  width: 4
  height: 4
  rallies: 2
  seed: 7
"#,
        checkpoint_dir
    );
    Ok(serde_yaml::from_str(&yaml)?)
}

#[test]
fn dqn_trains_and_resumes() -> Result<()> {
    let dir = TempDir::new("train_catch")?;

    let mut experiment = Experiment::build(&dqn_config(dir.path(), 4)?)?;
    let mut recorder = BufferedRecorder::new();
    let state = experiment.run(&mut recorder)?;

    // Three balls falling five rows per episode
    assert_eq!(state.episode_index, 4);
    assert_eq!(state.global_step, 60);
    assert_eq!(state.wins + state.losses, 4);
    assert_eq!(recorder.len(), 4);
    assert!(recorder.iter().all(|r| r.get_scalar("episode_reward").is_ok()));
    assert!(recorder.iter().any(|r| r.get_scalar("loss_mean").is_ok()));

    let episodes: Vec<u64> = experiment
        .trainer
        .checkpoints()
        .list()?
        .iter()
        .map(|c| c.episode_index)
        .collect();
    assert_eq!(episodes, vec![2, 4]);

    let latest = experiment.trainer.checkpoints().dir().join("ep00000004");
    for file in [
        "meta.yaml",
        "qnet.safetensors",
        "qnet_tgt.safetensors",
        "opt.safetensors",
        "replay_buffer.bin",
    ] {
        assert!(latest.join(file).is_file(), "{} is missing", file);
    }
    drop(experiment);

    let mut experiment = Experiment::build(&dqn_config(dir.path(), 6)?)?;
    let state = experiment.run(&mut BufferedRecorder::new())?;
    assert_eq!(state.episode_index, 6);
    assert_eq!(state.global_step, 90);
    assert_eq!(state.wins + state.losses, 6);
    Ok(())
}

#[test]
fn reinforce_trains() -> Result<()> {
    let dir = TempDir::new("train_catch")?;
    let mut experiment = Experiment::build(&reinforce_config(dir.path())?)?;
    let mut recorder = BufferedRecorder::new();
    let state = experiment.run(&mut recorder)?;

    assert_eq!(state.episode_index, 3);
    assert_eq!(state.global_step, 18);
    assert!(recorder.iter().all(|r| r.get_scalar("loss").is_ok()));
    let ckpt = experiment.trainer.checkpoints().dir().join("ep00000003");
    assert!(ckpt.join("policy.safetensors").is_file());
    assert!(ckpt.join("opt.safetensors").is_file());
    Ok(())
}

#[test]
fn resuming_with_another_algorithm_fails() -> Result<()> {
    let dir = TempDir::new("train_catch")?;
    Experiment::build(&dqn_config(dir.path(), 2)?)?.run(&mut BufferedRecorder::new())?;

    let mut experiment = Experiment::build(&reinforce_config(dir.path())?)?;
    let err = match experiment.run(&mut BufferedRecorder::new()) {
        Ok(_) => panic!("a dqn checkpoint must not load into reinforce"),
        Err(e) => e,
    };
    assert!(matches!(
        err.downcast_ref::<XrlError>(),
        Some(XrlError::CheckpointCorrupt { .. })
    ));
    Ok(())
}
