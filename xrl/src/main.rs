use anyhow::{anyhow, Result};
use clap::Parser;
use log::info;
use std::{path::PathBuf, thread, time::Duration};
use xrl::{Experiment, ExperimentConfig};
use xrl_tensorboard::TensorboardRecorder;

/// Train a DQN or REINFORCE agent on the catch game
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Experiment configuration in YAML
    #[arg(short, long)]
    config: PathBuf,

    /// Directory of TensorBoard event files
    #[arg(short, long, default_value = "runs")]
    logdir: PathBuf,

    /// Stop at the next episode boundary after this wall-clock time
    #[arg(long)]
    max_minutes: Option<f64>,
}

/// Wall-clock budget of `minutes`, which must be finite and non-negative.
fn time_budget(minutes: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(minutes * 60.0)
        .map_err(|e| anyhow!("Invalid --max-minutes {}: {}", minutes, e))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = ExperimentConfig::load(&args.config)?;
    let mut experiment = Experiment::build(&config)?;

    if let Some(minutes) = args.max_minutes {
        let budget = time_budget(minutes)?;
        let stop = experiment.trainer.stop_signal();
        thread::spawn(move || {
            thread::sleep(budget);
            info!("Time budget of {} minutes is used up", minutes);
            stop.raise();
        });
    }

    let mut recorder =
        TensorboardRecorder::new(args.logdir.join(&config.trainer.experiment_name));
    let state = experiment.run(&mut recorder)?;
    info!(
        "Finished at episode {}, global step {}: {} wins, {} losses",
        state.episode_index, state.global_step, state.wins, state.losses
    );
    Ok(())
}
