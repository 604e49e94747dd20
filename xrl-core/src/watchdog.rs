//! Timeout wrapper for environments that may block.
use crate::{error::XrlError, Env, Step};
use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{info, warn};
use std::{thread::JoinHandle, time::Duration};

enum Command {
    Reset,
    Step(usize),
}

enum Reply<O> {
    Reset(Result<O>),
    Step(Result<Step<O>>),
}

/// Runs an environment on a worker thread and bounds the time of each call.
///
/// [`Env::reset`] and [`Env::step`] are forwarded to the worker and the reply
/// is awaited for at most `timeout`. If no reply arrives in time the call
/// fails with [`XrlError::EnvironmentTimeout`] and the wrapper is poisoned:
/// every later call fails with the same error, since the worker may still be
/// inside the blocked call.
///
/// The worker thread exits when the wrapper is dropped and the pending call,
/// if any, returns.
pub struct WatchdogEnv<O> {
    cmd_sender: Sender<Command>,
    reply_receiver: Receiver<Reply<O>>,
    timeout: Duration,
    action_space_size: usize,
    poisoned: bool,
    handle: Option<JoinHandle<()>>,
}

impl<O: Send + 'static> WatchdogEnv<O> {
    /// Moves `env` to a worker thread.
    pub fn new<E>(env: E, timeout: Duration) -> Self
    where
        E: Env<Obs = O> + Send + 'static,
    {
        let action_space_size = env.action_space_size();
        let (cmd_sender, cmd_receiver) = bounded::<Command>(1);
        let (reply_sender, reply_receiver) = bounded::<Reply<O>>(1);
        let handle = std::thread::spawn(move || Self::run(env, cmd_receiver, reply_sender));
        info!("Started environment worker, timeout = {:?}", timeout);

        Self {
            cmd_sender,
            reply_receiver,
            timeout,
            action_space_size,
            poisoned: false,
            handle: Some(handle),
        }
    }

    fn run<E: Env<Obs = O>>(mut env: E, cmd: Receiver<Command>, reply: Sender<Reply<O>>) {
        for c in cmd.iter() {
            let r = match c {
                Command::Reset => Reply::Reset(env.reset()),
                Command::Step(a) => Reply::Step(env.step(a)),
            };
            if reply.send(r).is_err() {
                break;
            }
        }
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    fn call(&mut self, c: Command) -> Result<Reply<O>> {
        if self.poisoned {
            return Err(XrlError::EnvironmentTimeout(self.timeout_ms()).into());
        }
        self.cmd_sender
            .send(c)
            .map_err(|_| anyhow!("Environment worker has exited"))?;

        match self.reply_receiver.recv_timeout(self.timeout) {
            Ok(r) => Ok(r),
            Err(RecvTimeoutError::Timeout) => {
                warn!("Environment did not respond within {:?}", self.timeout);
                self.poisoned = true;
                Err(XrlError::EnvironmentTimeout(self.timeout_ms()).into())
            }
            Err(RecvTimeoutError::Disconnected) => Err(anyhow!("Environment worker has exited")),
        }
    }
}

impl<O: Send + 'static> Env for WatchdogEnv<O> {
    type Obs = O;

    fn reset(&mut self) -> Result<O> {
        match self.call(Command::Reset)? {
            Reply::Reset(r) => r,
            Reply::Step(_) => Err(anyhow!("Unexpected reply from environment worker")),
        }
    }

    fn step(&mut self, a: usize) -> Result<Step<O>> {
        match self.call(Command::Step(a))? {
            Reply::Step(r) => r,
            Reply::Reset(_) => Err(anyhow!("Unexpected reply from environment worker")),
        }
    }

    fn action_space_size(&self) -> usize {
        self.action_space_size
    }
}

impl<O> Drop for WatchdogEnv<O> {
    fn drop(&mut self) {
        // A worker stuck in the environment cannot be joined
        if !self.poisoned {
            let (s, _) = bounded(0);
            drop(std::mem::replace(&mut self.cmd_sender, s));
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
    }
}
