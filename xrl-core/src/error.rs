//! Errors in the library.
use std::path::PathBuf;
use thiserror::Error;

/// Errors in the library.
///
/// Most APIs return [`anyhow::Result`]; these variants are carried inside
/// [`anyhow::Error`] and can be inspected with [`anyhow::Error::downcast_ref`].
#[derive(Error, Debug)]
pub enum XrlError {
    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),

    /// The replay buffer holds fewer transitions than requested.
    #[error("Insufficient data in replay buffer: {len} transitions, {requested} requested")]
    InsufficientData {
        /// Number of transitions in the buffer.
        len: usize,

        /// Requested batch size.
        requested: usize,
    },

    /// No checkpoint matched the request.
    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),

    /// A checkpoint exists but cannot be restored.
    #[error("Checkpoint {path:?} is corrupt: {reason}")]
    CheckpointCorrupt {
        /// Directory of the checkpoint.
        path: PathBuf,

        /// What went wrong.
        reason: String,
    },

    /// The environment did not answer within the timeout.
    #[error("Environment did not respond within {0} ms")]
    EnvironmentTimeout(u64),

    /// The environment did not answer within the timeout during training.
    #[error("Environment unresponsive at episode {episode}, step {step} (timeout {timeout_ms} ms)")]
    EnvironmentUnresponsive {
        /// Episode index.
        episode: u64,

        /// Global step.
        step: u64,

        /// Timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The loss is NaN or infinite.
    #[error("Numeric divergence at step {step}: loss = {loss}")]
    NumericDivergence {
        /// Value of the loss.
        loss: f32,

        /// Global step.
        step: u64,
    },

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
