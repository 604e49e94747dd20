//! Records of training metrics.
//!
//! A [`Record`] is a set of named values produced by the agent and the
//! training loop. Records are written to a metrics sink through the
//! [`Recorder`] and [`AggregateRecorder`] traits. Aggregating recorders keep
//! records in a [`RecordStorage`] and summarise them when flushed.
//!
//! ```rust
//! use xrl_core::record::{Record, RecordValue};
//!
//! let mut record = Record::from_scalar("loss", 0.25);
//! record.insert("eps", RecordValue::Scalar(0.9));
//! assert_eq!(record.get_scalar("loss").unwrap(), 0.25);
//! ```
mod base;
mod buffered_recorder;
mod null_recorder;
mod recorder;
mod storage;

pub use base::{Record, RecordValue};
pub use buffered_recorder::BufferedRecorder;
pub use null_recorder::NullRecorder;
pub use recorder::{AggregateRecorder, Recorder};
pub use storage::RecordStorage;
