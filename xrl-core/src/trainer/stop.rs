use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// A flag asking the training loop to stop.
///
/// Clones share the flag, so it can be raised from another thread. The
/// trainer checks it at episode boundaries only.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Creates a lowered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` if the signal has been raised.
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
