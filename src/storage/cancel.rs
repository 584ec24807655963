//! Cooperative cancellation for blocking writes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag checked by the blob store between chunks of a write.
///
/// Clones observe the same flag, so an async caller can keep one clone and
/// hand the other to a blocking task.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create a flag in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Cancels the wrapped flag when dropped unless disarmed.
///
/// Held by async code that awaits a blocking write: if the future is dropped
/// mid-flight, the write stops at its next chunk boundary.
#[derive(Debug)]
pub(crate) struct CancelOnDrop {
    flag: CancelFlag,
    armed: bool,
}

impl CancelOnDrop {
    pub(crate) fn new(flag: CancelFlag) -> Self {
        Self { flag, armed: true }
    }

    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.flag.cancel();
        }
    }
}
