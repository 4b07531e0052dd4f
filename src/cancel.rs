//! Cooperative cancellation
//!
//! A transaction checks its token between resources, never in the middle
//! of one. Clones share the same flag, so a signal handler or supervising
//! thread can hold one clone and the transaction another.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    stop_signal: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that processing stop at the next resource boundary
    pub fn cancel(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.stop_signal.load(Ordering::SeqCst)
    }
}
