use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Mission-wide cancellation flag.
///
/// Clones share the same flag. It only ever goes from clear to set; a new
/// mission gets a new flag.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag. Returns `true` only for the call that actually set it.
    pub fn trigger(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
