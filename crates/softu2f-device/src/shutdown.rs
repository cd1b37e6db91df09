use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Asks a running device to stop.
///
/// Cheap to clone and safe to signal from any thread, including a signal
/// handler. The run loop notices within one input wait interval.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}
