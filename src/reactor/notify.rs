//! Cross-thread loop notification.

use polling::Poller;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Handle to an async watcher registered with
/// [`EventLoop::add_async`](crate::reactor::EventLoop::add_async).
///
/// [`send`](Self::send) may be called from any thread; the watcher's
/// callback runs on the loop thread during its next pass. Sends coalesce:
/// any number of sends before the callback runs produce one callback.
#[derive(Clone)]
pub struct Notifier {
    pending: Arc<AtomicBool>,
    poller: Arc<Poller>,
}

impl Notifier {
    pub(crate) fn new(pending: Arc<AtomicBool>, poller: Arc<Poller>) -> Self {
        Self { pending, poller }
    }

    /// Requests a callback on the loop thread. Thread-safe.
    pub fn send(&self) {
        self.pending.store(true, Ordering::Release);
        let _ = self.poller.notify();
    }
}
