//! One-shot loop timers.

use crate::reactor::EventLoop;
use std::time::Duration;

/// Runs `callback` on the loop thread once `after` has elapsed.
///
/// The timer keeps the loop alive until it fires and cleans itself up
/// afterwards; there is no handle to cancel.
pub fn oneshot(ev: &EventLoop, after: Duration, callback: impl FnOnce() + 'static) {
    ev.add_timer(after, callback);
}
