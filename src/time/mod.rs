//! Time: one-shot sleeps and the fixed-delay timer wheel.

pub mod wheel;

pub use wheel::{TimerResult, TimerTask, Wheel};

use crate::fiber::Ivar;
use crate::reactor::timer;
use crate::scheduler::Scheduler;
use std::time::Duration;

/// Suspends the calling fiber for `after`.
///
/// Allocates a one-shot timer on the loop whose callback fills the
/// fiber's promise and cleans itself up.
pub async fn sleep(after: Duration) {
    let sched = Scheduler::current();
    let ivar: Ivar<()> = Ivar::new();
    let on_fire = sched.clone();
    let to_fill = ivar.clone();
    timer::oneshot(sched.ev(), after, move || on_fire.fill(&to_fill, ()));
    ivar.read().await;
}
