//! Fixed-delay timer wheel.
//!
//! A [`Wheel`] batches timeouts that all share one delay (a sliding
//! window): entries fire in insertion order, `scheduled_at + delay` after
//! they were pushed. One long-lived consumer fiber drives the wheel by
//! awaiting [`run`](Wheel::run); it sleeps until the oldest entry is due
//! and parks when the wheel is empty.
//!
//! # Cancel and Reset
//!
//! Both are O(1) through generation-based invalidation: each queue slot is
//! stamped with the entry's generation at push time, and a popped slot
//! whose stamp no longer matches is skipped. [`reset`](Wheel::reset) bumps
//! the generation and re-pushes with a fresh timestamp;
//! [`cancel`](Wheel::cancel) resolves the entry's promise with
//! [`TimerResult::Cancelled`]. An entry fires at most once.

use crate::fiber::Ivar;
use crate::scheduler::Scheduler;
use crate::time::sleep;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// How a wheel entry resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerResult {
    /// The delay elapsed.
    Ok,
    /// The entry was cancelled (or the wheel stopped) before firing.
    Cancelled,
}

struct Entry {
    ivar: Ivar<TimerResult>,
    scheduled_at: Cell<Instant>,
    filled: Cell<bool>,
    generation: Cell<u64>,
}

/// Handle to a scheduled wheel entry.
#[derive(Clone)]
pub struct TimerTask {
    entry: Rc<Entry>,
}

struct Running {
    delay: Duration,
    /// Entries stamped with their generation at push time.
    queue: VecDeque<(Rc<Entry>, u64)>,
    next_gen: u64,
    /// Consumer parked on an empty wheel.
    waiting: Option<Ivar<()>>,
}

enum State {
    Running(Running),
    Stopped,
}

/// A wheel of equally-delayed, individually cancellable timeouts.
/// Cloning shares the wheel.
#[derive(Clone)]
pub struct Wheel {
    state: Rc<RefCell<State>>,
}

impl Wheel {
    /// Creates a running wheel with the given delay.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            state: Rc::new(RefCell::new(State::Running(Running {
                delay,
                queue: VecDeque::new(),
                next_gen: 0,
                waiting: None,
            }))),
        }
    }

    /// Schedules an entry to fire `delay` from now.
    ///
    /// # Panics
    ///
    /// Panics if the wheel is stopped.
    pub fn task(&self) -> TimerTask {
        let now = Scheduler::current().ev().now();
        let (entry, wake) = {
            let mut state = self.state.borrow_mut();
            let State::Running(running) = &mut *state else {
                panic!("Wheel::task: task scheduled on a stopped wheel");
            };
            let generation = running.next_gen;
            running.next_gen += 1;
            let entry = Rc::new(Entry {
                ivar: Ivar::new(),
                scheduled_at: Cell::new(now),
                filled: Cell::new(false),
                generation: Cell::new(generation),
            });
            running.queue.push_back((Rc::clone(&entry), generation));
            (entry, running.waiting.take())
        };
        if let Some(ivar) = wake {
            ivar.fill(());
        }
        TimerTask { entry }
    }

    /// Suspends until the entry fires or is cancelled.
    pub async fn wait(&self, task: &TimerTask) -> TimerResult {
        task.entry.ivar.read().await
    }

    /// Re-schedules an unfired entry to fire `delay` from now.
    ///
    /// A no-op once the entry has fired or been cancelled.
    pub fn reset(&self, task: &TimerTask) {
        if task.entry.filled.get() {
            return;
        }
        let now = Scheduler::current().ev().now();
        let wake = {
            let mut state = self.state.borrow_mut();
            let State::Running(running) = &mut *state else {
                return;
            };
            // Invalidate the queued slot, then push a freshly stamped one.
            let generation = running.next_gen;
            running.next_gen += 1;
            task.entry.generation.set(generation);
            task.entry.scheduled_at.set(now);
            running.queue.push_back((Rc::clone(&task.entry), generation));
            running.waiting.take()
        };
        if let Some(ivar) = wake {
            ivar.fill(());
        }
    }

    /// Cancels an unfired entry, resolving its promise with
    /// [`TimerResult::Cancelled`]. Idempotent; a no-op once fired.
    pub fn cancel(&self, task: &TimerTask) {
        if task.entry.filled.replace(true) {
            return;
        }
        task.entry.ivar.fill(TimerResult::Cancelled);
    }

    /// The single long-lived consumer: pops the oldest entry, sleeps until
    /// it is due, fires it, repeats. Parks while the wheel is empty;
    /// returns once the wheel is stopped.
    pub async fn run(&self) {
        enum Step {
            Sleep(Rc<Entry>, u64, Duration),
            Park(Ivar<()>),
            Done,
        }
        loop {
            let now = Scheduler::current().ev().now();
            let step = {
                let mut state = self.state.borrow_mut();
                match &mut *state {
                    State::Stopped => Step::Done,
                    State::Running(running) => loop {
                        match running.queue.pop_front() {
                            None => {
                                let ivar = Ivar::new();
                                running.waiting = Some(ivar.clone());
                                break Step::Park(ivar);
                            }
                            Some((entry, stamped)) => {
                                if entry.filled.get() || entry.generation.get() != stamped {
                                    // Cancelled, or reset re-pushed it.
                                    continue;
                                }
                                let due = entry.scheduled_at.get() + running.delay;
                                break Step::Sleep(
                                    entry,
                                    stamped,
                                    due.saturating_duration_since(now),
                                );
                            }
                        }
                    },
                }
            };
            match step {
                Step::Done => return,
                Step::Park(ivar) => ivar.read().await,
                Step::Sleep(entry, stamped, remaining) => {
                    if !remaining.is_zero() {
                        sleep(remaining).await;
                    }
                    if matches!(&*self.state.borrow(), State::Stopped) {
                        // Stopped while this entry was in flight.
                        if !entry.filled.replace(true) {
                            entry.ivar.fill(TimerResult::Cancelled);
                        }
                        return;
                    }
                    if entry.filled.get() || entry.generation.get() != stamped {
                        continue;
                    }
                    entry.filled.set(true);
                    entry.ivar.fill(TimerResult::Ok);
                }
            }
        }
    }

    /// Stops the wheel: cancels all remaining entries in FIFO order, then
    /// wakes a parked [`run`](Self::run). Idempotent.
    pub fn stop(&self) {
        let (entries, wake) = {
            let mut state = self.state.borrow_mut();
            match std::mem::replace(&mut *state, State::Stopped) {
                State::Stopped => return,
                State::Running(running) => (running.queue, running.waiting),
            }
        };
        for (entry, stamped) in entries {
            if entry.generation.get() == stamped && !entry.filled.replace(true) {
                entry.ivar.fill(TimerResult::Cancelled);
            }
        }
        if let Some(ivar) = wake {
            ivar.fill(());
        }
    }
}
