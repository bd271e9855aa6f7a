//! The scheduler: fill queue, cross-thread completions, iterate step.
//!
//! [`Scheduler::run`] wires the three layers together: it creates the
//! event loop, installs the async watcher whose callback drains the
//! mutex-guarded cross-thread queue into the fill queue, binds the
//! scheduler for [`Scheduler::current`], and hands control to the fiber
//! executor with the iterate step below.
//!
//! # The Iterate Step
//!
//! Called whenever no fiber is runnable. It returns the fill queue's
//! contents if any, otherwise advances the event loop one pass and
//! retries. If the loop reports no more active watchers while the fill
//! queue is still empty, nothing can ever unblock a fiber again and the
//! step fails fatally with a deadlock panic.
//!
//! # Ordering
//!
//! Fills produced during a single loop pass are delivered together, in
//! insertion order. Cross-thread completions enter only at async-watcher
//! fire points. The cross-thread mutex is held just long enough to move
//! the queue's contents, never across anything that can suspend.

use crate::fiber::{self, Fill, Ivar};
use crate::reactor::notify::Notifier;
use crate::reactor::{EventLoop, LoopStatus};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::rc::Rc;
use std::sync::{Arc, OnceLock};
use tracing::trace;

struct CrossThread {
    queue: parking_lot::Mutex<Vec<Fill>>,
    notifier: OnceLock<Notifier>,
}

struct SchedInner {
    ev: EventLoop,
    fills: RefCell<VecDeque<Fill>>,
}

/// The per-run scheduler. Cloning shares the run's state.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<SchedInner>,
    shared: Arc<CrossThread>,
}

thread_local! {
    static CURRENT: RefCell<Option<Scheduler>> = const { RefCell::new(None) };
}

struct CurrentGuard;

impl Drop for CurrentGuard {
    fn drop(&mut self) {
        CURRENT.with(|slot| slot.borrow_mut().take());
    }
}

impl Scheduler {
    /// Runs `body` to completion on a fresh event loop.
    ///
    /// # Panics
    ///
    /// Panics on nested runs, on event-loop creation failure, and with a
    /// deadlock error when every fiber is suspended with no watcher left
    /// to produce a fill.
    pub fn run<T, F>(body: F) -> T
    where
        T: 'static,
        F: Future<Output = T> + 'static,
    {
        let ev = EventLoop::new().expect("event loop creation");
        let shared = Arc::new(CrossThread {
            queue: parking_lot::Mutex::new(Vec::new()),
            notifier: OnceLock::new(),
        });
        let sched = Self {
            inner: Rc::new(SchedInner {
                ev,
                fills: RefCell::new(VecDeque::new()),
            }),
            shared,
        };

        let drainer = sched.clone();
        let notifier = sched.inner.ev.add_async(move || drainer.drain_cross_thread());
        sched
            .shared
            .notifier
            .set(notifier)
            .unwrap_or_else(|_| unreachable!("notifier installed once"));

        CURRENT.with(|slot| {
            let mut slot = slot.borrow_mut();
            assert!(slot.is_none(), "Scheduler::run: nested run on one thread");
            *slot = Some(sched.clone());
        });
        let _guard = CurrentGuard;

        let stepper = sched.clone();
        fiber::run(body, move || stepper.iterate())
    }

    /// The scheduler of the current run.
    ///
    /// # Panics
    ///
    /// Panics outside [`run`].
    #[must_use]
    pub fn current() -> Self {
        CURRENT.with(|slot| {
            slot.borrow()
                .clone()
                .expect("no scheduler: called outside Scheduler::run")
        })
    }

    /// The run's event loop.
    #[must_use]
    pub fn ev(&self) -> &EventLoop {
        &self.inner.ev
    }

    /// Queues a fill for delivery on the next iterate step. Loop thread
    /// only; worker threads go through [`completions`](Self::completions).
    pub(crate) fn fill<T: Send + 'static>(&self, ivar: &Ivar<T>, value: T) {
        self.inner.fills.borrow_mut().push_back(Fill::new(ivar, value));
    }

    /// A `Send` handle worker threads use to post completions.
    pub(crate) fn completions(&self) -> CompletionSender {
        CompletionSender {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Pins the loop for one outstanding cross-thread completion.
    pub(crate) fn retain_pending_completion(&self) {
        self.inner.ev.keepalive();
    }

    /// Releases the pin when a completion resolved without crossing the
    /// queue (local cancellation of an unconsumed job).
    pub(crate) fn release_pending_completion(&self) {
        self.inner.ev.keepalive_release();
    }

    /// Async-watcher callback: moves cross-thread completions into the
    /// fill queue.
    fn drain_cross_thread(&self) {
        let drained = {
            let mut queue = self.shared.queue.lock();
            std::mem::take(&mut *queue)
        };
        if drained.is_empty() {
            return;
        }
        trace!(completions = drained.len(), "cross-thread drain");
        let mut fills = self.inner.fills.borrow_mut();
        for fill in drained {
            fills.push_back(fill);
            self.inner.ev.keepalive_release();
        }
    }

    fn iterate(&self) -> Vec<Fill> {
        loop {
            let batch: Vec<Fill> = self.inner.fills.borrow_mut().drain(..).collect();
            if !batch.is_empty() {
                return batch;
            }
            match self.inner.ev.run_once() {
                LoopStatus::Progress => {}
                LoopStatus::NoMoreActiveWatchers => {
                    if self.inner.fills.borrow().is_empty() {
                        panic!(
                            "deadlock detected: every fiber is suspended but the \
                             event loop has no active watchers and no pending fills"
                        );
                    }
                }
            }
        }
    }
}

/// Posts worker completions into the scheduler from other threads.
#[derive(Clone)]
pub(crate) struct CompletionSender {
    shared: Arc<CrossThread>,
}

impl CompletionSender {
    /// Queues `fill` under the cross-thread mutex and wakes the loop.
    pub(crate) fn post(&self, fill: Fill) {
        {
            let mut queue = self.shared.queue.lock();
            queue.push(fill);
        }
        self.shared
            .notifier
            .get()
            .expect("notifier installed during run")
            .send();
    }
}
