//! The event loop: readiness, timers, child exits, and cross-thread wakes.
//!
//! [`EventLoop`] drives one pass at a time through
//! [`run_once`](EventLoop::run_once): dispatch pending cross-thread
//! notifications, wait for descriptor readiness or the earliest timer
//! deadline, dispatch readiness callbacks, then fire due timers. The
//! scheduler's iterate step calls passes until fills appear.
//!
//! # Active-Watcher Accounting
//!
//! Readiness watchers and pending timers keep the loop alive. Async
//! notification watchers deliberately do not: they exist for the lifetime
//! of a run, and counting them would make deadlock detection vacuous.
//! Work that lives outside the loop (a pending worker job) pins the loop
//! through an explicit [`keepalive`](EventLoop::keepalive) ref instead.
//!
//! # Callback Reentrancy
//!
//! Callbacks run after the loop releases its internal borrows, so they are
//! free to register and destroy watchers, including their own.

pub mod child;
pub mod io;
pub mod notify;
pub mod timer;

use crate::reactor::io::Interest;
use polling::{Events, Poller};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::io as stdio;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

/// Outcome of one loop pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    /// The pass ran (it may or may not have dispatched callbacks).
    Progress,
    /// Nothing keeps the loop alive; a pass would block forever.
    NoMoreActiveWatchers,
}

struct IoReg {
    fd: RawFd,
    /// Directions currently armed with the poller. The poller registration
    /// is oneshot: any delivery disarms it until the owner re-arms.
    armed: Interest,
    callback: Rc<dyn Fn(Interest)>,
}

struct AsyncReg {
    pending: Arc<AtomicBool>,
    callback: Rc<dyn Fn()>,
}

struct TimerEntry {
    deadline: Instant,
    seq: u64,
    callback: Box<dyn FnOnce()>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}
impl Eq for TimerEntry {}
impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert so the earliest deadline wins,
        // with the sequence number breaking ties in insertion order.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct LoopInner {
    ios: HashMap<usize, IoReg>,
    next_key: usize,
    timers: BinaryHeap<TimerEntry>,
    timer_seq: u64,
    asyncs: Vec<AsyncReg>,
    keepalive: usize,
    events: Events,
}

impl LoopInner {
    fn active_count(&self) -> usize {
        self.ios.len() + self.timers.len() + self.keepalive
    }
}

/// A single-threaded event loop over a readiness poller.
///
/// Cloning is cheap and shares the loop. All methods except
/// [`notify`](crate::reactor::notify::Notifier::send) must be called from
/// the loop's own thread.
#[derive(Clone)]
pub struct EventLoop {
    inner: Rc<RefCell<LoopInner>>,
    poller: Arc<Poller>,
}

impl EventLoop {
    /// Creates a loop with no watchers.
    pub fn new() -> stdio::Result<Self> {
        Ok(Self {
            inner: Rc::new(RefCell::new(LoopInner {
                ios: HashMap::new(),
                next_key: 0,
                timers: BinaryHeap::new(),
                timer_seq: 0,
                asyncs: Vec::new(),
                keepalive: 0,
                events: Events::new(),
            })),
            poller: Arc::new(Poller::new()?),
        })
    }

    /// Monotonic timestamp used for all loop timing.
    #[must_use]
    pub fn now(&self) -> Instant {
        Instant::now()
    }

    /// Pins the loop alive for work it cannot see (an offloaded job whose
    /// completion will arrive through an async notification).
    pub fn keepalive(&self) {
        self.inner.borrow_mut().keepalive += 1;
    }

    /// Releases one [`keepalive`](Self::keepalive) ref.
    pub fn keepalive_release(&self) {
        let mut inner = self.inner.borrow_mut();
        debug_assert!(inner.keepalive > 0, "keepalive underflow");
        inner.keepalive = inner.keepalive.saturating_sub(1);
    }

    /// Schedules `callback` to run once, `after` from now.
    pub fn add_timer(&self, after: Duration, callback: impl FnOnce() + 'static) {
        let mut inner = self.inner.borrow_mut();
        let seq = inner.timer_seq;
        inner.timer_seq += 1;
        inner.timers.push(TimerEntry {
            deadline: Instant::now() + after,
            seq,
            callback: Box::new(callback),
        });
    }

    pub(crate) fn register_io(
        &self,
        fd: RawFd,
        callback: Rc<dyn Fn(Interest)>,
    ) -> stdio::Result<usize> {
        let key = {
            let mut inner = self.inner.borrow_mut();
            let key = inner.next_key;
            inner.next_key += 1;
            key
        };
        // Safety: the watcher owner guarantees the fd outlives the
        // registration; destroy() removes it before the fd closes.
        unsafe {
            self.poller.add(fd, polling::Event::none(key))?;
        }
        self.inner.borrow_mut().ios.insert(
            key,
            IoReg {
                fd,
                armed: Interest::NONE,
                callback,
            },
        );
        Ok(key)
    }

    pub(crate) fn rearm_io(&self, key: usize, interest: Interest) -> stdio::Result<()> {
        let fd = {
            let mut inner = self.inner.borrow_mut();
            let reg = inner
                .ios
                .get_mut(&key)
                .expect("rearm of a destroyed io watcher");
            if reg.armed == interest {
                return Ok(());
            }
            reg.armed = interest;
            reg.fd
        };
        let event = match (interest.read, interest.write) {
            (true, true) => polling::Event::all(key),
            (true, false) => polling::Event::readable(key),
            (false, true) => polling::Event::writable(key),
            (false, false) => polling::Event::none(key),
        };
        let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) };
        self.poller.modify(borrowed, event)
    }

    pub(crate) fn deregister_io(&self, key: usize) {
        let reg = self.inner.borrow_mut().ios.remove(&key);
        if let Some(reg) = reg {
            let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(reg.fd) };
            let _ = self.poller.delete(borrowed);
        }
    }

    pub(crate) fn add_async(&self, callback: impl Fn() + 'static) -> notify::Notifier {
        let pending = Arc::new(AtomicBool::new(false));
        self.inner.borrow_mut().asyncs.push(AsyncReg {
            pending: Arc::clone(&pending),
            callback: Rc::new(callback),
        });
        notify::Notifier::new(pending, Arc::clone(&self.poller))
    }

    /// Runs pending async callbacks; true if any ran.
    fn dispatch_asyncs(&self) -> bool {
        let ready: Vec<Rc<dyn Fn()>> = {
            let inner = self.inner.borrow();
            inner
                .asyncs
                .iter()
                .filter(|a| a.pending.swap(false, AtomicOrdering::AcqRel))
                .map(|a| Rc::clone(&a.callback))
                .collect()
        };
        let any = !ready.is_empty();
        for callback in ready {
            callback();
        }
        any
    }

    /// Advances the loop by one pass.
    ///
    /// Blocks until readiness arrives, the earliest timer is due, or an
    /// async notification lands. Returns
    /// [`LoopStatus::NoMoreActiveWatchers`] without blocking when nothing
    /// keeps the loop alive.
    pub fn run_once(&self) -> LoopStatus {
        if self.dispatch_asyncs() {
            return LoopStatus::Progress;
        }

        let timeout = {
            let inner = self.inner.borrow();
            if inner.active_count() == 0 {
                return LoopStatus::NoMoreActiveWatchers;
            }
            inner
                .timers
                .peek()
                .map(|t| t.deadline.saturating_duration_since(Instant::now()))
        };

        let mut events = {
            let mut inner = self.inner.borrow_mut();
            std::mem::replace(&mut inner.events, Events::new())
        };
        events.clear();
        match self.poller.wait(&mut events, timeout) {
            Ok(_) => {}
            Err(err) if err.kind() == stdio::ErrorKind::Interrupted => {}
            Err(err) => panic!("event loop poll failed: {err}"),
        }

        let fired: Vec<(Rc<dyn Fn(Interest)>, Interest)> = {
            let mut inner = self.inner.borrow_mut();
            events
                .iter()
                .filter_map(|event| {
                    inner.ios.get_mut(&event.key).map(|reg| {
                        // Oneshot delivery: the kernel side is disarmed now.
                        reg.armed = Interest::NONE;
                        (
                            Rc::clone(&reg.callback),
                            Interest {
                                read: event.readable,
                                write: event.writable,
                            },
                        )
                    })
                })
                .collect()
        };
        self.inner.borrow_mut().events = events;
        trace!(io = fired.len(), "loop pass");
        for (callback, ready) in fired {
            callback(ready);
        }

        loop {
            let due = {
                let mut inner = self.inner.borrow_mut();
                let is_due = inner
                    .timers
                    .peek()
                    .is_some_and(|t| t.deadline <= Instant::now());
                if is_due {
                    inner.timers.pop()
                } else {
                    None
                }
            };
            match due {
                Some(entry) => (entry.callback)(),
                None => break,
            }
        }

        self.dispatch_asyncs();
        LoopStatus::Progress
    }
}
