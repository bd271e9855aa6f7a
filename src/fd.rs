//! Per-descriptor readiness waiting.
//!
//! An [`Fd`] owns an OS descriptor and its readiness watcher through a
//! [`Refcounted`] cell. Fibers suspend on [`readable`](Fd::readable) /
//! [`writable`](Fd::writable); each readiness edge resumes at most one
//! waiter per direction, in FIFO order. Poller interest follows waiter
//! occupancy: a direction nobody waits on is disarmed, so an always-ready
//! descriptor cannot spin the loop, and the next await re-registers
//! interest naturally.
//!
//! The last [`release`](Fd::release) stops and destroys the watcher, then
//! closes the descriptor, in that order.

use crate::fiber::Ivar;
use crate::handle::Refcounted;
use crate::reactor::io::{Interest, IoWatcher};
use crate::scheduler::Scheduler;
use crate::sys;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use tracing::trace;

struct FdShared {
    mask: Interest,
    sched: Scheduler,
    read_waiters: RefCell<VecDeque<Ivar<()>>>,
    write_waiters: RefCell<VecDeque<Ivar<()>>>,
    /// Late-initialised: the watcher's callback holds this state, and the
    /// state holds the watcher.
    watcher: RefCell<Option<IoWatcher>>,
}

impl FdShared {
    /// Readiness callback: resume at most one waiter per ready direction,
    /// then re-arm for whoever is still waiting.
    fn dispatch(&self, ready: Interest) {
        trace!(read = ready.read, write = ready.write, "fd readiness");
        if ready.read {
            if let Some(ivar) = self.read_waiters.borrow_mut().pop_front() {
                self.sched.fill(&ivar, ());
            }
        }
        if ready.write {
            if let Some(ivar) = self.write_waiters.borrow_mut().pop_front() {
                self.sched.fill(&ivar, ());
            }
        }
        self.rearm();
    }

    fn rearm(&self) {
        let desired = Interest {
            read: !self.read_waiters.borrow().is_empty(),
            write: !self.write_waiters.borrow().is_empty(),
        };
        if let Some(watcher) = self.watcher.borrow().as_ref() {
            watcher
                .set_interest(desired)
                .expect("arm descriptor watcher");
        }
    }
}

/// A reference-counted descriptor with readiness waiting.
///
/// Clones share the descriptor and its release count; the count is fixed
/// at creation (`create_rw`-style sharing uses a count of 2 and one
/// `release` per logical owner).
#[derive(Clone)]
pub struct Fd {
    handle: Refcounted<RawFd>,
    shared: Rc<FdShared>,
}

impl Fd {
    /// Takes ownership of `fd`, registering a readiness watcher for the
    /// directions in `mask`. `refs` is the number of `release` calls that
    /// will close the descriptor.
    ///
    /// Must be called on the loop thread, inside a run.
    pub fn create(refs: usize, mask: Interest, fd: RawFd) -> io::Result<Self> {
        let sched = Scheduler::current();
        let shared = Rc::new(FdShared {
            mask,
            sched: sched.clone(),
            read_waiters: RefCell::new(VecDeque::new()),
            write_waiters: RefCell::new(VecDeque::new()),
            watcher: RefCell::new(None),
        });
        let in_callback = Rc::clone(&shared);
        let watcher = IoWatcher::new(sched.ev(), fd, move |ready| in_callback.dispatch(ready))?;
        *shared.watcher.borrow_mut() = Some(watcher);

        let in_finalizer = Rc::clone(&shared);
        let handle = Refcounted::new(
            refs,
            move |fd| {
                if let Some(watcher) = in_finalizer.watcher.borrow_mut().take() {
                    watcher.destroy();
                }
                sys::close(fd);
            },
            fd,
        );
        Ok(Self { handle, shared })
    }

    /// The raw descriptor.
    ///
    /// # Panics
    ///
    /// Panics once the handle is fully released.
    #[must_use]
    pub fn raw(&self) -> RawFd {
        *self.handle.get().expect("descriptor used after close")
    }

    /// Returns true while the descriptor has not been fully released.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.handle.is_open()
    }

    /// Suspends until the descriptor is ready to read.
    pub async fn readable(&self) {
        self.wait(Interest::READ).await;
    }

    /// Suspends until the descriptor is ready to write.
    pub async fn writable(&self) {
        self.wait(Interest::WRITE).await;
    }

    async fn wait(&self, direction: Interest) {
        assert!(self.is_open(), "descriptor awaited after close");
        assert!(
            (direction.read && self.shared.mask.read)
                || (direction.write && self.shared.mask.write),
            "descriptor awaited outside its event mask"
        );
        let ivar = Ivar::new();
        if direction.read {
            self.shared.read_waiters.borrow_mut().push_back(ivar.clone());
        } else {
            self.shared.write_waiters.borrow_mut().push_back(ivar.clone());
        }
        self.shared.rearm();
        ivar.read().await;
    }

    /// Drops one ownership; the last release destroys the watcher and
    /// closes the descriptor. Releasing a closed handle is a no-op.
    pub fn release(&self) {
        self.handle.release();
    }
}
