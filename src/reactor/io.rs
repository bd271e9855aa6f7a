//! Descriptor readiness watchers.

use crate::reactor::EventLoop;
use std::cell::Cell;
use std::io;
use std::os::unix::io::RawFd;
use std::rc::Rc;

/// A set of readiness directions: an interest mask when arming, the ready
/// set when dispatching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest {
    /// Read readiness.
    pub read: bool,
    /// Write readiness.
    pub write: bool,
}

impl Interest {
    /// Neither direction.
    pub const NONE: Self = Self {
        read: false,
        write: false,
    };
    /// Read only.
    pub const READ: Self = Self {
        read: true,
        write: false,
    };
    /// Write only.
    pub const WRITE: Self = Self {
        read: false,
        write: true,
    };
    /// Both directions.
    pub const BOTH: Self = Self {
        read: true,
        write: true,
    };

    /// True when no direction is set.
    #[must_use]
    pub fn is_empty(self) -> bool {
        !self.read && !self.write
    }
}

/// A readiness watcher for one descriptor.
///
/// The watcher starts disarmed; [`set_interest`](Self::set_interest) arms
/// the directions to watch. Delivery is oneshot: after the callback runs,
/// the owner re-arms whatever it still cares about. The callback receives
/// the ready directions.
pub struct IoWatcher {
    ev: EventLoop,
    key: usize,
    alive: Cell<bool>,
}

impl IoWatcher {
    /// Registers `fd` with the loop. The fd must outlive the watcher.
    pub fn new(
        ev: &EventLoop,
        fd: RawFd,
        callback: impl Fn(Interest) + 'static,
    ) -> io::Result<Self> {
        let key = ev.register_io(fd, Rc::new(callback))?;
        Ok(Self {
            ev: ev.clone(),
            key,
            alive: Cell::new(true),
        })
    }

    /// Arms exactly the given directions (replacing the previous set).
    pub fn set_interest(&self, interest: Interest) -> io::Result<()> {
        assert!(self.alive.get(), "set_interest on a destroyed watcher");
        self.ev.rearm_io(self.key, interest)
    }

    /// Stops and unregisters the watcher. Idempotent.
    pub fn destroy(&self) {
        if self.alive.replace(false) {
            self.ev.deregister_io(self.key);
        }
    }
}
