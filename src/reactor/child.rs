//! Child-exit watchers.
//!
//! A child watcher polls the process's pidfd for readability and reaps it
//! with a non-blocking `waitpid` once it exits, delivering the raw wait
//! status to the callback. The watcher is one-shot: it destroys itself and
//! closes the pidfd after delivery.

use crate::reactor::io::{Interest, IoWatcher};
use crate::reactor::EventLoop;
use crate::sys;
use std::cell::RefCell;
use std::io;
use std::rc::Rc;

/// Watches `pid` and invokes `callback` with the raw wait status when the
/// child exits.
pub fn watch_exit(
    ev: &EventLoop,
    pid: libc::pid_t,
    callback: impl FnOnce(libc::c_int) + 'static,
) -> io::Result<()> {
    let pidfd = sys::pidfd_open(pid)?;
    // The callback needs to destroy its own watcher; the watcher slot is
    // filled after construction (late-initialised back-reference).
    let slot: Rc<RefCell<Option<IoWatcher>>> = Rc::new(RefCell::new(None));
    let slot_in_callback = Rc::clone(&slot);
    let callback = RefCell::new(Some(callback));

    let watcher = IoWatcher::new(ev, pidfd, move |_ready| {
        match sys::waitpid_nohang(pid) {
            Ok(Some(status)) => {
                if let Some(watcher) = slot_in_callback.borrow_mut().take() {
                    watcher.destroy();
                }
                sys::close(pidfd);
                if let Some(deliver) = callback.borrow_mut().take() {
                    deliver(status);
                }
            }
            // Spurious wake before the exit is visible: wait again.
            Ok(None) => {
                if let Some(watcher) = slot_in_callback.borrow().as_ref() {
                    let _ = watcher.set_interest(Interest::READ);
                }
            }
            Err(_) => {
                if let Some(watcher) = slot_in_callback.borrow_mut().take() {
                    watcher.destroy();
                }
                sys::close(pidfd);
            }
        }
    })?;
    watcher.set_interest(Interest::READ)?;
    *slot.borrow_mut() = Some(watcher);
    Ok(())
}
