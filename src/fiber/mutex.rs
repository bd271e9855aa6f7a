//! FIFO fiber mutex.
//!
//! Mutual exclusion between fibers on the loop thread. Waiters are served
//! in arrival order; the lock hands off directly to the next waiter on
//! release, so a released lock cannot be stolen by a later arrival.

use crate::fiber::Ivar;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::rc::Rc;

struct MutexInner {
    locked: bool,
    waiters: VecDeque<Ivar<()>>,
}

/// A fiber mutex. Cloning shares the lock.
#[derive(Clone)]
pub struct Mutex {
    inner: Rc<RefCell<MutexInner>>,
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Mutex {
    /// Creates an unlocked mutex.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(MutexInner {
                locked: false,
                waiters: VecDeque::new(),
            })),
        }
    }

    /// Acquires the lock, suspending until it is available.
    pub async fn lock(&self) -> MutexGuard {
        let waiter = {
            let mut inner = self.inner.borrow_mut();
            if inner.locked {
                let ivar = Ivar::new();
                inner.waiters.push_back(ivar.clone());
                Some(ivar)
            } else {
                inner.locked = true;
                None
            }
        };
        if let Some(ivar) = waiter {
            // The releasing fiber hands the lock over before filling.
            ivar.read().await;
        }
        MutexGuard {
            mutex: self.clone(),
        }
    }

    /// Runs `body` with the lock held, releasing it on scope exit.
    pub async fn with_lock<R, F, Fut>(&self, body: F) -> R
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        let _guard = self.lock().await;
        body().await
    }

    fn unlock(&self) {
        let next = {
            let mut inner = self.inner.borrow_mut();
            debug_assert!(inner.locked, "unlock of an unlocked fiber mutex");
            match inner.waiters.pop_front() {
                Some(next) => Some(next),
                None => {
                    inner.locked = false;
                    None
                }
            }
        };
        if let Some(next) = next {
            next.fill(());
        }
    }
}

/// RAII guard; releases the lock on drop.
pub struct MutexGuard {
    mutex: Mutex,
}

impl Drop for MutexGuard {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}
