//! Write-once promise cells.
//!
//! An [`Ivar`] is filled exactly once; fibers suspend on
//! [`read`](Ivar::read) until the value arrives. Reads clone, so any
//! number of fibers may wait on the same cell.
//!
//! The cell itself is `Send` (its state sits behind a mutex) so that a
//! completed worker job can carry its promise across the thread boundary
//! inside a fill; filling and reading still happen on the loop thread.

use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

enum State<T> {
    Empty { wakers: Vec<Waker> },
    Full(T),
}

/// A single-fire promise.
pub struct Ivar<T> {
    state: Arc<Mutex<State<T>>>,
}

impl<T> Clone for Ivar<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> Default for Ivar<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Ivar<T> {
    /// Creates an empty cell.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::Empty { wakers: Vec::new() })),
        }
    }

    /// Resolves the cell, waking all readers.
    ///
    /// # Panics
    ///
    /// Panics if the cell is already full; a promise fires at most once.
    pub fn fill(&self, value: T) {
        assert!(self.try_fill(value), "Ivar::fill: promise filled twice");
    }

    /// Resolves the cell if still empty; returns false (dropping `value`)
    /// when a fill already won.
    pub fn try_fill(&self, value: T) -> bool {
        let wakers = {
            let mut state = self.state.lock();
            match &mut *state {
                State::Full(_) => return false,
                State::Empty { wakers } => {
                    let wakers = std::mem::take(wakers);
                    *state = State::Full(value);
                    wakers
                }
            }
        };
        for waker in wakers {
            waker.wake();
        }
        true
    }

    /// Returns true once the cell has been filled.
    #[must_use]
    pub fn is_full(&self) -> bool {
        matches!(&*self.state.lock(), State::Full(_))
    }
}

impl<T: Clone> Ivar<T> {
    /// The value, without suspending, if already filled.
    #[must_use]
    pub fn peek(&self) -> Option<T> {
        match &*self.state.lock() {
            State::Full(value) => Some(value.clone()),
            State::Empty { .. } => None,
        }
    }

    /// Suspends the calling fiber until the cell is filled.
    pub fn read(&self) -> Read<T> {
        Read { ivar: self.clone() }
    }
}

/// Future returned by [`Ivar::read`].
pub struct Read<T> {
    ivar: Ivar<T>,
}

impl<T: Clone> Future for Read<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let mut state = self.ivar.state.lock();
        match &mut *state {
            State::Full(value) => Poll::Ready(value.clone()),
            State::Empty { wakers } => {
                if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}
