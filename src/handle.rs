//! Reference-counted owner with an explicit finalizer.
//!
//! [`Refcounted`] is a small sharing helper for resources whose teardown
//! must happen exactly once and in a controlled order (descriptors, loop
//! watchers). Unlike `Rc`, release is explicit: the creator decides how
//! many logical owners exist up front, and the finalizer runs when the
//! count reaches zero.
//!
//! Finalizers must be idempotent in effect and must not call back into
//! [`release`](Refcounted::release) on the same handle.

use std::cell::{Ref, RefCell};
use std::rc::Rc;

struct Slot<T> {
    count: usize,
    value: Option<T>,
    finalize: Option<Box<dyn FnOnce(T)>>,
}

/// A shared owner of `T` with an explicit release count.
///
/// Clones share the same count. Once the count reaches zero the handle is
/// closed: the finalizer has consumed the value and [`get`](Self::get)
/// returns `None`.
pub struct Refcounted<T> {
    slot: Rc<RefCell<Slot<T>>>,
}

impl<T> Clone for Refcounted<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
        }
    }
}

impl<T> Refcounted<T> {
    /// Creates a handle owned by `count` logical owners.
    ///
    /// `finalize` runs exactly once, when the `count`-th
    /// [`release`](Self::release) arrives.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero.
    pub fn new(count: usize, finalize: impl FnOnce(T) + 'static, value: T) -> Self {
        assert!(count > 0, "Refcounted::new: zero initial count");
        Self {
            slot: Rc::new(RefCell::new(Slot {
                count,
                value: Some(value),
                finalize: Some(Box::new(finalize)),
            })),
        }
    }

    /// Borrows the value, or `None` once the handle is closed.
    #[must_use]
    pub fn get(&self) -> Option<Ref<'_, T>> {
        Ref::filter_map(self.slot.borrow(), |slot| slot.value.as_ref()).ok()
    }

    /// Returns true while the handle has not been fully released.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.slot.borrow().value.is_some()
    }

    /// Drops one ownership; the last release runs the finalizer.
    ///
    /// Releasing an already-closed handle is a silent no-op.
    pub fn release(&self) {
        let finalize = {
            let mut slot = self.slot.borrow_mut();
            if slot.value.is_none() {
                return;
            }
            slot.count -= 1;
            if slot.count > 0 {
                return;
            }
            let value = slot.value.take().expect("open handle holds a value");
            let finalize = slot.finalize.take().expect("finalizer runs once");
            Some((finalize, value))
        };
        if let Some((finalize, value)) = finalize {
            finalize(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn finalizer_runs_once_at_zero() {
        let fired = Rc::new(Cell::new(0));
        let fired2 = Rc::clone(&fired);
        let handle = Refcounted::new(2, move |v: u32| {
            assert_eq!(v, 7);
            fired2.set(fired2.get() + 1);
        }, 7);
        let other = handle.clone();

        assert_eq!(*handle.get().expect("open"), 7);
        handle.release();
        assert!(other.is_open());
        assert_eq!(fired.get(), 0);

        other.release();
        assert!(handle.get().is_none());
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn release_after_close_is_noop() {
        let handle = Refcounted::new(1, |(): ()| {}, ());
        handle.release();
        handle.release();
        assert!(!handle.is_open());
    }
}
