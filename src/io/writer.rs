//! The buffered writer.

use crate::buffer::BipBuffer;
use crate::fd::Fd;
use crate::fiber;
use crate::io::{make_room, DEFAULT_BUF_CAPACITY};
use crate::sys;
use std::cell::{RefCell, RefMut};
use std::io;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

struct WriterState {
    staging: BipBuffer,
    closed: bool,
}

/// Buffered writer over a non-blocking descriptor.
///
/// Bytes are staged two-phase: [`prepare`](Self::prepare) reserves a
/// contiguous slice (growing the staging buffer when needed),
/// [`Prepared::commit`] publishes what was written.
/// [`flush`](Self::flush) drains the staged bytes to the descriptor.
///
/// Cloning shares the stream; [`with_transaction`](Self::with_transaction)
/// serialises transaction scopes between fibers through a fiber mutex.
#[derive(Clone)]
pub struct Writer {
    state: Rc<RefCell<WriterState>>,
    fd: Fd,
    lock: fiber::mutex::Mutex,
}

impl Writer {
    pub(crate) fn new(fd: Fd) -> Self {
        Self {
            state: Rc::new(RefCell::new(WriterState {
                staging: BipBuffer::new(DEFAULT_BUF_CAPACITY),
                closed: false,
            })),
            fd,
            lock: fiber::mutex::Mutex::new(),
        }
    }

    /// Reserves `len` bytes of contiguous staging space for direct
    /// writing.
    ///
    /// Room is made by the shared policy — direct reservation, then
    /// compression when the reclaimable front covers `len`, then growth
    /// to `length + len` — so preparation never fails.
    pub fn prepare(&self, len: usize) -> Prepared<'_> {
        let mut state = self.state.borrow_mut();
        assert!(!state.closed, "Writer::prepare on a closed writer");
        make_room(&mut state.staging, len);
        let reserved = state.staging.reserve(len);
        debug_assert!(reserved.is_some());
        Prepared {
            state,
            committed: None,
        }
    }

    /// Stages `bytes` wholesale: prepare, copy, commit.
    pub fn write(&self, bytes: &[u8]) {
        let mut prepared = self.prepare(bytes.len());
        prepared.copy_from_slice(bytes);
        prepared.commit(bytes.len());
    }

    /// Runs `body` with an exclusive `max`-byte transaction scope.
    ///
    /// The writer mutex is acquired first and released on scope exit;
    /// whatever `body` committed is published when the scope closes.
    pub async fn with_transaction<R, F>(&self, max: usize, body: F) -> R
    where
        F: FnOnce(&mut Prepared<'_>) -> R,
    {
        let _guard = self.lock.lock().await;
        let mut prepared = self.prepare(max);
        body(&mut prepared)
    }

    /// Number of staged, unflushed bytes.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.borrow().staging.len()
    }

    /// Drains the staged bytes: repeatedly takes the oldest committed
    /// slice, awaits writability, and issues one non-blocking write,
    /// retrying transparently on `EAGAIN`. Returns once the staging
    /// buffer is empty.
    pub async fn flush(&self) -> io::Result<()> {
        loop {
            {
                let state = self.state.borrow();
                assert!(!state.closed, "Writer::flush on a closed writer");
                if state.staging.peek().is_none() {
                    return Ok(());
                }
            }
            self.fd.writable().await;
            let outcome = {
                let state = self.state.borrow();
                match state.staging.peek() {
                    None => return Ok(()),
                    Some(slice) => sys::write(self.fd.raw(), slice),
                }
            };
            match outcome {
                Ok(count) => self.state.borrow_mut().staging.junk(count),
                Err(err) if sys::is_would_block(&err) => {}
                Err(err) => return Err(err),
            }
        }
    }

    /// Releases the writer's ownership of the descriptor. Staged bytes
    /// that were never flushed are discarded.
    ///
    /// # Panics
    ///
    /// Panics on a second close.
    pub fn close(&self) {
        {
            let mut state = self.state.borrow_mut();
            assert!(!state.closed, "Writer::close on a closed writer");
            state.closed = true;
        }
        self.fd.release();
    }
}

/// An open reservation into a writer's staging buffer.
///
/// Dereferences to the reserved bytes. [`commit`](Self::commit) marks how
/// many of them to publish; publication happens when the guard drops, and
/// an uncommitted guard publishes nothing.
pub struct Prepared<'a> {
    state: RefMut<'a, WriterState>,
    committed: Option<usize>,
}

impl Prepared<'_> {
    /// Marks `len` bytes of the reservation for publication on drop.
    ///
    /// # Panics
    ///
    /// Panics on a second commit.
    pub fn commit(&mut self, len: usize) {
        assert!(
            self.committed.is_none(),
            "Prepared::commit: reservation committed twice"
        );
        self.committed = Some(len);
    }
}

impl Deref for Prepared<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.state
            .staging
            .reserved()
            .expect("prepared guard holds the reservation")
    }
}

impl DerefMut for Prepared<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.state
            .staging
            .reserved_mut()
            .expect("prepared guard holds the reservation")
    }
}

impl Drop for Prepared<'_> {
    fn drop(&mut self) {
        self.state.staging.commit(self.committed.unwrap_or(0));
    }
}
