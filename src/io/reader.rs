//! The buffered reader.

use crate::buffer::BipBuffer;
use crate::fd::Fd;
use crate::io::{make_room, DEFAULT_BUF_CAPACITY};
use crate::sys;
use std::io;

/// What a reader can currently offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Available {
    /// Committed bytes ready in the staging buffer.
    Bytes(usize),
    /// End of stream observed and the buffer is drained.
    Eof,
}

/// Buffered reader over a non-blocking descriptor.
///
/// The reader has a single logical consumer:
/// [`refill`](Self::refill) pulls bytes from the descriptor into the
/// staging buffer, [`buffer`](Self::buffer) exposes the oldest contiguous
/// bytes, [`consume`](Self::consume) discards what the caller has used.
pub struct Reader {
    staging: BipBuffer,
    fd: Fd,
    eof: bool,
    closed: bool,
}

impl Reader {
    pub(crate) fn new(fd: Fd) -> Self {
        Self {
            staging: BipBuffer::new(DEFAULT_BUF_CAPACITY),
            fd,
            eof: false,
            closed: false,
        }
    }

    /// The oldest contiguous committed bytes.
    ///
    /// # Panics
    ///
    /// Panics when the staging buffer is empty; check
    /// [`available`](Self::available) first.
    #[must_use]
    pub fn buffer(&self) -> &[u8] {
        assert!(!self.closed, "Reader::buffer on a closed reader");
        self.staging
            .peek()
            .expect("Reader::buffer on an empty buffer")
    }

    /// Discards `count` bytes from the front of the staging buffer.
    pub fn consume(&mut self, count: usize) {
        assert!(!self.closed, "Reader::consume on a closed reader");
        self.staging.junk(count);
    }

    /// Buffered byte count, or [`Available::Eof`] once the end of stream
    /// has been observed and the buffer is drained.
    #[must_use]
    pub fn available(&self) -> Available {
        assert!(!self.closed, "Reader::available on a closed reader");
        if self.eof && self.staging.is_empty() {
            Available::Eof
        } else {
            Available::Bytes(self.staging.len())
        }
    }

    /// Ensures room for `size` more bytes, then awaits readability and
    /// issues a single non-blocking read into the reservation.
    ///
    /// A zero-byte read or `EBADF` marks end of stream; `EAGAIN` re-awaits
    /// readability transparently. A no-op once end of stream is observed.
    pub async fn refill(&mut self, size: usize) -> io::Result<()> {
        assert!(!self.closed, "Reader::refill on a closed reader");
        if self.eof {
            return Ok(());
        }
        make_room(&mut self.staging, size);
        loop {
            self.fd.readable().await;
            let fd = self.fd.raw();
            let outcome = {
                let slice = self
                    .staging
                    .reserve(size)
                    .expect("room was made for the refill reservation");
                sys::read(fd, slice)
            };
            match outcome {
                Ok(0) => {
                    self.eof = true;
                    self.staging.commit(0);
                    return Ok(());
                }
                Ok(count) => {
                    self.staging.commit(count);
                    return Ok(());
                }
                Err(err) if sys::is_would_block(&err) => {
                    // Readiness went stale; clear the reservation and
                    // re-arm.
                    self.staging.commit(0);
                }
                Err(err) if sys::is_bad_fd(&err) => {
                    self.eof = true;
                    self.staging.commit(0);
                    return Ok(());
                }
                Err(err) => {
                    self.staging.commit(0);
                    return Err(err);
                }
            }
        }
    }

    /// Releases the reader's ownership of the descriptor.
    ///
    /// # Panics
    ///
    /// Panics on a second close.
    pub fn close(&mut self) {
        assert!(!self.closed, "Reader::close on a closed reader");
        self.closed = true;
        self.fd.release();
    }
}
