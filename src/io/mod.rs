//! Buffered descriptor I/O.
//!
//! [`Reader`] and [`Writer`] stage bytes in a [`BipBuffer`] and move them
//! across a non-blocking descriptor owned by an [`Fd`]. Both sides share
//! one room policy: try a direct reservation; compress when the
//! front-reclaimable bytes cover the need; otherwise grow the staging
//! buffer (growth is monotone — a stream's buffer never shrinks).
//!
//! Streams are created with [`pipe`], [`reader`], [`writer`], or
//! [`create_rw`] (a duplex descriptor shared by both sides, refcount 2)
//! and destroyed exactly once via `close`; any operation on a closed
//! stream is a programmer error.

mod reader;
mod writer;

pub use reader::{Available, Reader};
pub use writer::{Prepared, Writer};

use crate::buffer::BipBuffer;
use crate::fd::Fd;
use crate::reactor::io::Interest;
use crate::sys;
use std::io;
use std::os::unix::io::RawFd;

/// Initial staging capacity for readers and writers.
pub const DEFAULT_BUF_CAPACITY: usize = 4096;

/// Makes room for a contiguous reservation of `len` bytes:
/// reserve → compress → resize, in that order.
pub(crate) fn make_room(staging: &mut BipBuffer, len: usize) {
    if staging.can_reserve(len) {
        return;
    }
    if staging.compress_gain() >= len {
        staging.compress();
        if staging.can_reserve(len) {
            return;
        }
    }
    let target = (staging.len() + len).max(staging.capacity());
    staging.resize(target);
    assert!(
        staging.can_reserve(len),
        "resized staging buffer must fit the reservation"
    );
}

/// Creates a close-on-exec, non-blocking pipe as a buffered pair.
pub fn pipe() -> io::Result<(Reader, Writer)> {
    let (read_end, write_end) = sys::pipe()?;
    let cleanup = |err| {
        sys::close(read_end);
        sys::close(write_end);
        err
    };
    sys::set_nonblocking(read_end).map_err(cleanup)?;
    sys::set_nonblocking(write_end).map_err(cleanup)?;
    let read_fd = Fd::create(1, Interest::READ, read_end).map_err(cleanup)?;
    let write_fd = match Fd::create(1, Interest::WRITE, write_end) {
        Ok(fd) => fd,
        Err(err) => {
            read_fd.release();
            return Err(err);
        }
    };
    Ok((Reader::new(read_fd), Writer::new(write_fd)))
}

/// Wraps a read-only descriptor. The descriptor is put into non-blocking
/// mode and owned by the returned stream (refcount 1).
pub fn reader(fd: RawFd) -> io::Result<Reader> {
    sys::set_nonblocking(fd)?;
    Ok(Reader::new(Fd::create(1, Interest::READ, fd)?))
}

/// Wraps a write-only descriptor (refcount 1).
pub fn writer(fd: RawFd) -> io::Result<Writer> {
    sys::set_nonblocking(fd)?;
    Ok(Writer::new(Fd::create(1, Interest::WRITE, fd)?))
}

/// Wraps a duplex descriptor as a buffered pair sharing one handle with
/// refcount 2; closing both sides closes the descriptor.
pub fn create_rw(fd: RawFd) -> io::Result<(Reader, Writer)> {
    sys::set_nonblocking(fd)?;
    let shared = Fd::create(2, Interest::BOTH, fd)?;
    Ok((Reader::new(shared.clone()), Writer::new(shared)))
}
