//! Thin syscall wrappers.
//!
//! Raw descriptor syscalls used by the runtime, with EINTR retried and
//! failures reported as [`std::io::Error`]. Along with the poller
//! registration in [`crate::reactor::io`], this is where the crate's
//! `unsafe` lives.

use std::io;
use std::os::unix::io::RawFd;

fn cvt(res: libc::c_int) -> io::Result<libc::c_int> {
    if res < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(res)
    }
}

/// Creates a close-on-exec pipe, returning `(read_end, write_end)`.
pub fn pipe() -> io::Result<(RawFd, RawFd)> {
    let mut fds = [0 as libc::c_int; 2];
    cvt(unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) })?;
    Ok((fds[0], fds[1]))
}

/// Puts the descriptor into non-blocking mode.
pub fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = cvt(unsafe { libc::fcntl(fd, libc::F_GETFL) })?;
    cvt(unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) })?;
    Ok(())
}

/// Single `read(2)`, EINTR retried.
pub fn read(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
        if n >= 0 {
            return Ok(n as usize);
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(err);
        }
    }
}

/// Single `write(2)`, EINTR retried.
pub fn write(fd: RawFd, buf: &[u8]) -> io::Result<usize> {
    loop {
        let n = unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) };
        if n >= 0 {
            return Ok(n as usize);
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(err);
        }
    }
}

/// Closes the descriptor. Errors are ignored; close is best-effort.
pub fn close(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}

/// Opens a pollable descriptor for the given child process.
pub fn pidfd_open(pid: libc::pid_t) -> io::Result<RawFd> {
    let fd = unsafe { libc::syscall(libc::SYS_pidfd_open, pid, 0 as libc::c_uint) };
    if fd < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(fd as RawFd)
    }
}

/// Non-blocking reap: the raw wait status if the child has exited.
pub fn waitpid_nohang(pid: libc::pid_t) -> io::Result<Option<libc::c_int>> {
    let mut status: libc::c_int = 0;
    loop {
        let res = unsafe { libc::waitpid(pid, &mut status, libc::WNOHANG) };
        if res == pid {
            return Ok(Some(status));
        }
        if res == 0 {
            return Ok(None);
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(err);
        }
    }
}

/// Returns true when the error is `EAGAIN`/`EWOULDBLOCK`.
#[must_use]
pub fn is_would_block(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
}

/// Returns true when the error is `EBADF`.
#[must_use]
pub fn is_bad_fd(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EBADF)
}
