//! Child-process reaping.

use crate::fiber::Ivar;
use crate::reactor::child;
use crate::scheduler::Scheduler;
use std::io;

/// How a reaped child terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Normal exit with the given code.
    Exited(i32),
    /// Terminated by the given signal.
    Signaled(i32),
}

/// Suspends until the child exits, reaping it and returning its status.
pub async fn wait(pid: libc::pid_t) -> io::Result<ExitStatus> {
    let sched = Scheduler::current();
    let ivar: Ivar<libc::c_int> = Ivar::new();
    let on_exit = sched.clone();
    let to_fill = ivar.clone();
    child::watch_exit(sched.ev(), pid, move |status| on_exit.fill(&to_fill, status))?;
    let raw = ivar.read().await;
    Ok(decode(raw))
}

fn decode(status: libc::c_int) -> ExitStatus {
    if libc::WIFEXITED(status) {
        ExitStatus::Exited(libc::WEXITSTATUS(status))
    } else if libc::WIFSIGNALED(status) {
        ExitStatus::Signaled(libc::WTERMSIG(status))
    } else {
        ExitStatus::Exited(status)
    }
}
