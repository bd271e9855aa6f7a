//! Evloom: a cooperative fiber I/O runtime.
//!
//! # Overview
//!
//! Evloom bridges a poller-backed event loop with user-level fibers driven by
//! a single-threaded executor. Fibers suspend on write-once promises
//! ("ivars"); the event loop resolves those promises in batches ("fills") at
//! iterate boundaries. Worker threads never touch fiber state directly: they
//! push completions through a mutex-guarded queue and wake the loop with a
//! thread-safe notification.
//!
//! # Core Pieces
//!
//! - **Bip-buffer staging**: all descriptor I/O moves through a bipartite
//!   circular byte buffer with a reserve/commit/peek/junk discipline
//! - **Single-threaded cooperative core**: fibers run on the loop thread and
//!   yield only at explicit suspension points
//! - **Explicit thread boundary**: offloaded jobs complete through the
//!   cross-thread queue and the loop's async notification, never by mutating
//!   fiber state from another thread
//! - **Refcounted descriptors**: each fd is owned by a handle whose finalizer
//!   stops the watcher, destroys it, and closes the descriptor, in that order
//!
//! # Module Structure
//!
//! - [`buffer`]: bipartite circular byte buffer (the I/O staging area)
//! - [`handle`]: reference-counted owner with an explicit finalizer
//! - [`reactor`]: the event loop (readiness, timers, child exits, wakeups)
//! - [`fiber`]: promises, the executor, fiber mutexes, pools, fork-join
//! - [`scheduler`]: fill queue, cross-thread completions, the iterate step
//! - [`fd`]: per-descriptor readiness waiting with refcounted release
//! - [`time`]: one-shot sleeps and the fixed-delay timer wheel
//! - [`worker`]: single-thread offload for blocking work
//! - [`io`]: buffered [`Reader`](io::Reader) and [`Writer`](io::Writer)
//! - [`net`]: non-blocking connect and a session-per-connection server
//! - [`process`]: child-process reaping

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]

pub mod buffer;
pub mod fd;
pub mod fiber;
pub mod handle;
pub mod io;
pub mod net;
pub mod process;
pub mod reactor;
pub mod scheduler;
mod sys;
pub mod time;
pub mod worker;

pub use buffer::BipBuffer;
pub use fd::Fd;
pub use fiber::{join, spawn, Ivar};
pub use scheduler::Scheduler;
pub use time::{sleep, Wheel};
pub use worker::Worker;
