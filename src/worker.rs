//! Worker-thread offload for blocking work.
//!
//! A [`Worker`] owns one OS thread that evaluates submitted thunks in FIFO
//! order, isolated from the cooperative core. The worker never touches
//! fiber state: each completion is posted into the scheduler's
//! cross-thread queue under its mutex, and the loop is woken through the
//! async notification. The loop thread resolves the promise on its next
//! iterate step.
//!
//! # Cancellation
//!
//! [`cancel`](Worker::cancel) drops a job the worker has not yet consumed
//! and resolves its promise with [`JobError::Cancelled`]. A job already
//! running cannot be interrupted; long-running thunks must check for
//! cancellation themselves.

use crate::fiber::{Fill, Ivar};
use crate::scheduler::Scheduler;
use crossbeam_queue::SegQueue;
use std::backtrace::Backtrace;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use thiserror::Error;
use tracing::debug;

/// Why an offloaded job produced no value.
#[derive(Debug, Clone, Error)]
pub enum JobError {
    /// The thunk panicked on the worker thread.
    #[error("worker job panicked: {message}")]
    Panicked {
        /// The panic payload, rendered as text.
        message: String,
        /// Backtrace captured where the panic was caught.
        backtrace: String,
    },
    /// The job was cancelled before the worker consumed it.
    #[error("worker job cancelled")]
    Cancelled,
}

struct WorkerShared {
    queue: SegQueue<Job>,
    shutdown: AtomicBool,
    mutex: Mutex<()>,
    condvar: Condvar,
}

struct Job {
    /// Set by whichever side gets to the job first: the worker (about to
    /// run it) or a cancellation (about to drop it).
    claimed: Arc<AtomicBool>,
    run: Box<dyn FnOnce() + Send>,
}

/// Handle to a submitted job.
pub struct WorkerTask<T> {
    ivar: Ivar<Result<T, JobError>>,
    claimed: Arc<AtomicBool>,
}

impl<T: Clone + Send + 'static> WorkerTask<T> {
    /// Suspends until the job completes, panics, or is cancelled.
    pub async fn wait(&self) -> Result<T, JobError> {
        self.ivar.read().await
    }
}

/// A single-thread worker queue.
///
/// Created inside a run; closed explicitly with [`close`](Self::close),
/// which drains pending jobs first. `Worker` is not `Clone`, so a job can
/// never be submitted to a closed worker.
pub struct Worker {
    sched: Scheduler,
    shared: Arc<WorkerShared>,
    join: Option<thread::JoinHandle<()>>,
}

impl Worker {
    /// Spawns the worker thread.
    pub fn create() -> io::Result<Self> {
        let sched = Scheduler::current();
        let shared = Arc::new(WorkerShared {
            queue: SegQueue::new(),
            shutdown: AtomicBool::new(false),
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
        });
        let on_thread = Arc::clone(&shared);
        let join = thread::Builder::new()
            .name("evloom-worker".into())
            .spawn(move || worker_loop(&on_thread))?;
        Ok(Self {
            sched,
            shared,
            join: Some(join),
        })
    }

    /// Submits a thunk; its result resolves the returned task's promise.
    pub fn task<T, F>(&self, thunk: F) -> WorkerTask<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let ivar: Ivar<Result<T, JobError>> = Ivar::new();
        let claimed = Arc::new(AtomicBool::new(false));
        let completions = self.sched.completions();
        let promise = ivar.clone();
        let run = Box::new(move || {
            let outcome = match catch_unwind(AssertUnwindSafe(thunk)) {
                Ok(value) => Ok(value),
                Err(payload) => Err(JobError::Panicked {
                    message: panic_message(payload.as_ref()),
                    backtrace: Backtrace::force_capture().to_string(),
                }),
            };
            completions.post(Fill::new(&promise, outcome));
        });
        // The pending completion must keep the loop alive until it drains.
        self.sched.retain_pending_completion();
        self.shared.queue.push(Job {
            claimed: Arc::clone(&claimed),
            run,
        });
        self.wake_worker();
        WorkerTask { ivar, claimed }
    }

    /// Cancels a job: a no-op if its promise is already resolved;
    /// otherwise the promise resolves to [`JobError::Cancelled`] and the
    /// worker drops the job if it has not consumed it yet.
    pub fn cancel<T: Clone + Send + 'static>(&self, task: &WorkerTask<T>) {
        if task.ivar.is_full() {
            return;
        }
        let unconsumed = !task.claimed.swap(true, Ordering::AcqRel);
        task.ivar.try_fill(Err(JobError::Cancelled));
        if unconsumed {
            // No completion will cross the queue for this job.
            self.sched.release_pending_completion();
            debug!("worker job dropped before consumption");
        }
    }

    /// Waits for pending jobs to drain, then stops the worker thread.
    pub async fn close(mut self) {
        let done: Ivar<()> = Ivar::new();
        let completions = self.sched.completions();
        let promise = done.clone();
        let on_thread = Arc::clone(&self.shared);
        self.sched.retain_pending_completion();
        // FIFO ordering makes this the last job the worker consumes.
        self.shared.queue.push(Job {
            claimed: Arc::new(AtomicBool::new(false)),
            run: Box::new(move || {
                on_thread.shutdown.store(true, Ordering::Release);
                completions.post(Fill::new(&promise, ()));
            }),
        });
        self.wake_worker();
        done.read().await;
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }

    fn wake_worker(&self) {
        let _guard = self.shared.mutex.lock().unwrap_or_else(|e| e.into_inner());
        self.shared.condvar.notify_one();
    }
}

fn worker_loop(shared: &Arc<WorkerShared>) {
    loop {
        if let Some(job) = shared.queue.pop() {
            if !job.claimed.swap(true, Ordering::AcqRel) {
                (job.run)();
            }
            continue;
        }
        if shared.shutdown.load(Ordering::Acquire) {
            return;
        }
        let guard = shared.mutex.lock().unwrap_or_else(|e| e.into_inner());
        // Re-check under the lock so a submission between the pop and the
        // park is not lost.
        if !shared.queue.is_empty() || shared.shutdown.load(Ordering::Acquire) {
            continue;
        }
        let _unused = shared.condvar.wait(guard);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&'static str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "opaque panic payload".to_string()
    }
}
