//! Worker-thread offload: completions, panics, cancellation, shutdown.

mod common;

use evloom::worker::JobError;
use evloom::{Scheduler, Worker};
use std::sync::mpsc;

#[test]
fn offloaded_value_round_trips() {
    common::init_logging();
    Scheduler::run(async {
        let worker = Worker::create().expect("spawn worker");
        let task = worker.task(|| 6 * 7);
        assert_eq!(task.wait().await.expect("job value"), 42);
        worker.close().await;
    });
}

#[test]
fn jobs_complete_in_submission_order() {
    common::init_logging();
    Scheduler::run(async {
        let worker = Worker::create().expect("spawn worker");
        let first = worker.task(|| "first");
        let second = worker.task(|| "second");
        // FIFO per worker queue: the first promise is resolved no later
        // than the second, so awaiting in order never re-blocks.
        assert_eq!(first.wait().await.expect("first"), "first");
        assert_eq!(second.wait().await.expect("second"), "second");
        worker.close().await;
    });
}

#[test]
fn panics_surface_with_backtrace() {
    common::init_logging();
    Scheduler::run(async {
        let worker = Worker::create().expect("spawn worker");
        let doomed: evloom::worker::WorkerTask<()> = worker.task(|| panic!("job exploded"));
        match doomed.wait().await {
            Err(JobError::Panicked { message, backtrace }) => {
                assert!(message.contains("job exploded"));
                assert!(!backtrace.is_empty());
            }
            other => panic!("expected a panic report, got {other:?}"),
        }
        // The scheduler survives a worker panic.
        let after = worker.task(|| 1);
        assert_eq!(after.wait().await.expect("later job"), 1);
        worker.close().await;
    });
}

#[test]
fn cancel_drops_unconsumed_jobs() {
    common::init_logging();
    Scheduler::run(async {
        let worker = Worker::create().expect("spawn worker");
        let (release, gate) = mpsc::channel::<()>();
        let busy = worker.task(move || {
            gate.recv().expect("gate");
            "done"
        });
        let doomed = worker.task(|| 99);
        worker.cancel(&doomed);
        match doomed.wait().await {
            Err(JobError::Cancelled) => {}
            other => panic!("expected cancellation, got {other:?}"),
        }
        release.send(()).expect("release");
        assert_eq!(busy.wait().await.expect("busy job"), "done");
        worker.close().await;
    });
}

#[test]
fn cancel_after_completion_is_a_noop() {
    common::init_logging();
    Scheduler::run(async {
        let worker = Worker::create().expect("spawn worker");
        let task = worker.task(|| 5);
        assert_eq!(task.wait().await.expect("value"), 5);
        worker.cancel(&task);
        assert_eq!(task.wait().await.expect("still the value"), 5);
        worker.close().await;
    });
}

#[test]
fn close_drains_pending_jobs() {
    common::init_logging();
    Scheduler::run(async {
        let worker = Worker::create().expect("spawn worker");
        let tasks: Vec<_> = (0..8usize).map(|i| worker.task(move || i)).collect();
        worker.close().await;
        for (i, task) in tasks.iter().enumerate() {
            assert_eq!(task.wait().await.expect("drained job"), i);
        }
    });
}
