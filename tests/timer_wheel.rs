//! Sleep and timer-wheel behavior.

mod common;

use evloom::time::TimerResult;
use evloom::{fiber, sleep, Scheduler, Wheel};
use std::time::{Duration, Instant};

#[test]
fn sleep_waits_roughly_the_requested_delay() {
    common::init_logging();
    Scheduler::run(async {
        let start = Instant::now();
        sleep(Duration::from_millis(30)).await;
        assert!(start.elapsed() >= Duration::from_millis(25));
    });
}

#[test]
fn cancelled_entry_resolves_cancelled_and_the_rest_fire() {
    common::init_logging();
    Scheduler::run(async {
        let wheel = Wheel::new(Duration::from_millis(50));
        let consumer = wheel.clone();
        fiber::spawn(async move { consumer.run().await });

        let first = wheel.task();
        let second = wheel.task();
        wheel.cancel(&first);

        assert_eq!(wheel.wait(&first).await, TimerResult::Cancelled);
        assert_eq!(wheel.wait(&second).await, TimerResult::Ok);
        wheel.stop();
    });
}

#[test]
fn entries_fire_in_insertion_order() {
    common::init_logging();
    Scheduler::run(async {
        let wheel = Wheel::new(Duration::from_millis(20));
        let consumer = wheel.clone();
        fiber::spawn(async move { consumer.run().await });

        let first = wheel.task();
        let second = wheel.task();
        let left = wheel.clone();
        let right = wheel.clone();
        let (first_fired, second_fired) = fiber::join(
            async move {
                assert_eq!(left.wait(&first).await, TimerResult::Ok);
                Instant::now()
            },
            async move {
                assert_eq!(right.wait(&second).await, TimerResult::Ok);
                Instant::now()
            },
        )
        .await;
        assert!(first_fired <= second_fired);
        wheel.stop();
    });
}

#[test]
fn reset_restarts_the_window() {
    common::init_logging();
    Scheduler::run(async {
        let wheel = Wheel::new(Duration::from_millis(40));
        let consumer = wheel.clone();
        fiber::spawn(async move { consumer.run().await });

        let task = wheel.task();
        sleep(Duration::from_millis(15)).await;
        wheel.reset(&task);
        let reset_at = Instant::now();
        assert_eq!(wheel.wait(&task).await, TimerResult::Ok);
        assert!(reset_at.elapsed() >= Duration::from_millis(30));
        wheel.stop();
    });
}

#[test]
fn stop_cancels_queued_entries_without_a_consumer() {
    common::init_logging();
    Scheduler::run(async {
        let wheel = Wheel::new(Duration::from_secs(5));
        let first = wheel.task();
        let second = wheel.task();
        wheel.stop();
        assert_eq!(wheel.wait(&first).await, TimerResult::Cancelled);
        assert_eq!(wheel.wait(&second).await, TimerResult::Cancelled);
    });
}

#[test]
fn stop_cancels_the_in_flight_entry() {
    common::init_logging();
    Scheduler::run(async {
        let wheel = Wheel::new(Duration::from_millis(40));
        let consumer = wheel.clone();
        fiber::spawn(async move { consumer.run().await });

        let task = wheel.task();
        sleep(Duration::from_millis(10)).await;
        wheel.stop();
        assert_eq!(wheel.wait(&task).await, TimerResult::Cancelled);
    });
}

#[test]
#[should_panic(expected = "stopped wheel")]
fn scheduling_on_a_stopped_wheel_panics() {
    Scheduler::run(async {
        let wheel = Wheel::new(Duration::from_millis(10));
        wheel.stop();
        let _ = wheel.task();
    });
}
