//! Child-process reaping.

mod common;

use evloom::process::{self, ExitStatus};
use evloom::Scheduler;
use std::process::Command;

#[test]
fn reaps_a_normal_exit() {
    common::init_logging();
    Scheduler::run(async {
        let child = Command::new("sh")
            .arg("-c")
            .arg("exit 7")
            .spawn()
            .expect("spawn child");
        let status = process::wait(child.id() as i32).await.expect("wait");
        assert_eq!(status, ExitStatus::Exited(7));
    });
}

#[test]
fn reaps_children_out_of_order() {
    common::init_logging();
    Scheduler::run(async {
        let slow = Command::new("sh")
            .arg("-c")
            .arg("sleep 0.2; exit 1")
            .spawn()
            .expect("spawn slow child");
        let fast = Command::new("true").spawn().expect("spawn fast child");

        let fast_status = process::wait(fast.id() as i32).await.expect("wait fast");
        assert_eq!(fast_status, ExitStatus::Exited(0));
        let slow_status = process::wait(slow.id() as i32).await.expect("wait slow");
        assert_eq!(slow_status, ExitStatus::Exited(1));
    });
}
