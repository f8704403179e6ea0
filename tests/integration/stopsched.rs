//! End-to-end stop-schedule execution: parses a schedule string and drives a
//! real child process through [`rcman::supervisor::Supervisor::stop`].
use std::process::Command;

use rcman::stopsched::StopSchedule;
use rcman::store::StateHandle;
use rcman::supervisor::{Supervisor, SupervisorConfig};
use tempfile::tempdir;

#[test]
fn stop_schedule_terminates_a_real_child_process() {
    let temp = tempdir().unwrap();
    let store = StateHandle::open(temp.path().join("store")).unwrap();

    let mut child = Command::new("sleep").arg("30").spawn().unwrap();
    let pid = child.id() as i32;

    let config = SupervisorConfig {
        retry_schedule: StopSchedule::parse("TERM/2").unwrap(),
        ..Default::default()
    };
    let supervisor = Supervisor::new("sleeper", &store, config);

    supervisor.stop(pid).unwrap();

    let status = child.wait().unwrap();
    assert!(!status.success(), "process should have exited via SIGTERM, not cleanly");
}

#[test]
fn an_unresponsive_process_exhausts_the_schedule() {
    let temp = tempdir().unwrap();
    let store = StateHandle::open(temp.path().join("store")).unwrap();

    // A process that ignores SIGTERM: the schedule below only sends SIGTERM
    // and waits, so it must run out and report failure rather than hang.
    let mut child = Command::new("sh")
        .arg("-c")
        .arg("trap '' TERM; sleep 30")
        .spawn()
        .unwrap();
    let pid = child.id() as i32;

    let config = SupervisorConfig {
        retry_schedule: StopSchedule::parse("TERM/1").unwrap(),
        ..Default::default()
    };
    let supervisor = Supervisor::new("stubborn", &store, config);

    let result = supervisor.stop(pid);
    assert!(result.is_err(), "schedule exhaustion on an unresponsive process must be reported");

    let _ = child.kill();
    let _ = child.wait();
}

#[test]
fn forever_must_follow_a_timeout() {
    assert!(StopSchedule::parse("TERM/5 forever").is_ok());
    assert!(StopSchedule::parse("forever").is_err());
}
