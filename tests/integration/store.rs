//! End-to-end state store: layout, primary-state transitions guarded by a
//! [`rcman::store::Transaction`], exclusive locking, scheduled starts, and
//! daemon-tuple bookkeeping, all against one store rooted in a tempdir.
use rcman::store::{self, ExclusiveGuard, PrimaryState, StateHandle, Transaction};
use tempfile::tempdir;

#[test]
fn full_lifecycle_of_a_service_through_the_store() {
    let temp = tempdir().unwrap();
    let handle = StateHandle::open(temp.path().join("store")).unwrap();
    let script = temp.path().join("net.eth0");
    std::fs::write(&script, "").unwrap();

    assert_eq!(store::primary::query(&handle, "net.eth0"), None);

    let guard = store::exclusive::try_acquire(&handle, "net.eth0").unwrap();
    let txn = Transaction::begin(&handle, "net.eth0");
    store::primary::mark(&handle, "net.eth0", PrimaryState::Starting, &script).unwrap();
    store::primary::mark(&handle, "net.eth0", PrimaryState::Started, &script).unwrap();
    txn.commit();
    drop(guard);

    assert_eq!(store::primary::query(&handle, "net.eth0"), Some(PrimaryState::Started));

    // A second lock acquisition must now succeed since the first was dropped.
    let _guard2: ExclusiveGuard = store::exclusive::try_acquire(&handle, "net.eth0").unwrap();

    store::daemons::record(
        &handle,
        "net.eth0",
        &store::daemons::DaemonRecord {
            exec: "/sbin/dhcpcd".to_string(),
            argv0: None,
            uid: None,
            pid: std::process::id() as i32,
        },
    )
    .unwrap();
    assert!(!store::daemons::daemon_crashed(&handle, "net.eth0").unwrap());
    store::daemons::clear(&handle, "net.eth0").unwrap();
    assert!(store::daemons::all(&handle, "net.eth0").unwrap().is_empty());
}

#[test]
fn a_failed_transition_can_be_rolled_back_under_the_lock() {
    let temp = tempdir().unwrap();
    let handle = StateHandle::open(temp.path().join("store")).unwrap();
    let script = temp.path().join("sshd");
    std::fs::write(&script, "").unwrap();

    store::primary::mark(&handle, "sshd", PrimaryState::Stopped, &script).unwrap();

    let guard = store::exclusive::try_acquire(&handle, "sshd").unwrap();
    let txn = Transaction::begin(&handle, "sshd");
    store::primary::mark(&handle, "sshd", PrimaryState::Starting, &script).unwrap();
    // The start payload failed; unwind back to the prior state rather than
    // leaving the service stuck in "starting".
    txn.rollback(&script).unwrap();
    drop(guard);

    assert_eq!(store::primary::query(&handle, "sshd"), Some(PrimaryState::Stopped));
}

#[test]
fn scheduled_starts_track_what_a_service_is_waiting_on() {
    let temp = tempdir().unwrap();
    let handle = StateHandle::open(temp.path().join("store")).unwrap();

    store::schedule::schedule_start_on(&handle, "sshd", "net.eth0").unwrap();
    assert_eq!(store::schedule::all_scheduled(&handle).unwrap(), vec!["sshd".to_string()]);
    assert_eq!(
        store::schedule::waiting_on(&handle, "sshd").unwrap(),
        vec!["net.eth0".to_string()]
    );

    store::schedule::clear_schedule(&handle, "sshd").unwrap();
    assert!(store::schedule::all_scheduled(&handle).unwrap().is_empty());
}

#[test]
fn options_survive_across_separately_opened_handles() {
    let temp = tempdir().unwrap();
    let root = temp.path().join("store");

    {
        let handle = StateHandle::open(root.clone()).unwrap();
        store::options::set(&handle, "sshd", "reexec_pending", "1").unwrap();
    }

    let handle = StateHandle::open(root).unwrap();
    assert_eq!(
        store::options::get(&handle, "sshd", "reexec_pending").unwrap(),
        Some("1".to_string())
    );
}
