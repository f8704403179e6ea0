//! End-to-end CLI: drives the three compiled binaries against a tempdir
//! `HOME` so runtime-mode path resolution lands entirely outside the real
//! filesystem.
use std::fs;
use std::os::unix::fs::PermissionsExt;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn home_with_one_service() -> tempfile::TempDir {
    let home = tempdir().unwrap();
    let init_d = home.path().join(".config/rcman/init.d");
    fs::create_dir_all(&init_d).unwrap();
    fs::write(init_d.join("sleeper"), "#!/bin/sh\nexit 0\n").unwrap();
    let mut perms = fs::metadata(init_d.join("sleeper")).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(init_d.join("sleeper"), perms).unwrap();
    home
}

#[test]
fn rc_update_add_then_show_lists_the_service() {
    let home = home_with_one_service();

    Command::cargo_bin("rc-update")
        .unwrap()
        .env("HOME", home.path())
        .args(["add", "sleeper", "default"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sleeper added to runlevel default"));

    Command::cargo_bin("rc-update")
        .unwrap()
        .env("HOME", home.path())
        .args(["show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sleeper").and(predicate::str::contains("default")));
}

#[test]
fn rc_update_del_removes_a_previously_added_service() {
    let home = home_with_one_service();

    Command::cargo_bin("rc-update")
        .unwrap()
        .env("HOME", home.path())
        .args(["add", "sleeper", "default"])
        .assert()
        .success();

    Command::cargo_bin("rc-update")
        .unwrap()
        .env("HOME", home.path())
        .args(["del", "sleeper", "default"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sleeper removed from runlevel default"));

    Command::cargo_bin("rc-update")
        .unwrap()
        .env("HOME", home.path())
        .args(["show", "default"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sleeper").not());
}

#[test]
fn rc_brings_the_default_runlevel_up() {
    let home = home_with_one_service();

    Command::cargo_bin("rc-update")
        .unwrap()
        .env("HOME", home.path())
        .args(["add", "sleeper", "default"])
        .assert()
        .success();

    Command::cargo_bin("rc")
        .unwrap()
        .env("HOME", home.path())
        .args(["default", "--no-interactive"])
        .assert()
        .success();

    let softlevel = home.path().join(".local/share/rcman/softlevel");
    assert_eq!(fs::read_to_string(softlevel).unwrap(), "default");
}

#[test]
fn rc_service_runs_a_single_action_without_touching_the_runlevel() {
    let home = home_with_one_service();

    Command::cargo_bin("rc-service")
        .unwrap()
        .env("HOME", home.path())
        .args(["sleeper", "start"])
        .assert()
        .success();

    Command::cargo_bin("rc-service")
        .unwrap()
        .env("HOME", home.path())
        .args(["sleeper", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("started"));
}

#[test]
fn rc_update_rejects_a_reserved_runlevel_name() {
    let home = home_with_one_service();

    Command::cargo_bin("rc-update")
        .unwrap()
        .env("HOME", home.path())
        .args(["add", "sleeper", "boot"])
        .assert()
        .failure();
}
