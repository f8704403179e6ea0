//! End-to-end runner: drives the default [`rcman::runner::ShellPayload`]
//! against real shell scripts, exercising dependency deferral and broken
//! dependency detection alongside a plain successful start.
use std::fs;
use std::os::unix::fs::PermissionsExt;

use rcman::depend::loader::ServiceDecl;
use rcman::depend::ServiceGraph;
use rcman::env::RcEnv;
use rcman::hooks::HookBus;
use rcman::runner::{RunOptions, RunOutcome, Runner};
use rcman::store::{self, PrimaryState, StateHandle};
use tempfile::tempdir;

fn executable_script(path: &std::path::Path, body: &str) {
    fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).unwrap();
}

#[test]
fn shell_payload_start_marks_service_started() {
    let temp = tempdir().unwrap();
    let script = temp.path().join("net.eth0");
    executable_script(&script, "exit 0");

    let graph = ServiceGraph::build(vec![ServiceDecl {
        name: "net.eth0".to_string(),
        ..Default::default()
    }])
    .unwrap();
    let store = StateHandle::open(temp.path().join("store")).unwrap();
    let hooks = HookBus::new(vec![]);
    let runner = Runner::new(&graph, &store, &hooks);

    let outcome = runner
        .run("net.eth0", &script, "start", &RcEnv::default(), RunOptions::default())
        .unwrap();
    assert_eq!(outcome, RunOutcome::Settled(PrimaryState::Started));
}

#[test]
fn start_defers_when_a_need_dependency_is_inactive() {
    let temp = tempdir().unwrap();
    let net_script = temp.path().join("net.eth0");
    let sshd_script = temp.path().join("sshd");
    executable_script(&net_script, "exit 0");
    executable_script(&sshd_script, "exit 0");

    let graph = ServiceGraph::build(vec![
        ServiceDecl {
            name: "net.eth0".to_string(),
            provide: vec!["net".to_string()],
            ..Default::default()
        },
        ServiceDecl {
            name: "sshd".to_string(),
            need: vec!["net".to_string()],
            ..Default::default()
        },
    ])
    .unwrap();

    let store = StateHandle::open(temp.path().join("store")).unwrap();
    store::primary::mark(&store, "net.eth0", PrimaryState::Inactive, &net_script).unwrap();

    let hooks = HookBus::new(vec![]);
    let runner = Runner::new(&graph, &store, &hooks);
    let outcome = runner
        .run("sshd", &sshd_script, "start", &RcEnv::default(), RunOptions::default())
        .unwrap();

    assert_eq!(outcome, RunOutcome::Deferred);
    assert_eq!(
        store::schedule::waiting_on(&store, "sshd").unwrap(),
        vec!["net.eth0".to_string()]
    );
}

#[test]
fn start_is_rejected_when_a_need_dependency_is_broken() {
    let temp = tempdir().unwrap();
    let net_script = temp.path().join("net.eth0");
    let sshd_script = temp.path().join("sshd");
    executable_script(&net_script, "exit 0");
    executable_script(&sshd_script, "exit 0");

    let graph = ServiceGraph::build(vec![
        ServiceDecl {
            name: "net.eth0".to_string(),
            provide: vec!["net".to_string()],
            keywords: vec!["broken".to_string()],
            ..Default::default()
        },
        ServiceDecl {
            name: "sshd".to_string(),
            need: vec!["net".to_string()],
            ..Default::default()
        },
    ])
    .unwrap();

    let store = StateHandle::open(temp.path().join("store")).unwrap();
    let hooks = HookBus::new(vec![]);
    let runner = Runner::new(&graph, &store, &hooks);
    let err = runner
        .run("sshd", &sshd_script, "start", &RcEnv::default(), RunOptions::default())
        .unwrap_err();

    assert!(matches!(err, rcman::error::RunnerError::BrokenDependency { .. }));
}

#[test]
fn a_concurrent_exclusive_action_is_rejected() {
    let temp = tempdir().unwrap();
    let script = temp.path().join("net.eth0");
    executable_script(&script, "exit 0");

    let graph = ServiceGraph::build(vec![ServiceDecl {
        name: "net.eth0".to_string(),
        ..Default::default()
    }])
    .unwrap();
    let store = StateHandle::open(temp.path().join("store")).unwrap();
    let hooks = HookBus::new(vec![]);

    let _held = store::exclusive::try_acquire(&store, "net.eth0").unwrap();
    let runner = Runner::new(&graph, &store, &hooks);
    let err = runner
        .run("net.eth0", &script, "start", &RcEnv::default(), RunOptions::default())
        .unwrap_err();

    assert!(matches!(err, rcman::error::RunnerError::AlreadyExclusive(_)));
}
