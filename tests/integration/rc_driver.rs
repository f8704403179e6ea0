//! End-to-end runlevel transitions: starts runlevel members in dependency
//! order, resolves a provider alias, and stops a service that drops out of
//! the target runlevel on a subsequent transition.
use std::fs;
use std::os::unix::fs::PermissionsExt;

use rcman::depend::loader::ServiceDecl;
use rcman::depend::ServiceGraph;
use rcman::hooks::HookBus;
use rcman::rc::{transition, TransitionOptions};
use rcman::runlevel::Runlevel;
use rcman::store::{PrimaryState, StateHandle};
use tempfile::tempdir;

fn executable_script(path: &std::path::Path) {
    fs::write(path, "#!/bin/sh\nexit 0\n").unwrap();
    let mut perms = fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).unwrap();
}

#[test]
fn start_phase_respects_provider_alias_ordering() {
    let temp = tempdir().unwrap();
    let scripts_dir = temp.path().join("scripts");
    fs::create_dir_all(&scripts_dir).unwrap();
    for name in ["net.eth0", "sshd"] {
        executable_script(&scripts_dir.join(name));
    }

    let runlevel_root = temp.path().join("runlevels");
    let rl = Runlevel::new(&runlevel_root, "default");
    rl.add("net.eth0", &scripts_dir.join("net.eth0")).unwrap();
    rl.add("sshd", &scripts_dir.join("sshd")).unwrap();

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

    let store_handle = StateHandle::open(temp.path().join("store")).unwrap();
    let hooks = HookBus::new(vec![]);

    let report = transition(
        &graph,
        &store_handle,
        &runlevel_root,
        &scripts_dir,
        &hooks,
        "default",
        TransitionOptions::default(),
    )
    .unwrap();

    assert!(report.failed.is_empty());
    let net_pos = report.started.iter().position(|s| s == "net.eth0").unwrap();
    let sshd_pos = report.started.iter().position(|s| s == "sshd").unwrap();
    assert!(net_pos < sshd_pos);
}

#[test]
fn dropping_a_service_from_the_runlevel_stops_it_on_the_next_transition() {
    let temp = tempdir().unwrap();
    let scripts_dir = temp.path().join("scripts");
    fs::create_dir_all(&scripts_dir).unwrap();
    executable_script(&scripts_dir.join("cron"));

    let runlevel_root = temp.path().join("runlevels");
    let rl = Runlevel::new(&runlevel_root, "default");
    rl.add("cron", &scripts_dir.join("cron")).unwrap();

    let graph = ServiceGraph::build(vec![ServiceDecl {
        name: "cron".to_string(),
        ..Default::default()
    }])
    .unwrap();

    let store_handle = StateHandle::open(temp.path().join("store")).unwrap();
    let hooks = HookBus::new(vec![]);

    let first = transition(
        &graph,
        &store_handle,
        &runlevel_root,
        &scripts_dir,
        &hooks,
        "default",
        TransitionOptions::default(),
    )
    .unwrap();
    assert_eq!(first.started, vec!["cron".to_string()]);

    rl.remove("cron").unwrap();

    let second = transition(
        &graph,
        &store_handle,
        &runlevel_root,
        &scripts_dir,
        &hooks,
        "default",
        TransitionOptions::default(),
    )
    .unwrap();

    assert_eq!(second.stopped, vec!["cron".to_string()]);
    assert_eq!(
        rcman::store::primary::query(&store_handle, "cron"),
        Some(PrimaryState::Stopped)
    );
}
