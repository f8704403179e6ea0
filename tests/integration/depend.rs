//! End-to-end dependency engine: load real init scripts from disk, build a
//! graph, resolve provider aliases, order for start, and round-trip through
//! the disk cache.
use std::fs;

use rcman::depend::{cache, loader, order, DependOptions, RelType, ServiceGraph};
use tempfile::tempdir;

const ORDER_TYPES: &[RelType] = &[RelType::Need, RelType::Use, RelType::After];

fn write_script(dir: &std::path::Path, name: &str, stream: &str) {
    let body = format!("#!/bin/sh\n{stream}exit 0\n");
    fs::write(dir.join(name), body).unwrap();
    let mut perms = fs::metadata(dir.join(name)).unwrap().permissions();
    std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
    fs::set_permissions(dir.join(name), perms).unwrap();
}

fn depinfo_line(index: usize, field: &str, value: &str) -> String {
    format!("depinfo_{index}_{field}='{value}'\n")
}

#[test]
fn loads_orders_and_caches_a_small_service_tree() {
    let dir = tempdir().unwrap();
    let scripts_dir = dir.path().join("init.d");
    let config_dir = dir.path().join("conf.d");
    fs::create_dir_all(&scripts_dir).unwrap();
    fs::create_dir_all(&config_dir).unwrap();
    let global = dir.path().join("rc.conf");
    let external = dir.path().join("depconfig");
    fs::write(&global, "").unwrap();
    fs::write(&external, "").unwrap();

    write_script(&scripts_dir, "net.eth0", &format!(
        "{}{}",
        depinfo_line(0, "service", "net.eth0"),
        depinfo_line(0, "provide_0", "net"),
    ));
    write_script(&scripts_dir, "logger", &format!(
        "{}{}",
        depinfo_line(0, "service", "logger"),
        depinfo_line(0, "provide_0", "logger"),
    ));
    write_script(&scripts_dir, "sshd", &format!(
        "{}{}{}{}",
        depinfo_line(0, "service", "sshd"),
        depinfo_line(0, "need_0", "net"),
        depinfo_line(0, "use_0", "logger"),
        depinfo_line(0, "after_0", "local"),
    ));
    write_script(&scripts_dir, "local", "");

    let decls = loader::load_all(&scripts_dir).unwrap();
    assert_eq!(decls.len(), 4);

    let graph = ServiceGraph::build(decls.clone()).unwrap();
    let sshd = graph.index_of("sshd").unwrap();
    let options = DependOptions { trace: true, start: true, ..Default::default() };
    let ordered = order::order(&graph, ORDER_TYPES, &[sshd], None, options);
    let names: Vec<&str> = ordered.iter().map(|&i| graph.node(i).name.as_str()).collect();

    let sshd_pos = names.iter().position(|&n| n == "sshd").unwrap();
    let net_pos = names.iter().position(|&n| n == "net.eth0").unwrap();
    let local_pos = names.iter().position(|&n| n == "local").unwrap();
    assert!(net_pos < sshd_pos, "net.eth0 must start before sshd");
    assert!(local_pos < sshd_pos, "local must start before sshd (after constraint)");

    let cache_path = dir.path().join("deptree");
    let inputs = cache::CacheInputs {
        scripts_dir: &scripts_dir,
        config_dir: &config_dir,
        global_config_file: &global,
        external_config_list: &external,
    };
    cache::publish(&cache_path, &inputs, &decls).unwrap();
    let reloaded = cache::load_if_fresh(&cache_path, &inputs).unwrap();
    assert_eq!(reloaded.len(), decls.len());

    std::thread::sleep(std::time::Duration::from_secs(1));
    write_script(&scripts_dir, "sshd", &format!(
        "{}{}{}{}{}",
        depinfo_line(0, "service", "sshd"),
        depinfo_line(0, "need_0", "net"),
        depinfo_line(0, "use_0", "logger"),
        depinfo_line(0, "after_0", "local"),
        depinfo_line(0, "want_0", "cron"),
    ));
    assert!(
        cache::load_if_fresh(&cache_path, &inputs).is_none(),
        "touching a script after publish must invalidate the cache"
    );
}

#[test]
fn missing_need_across_the_whole_tree_is_reported() {
    let dir = tempdir().unwrap();
    let scripts_dir = dir.path().join("init.d");
    fs::create_dir_all(&scripts_dir).unwrap();
    write_script(&scripts_dir, "sshd", &format!(
        "{}{}",
        depinfo_line(0, "service", "sshd"),
        depinfo_line(0, "need_0", "net"),
    ));

    let decls = loader::load_all(&scripts_dir).unwrap();
    let err = ServiceGraph::build(decls).unwrap_err();
    assert!(matches!(err, rcman::error::DependError::MissingDependency { .. }));
}
