//! `rc`: brings the system to a named runlevel.
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use rcman::cli::RcArgs;
use rcman::config::RcConfig;
use rcman::depend::{self, cache, loader, ServiceGraph};
use rcman::error::DependError;
use rcman::hooks::HookBus;
use rcman::rc::{transition, TransitionOptions};
use rcman::runtime::{self, RuntimeMode};
use rcman::store::StateHandle;

fn main() {
    let args = RcArgs::parse();
    init_logging(&args.common);

    let mode = if args.common.sys {
        RuntimeMode::System
    } else {
        RuntimeMode::User
    };
    runtime::init(mode);

    let config_dir = runtime::config_dirs()
        .into_iter()
        .next()
        .expect("at least one config directory is always configured");
    let scripts_dir = config_dir.join("init.d");
    let runlevel_root = runtime::runlevel_dir();

    let config = match RcConfig::load(&config_dir.join("rcman.yaml")) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let graph = match load_graph(&scripts_dir, &config) {
        Ok(graph) => graph,
        Err(e) => {
            error!(error = %e, "failed to load dependency tree");
            std::process::exit(1);
        }
    };

    let state_root = config.state_root.clone().unwrap_or_else(runtime::state_dir);

    let store = match StateHandle::open(state_root.clone()) {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "failed to open state store");
            std::process::exit(1);
        }
    };

    let mut hook_dirs = vec![config_dir.join("hooks")];
    hook_dirs.extend(config.extra_hook_dirs.clone());
    let hooks = HookBus::new(hook_dirs);

    let target = args
        .runlevel
        .or_else(|| std::fs::read_to_string(state_root.join(rcman::constants::SOFTLEVEL_FILE)).ok())
        .unwrap_or_else(|| "default".to_string());

    let opts = TransitionOptions {
        interactive: !args.no_interactive,
        parallel: config.effective_parallel(),
    };

    match transition(&graph, &store, &runlevel_root, &scripts_dir, &hooks, target.trim(), opts) {
        Ok(report) => {
            let _ = std::fs::write(state_root.join(rcman::constants::SOFTLEVEL_FILE), &target);
            if !report.failed.is_empty() {
                error!(failed = ?report.failed, "one or more services failed during transition");
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!(error = %e, "runlevel transition failed");
            std::process::exit(1);
        }
    }
}

fn load_graph(scripts_dir: &std::path::Path, config: &RcConfig) -> Result<ServiceGraph, rcman::error::RcError> {
    let cache_path = scripts_dir
        .parent()
        .unwrap_or(scripts_dir)
        .join(rcman::constants::DEPTREE_FILE);

    let decls = match cache::load_if_fresh(&cache_path, scripts_dir) {
        Some(decls) => decls,
        None => {
            let decls = load_all_with_extra_dirs(scripts_dir, &config.extra_script_dirs)?;
            let _ = cache::publish(&cache_path, scripts_dir, &decls);
            decls
        }
    };

    Ok(depend::ServiceGraph::build(decls)?)
}

fn load_all_with_extra_dirs(
    scripts_dir: &std::path::Path,
    extra_dirs: &[std::path::PathBuf],
) -> Result<Vec<rcman::depend::ServiceDecl>, DependError> {
    let mut decls = loader::load_all(scripts_dir)?;
    for dir in extra_dirs {
        decls.extend(loader::load_all(dir)?);
    }
    decls.sort_by(|a, b| a.name.cmp(&b.name));
    decls.dedup_by(|a, b| a.name == b.name);
    Ok(decls)
}

fn init_logging(common: &rcman::cli::CommonArgs) {
    let filter = common
        .log_level
        .map(|l| EnvFilter::new(l.as_str()))
        .unwrap_or_else(EnvFilter::from_default_env);
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
