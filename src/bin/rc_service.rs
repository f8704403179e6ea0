//! `rc-service`: runs a single action against one service.
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use rcman::cli::RcServiceArgs;
use rcman::config::RcConfig;
use rcman::depend::{cache, loader, ServiceDecl, ServiceGraph};
use rcman::env::RcEnv;
use rcman::error::DependError;
use rcman::hooks::HookBus;
use rcman::runner::{RunOptions, RunOutcome, Runner};
use rcman::runtime::{self, RuntimeMode};
use rcman::store::StateHandle;

fn main() {
    let args = RcServiceArgs::parse();
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
    let script = scripts_dir.join(&args.service);

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

    let store = match StateHandle::open(state_root) {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "failed to open state store");
            std::process::exit(1);
        }
    };

    let mut hook_dirs = vec![config_dir.join("hooks")];
    hook_dirs.extend(config.extra_hook_dirs.clone());
    let hooks = HookBus::new(hook_dirs);
    let runner = Runner::new(&graph, &store, &hooks);
    let env = RcEnv::from_process();

    let opts = RunOptions {
        ifstarted: args.ifstarted,
        ifinactive: args.ifinactive,
        ifstopped: args.ifstopped,
        nodeps: args.nodeps,
    };

    match runner.run(&args.service, &script, &args.action, &env, opts) {
        Ok(RunOutcome::Settled(state)) => {
            println!("{}: {}", args.service, state.as_ref());
        }
        Ok(RunOutcome::Deferred) => {
            println!("{}: start deferred, waiting on a dependency", args.service);
        }
        Ok(RunOutcome::Skipped) => {
            println!("{}: skipped (precondition not met)", args.service);
        }
        Err(e) => {
            error!(service = %args.service, error = %e, "action failed");
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

    Ok(ServiceGraph::build(decls)?)
}

fn load_all_with_extra_dirs(
    scripts_dir: &std::path::Path,
    extra_dirs: &[std::path::PathBuf],
) -> Result<Vec<ServiceDecl>, DependError> {
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
