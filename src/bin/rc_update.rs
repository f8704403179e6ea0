//! `rc-update`: manage runlevel membership.
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use rcman::cli::{RcUpdateArgs, RcUpdateCommand};
use rcman::config::RcConfig;
use rcman::runlevel::{self, Runlevel};
use rcman::runtime::{self, RuntimeMode};

fn main() {
    let args = RcUpdateArgs::parse();
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
    let state_root = config.state_root.clone().unwrap_or_else(runtime::state_dir);

    let current_runlevel = std::fs::read_to_string(state_root.join(rcman::constants::SOFTLEVEL_FILE))
        .unwrap_or_else(|_| "default".to_string());
    let current_runlevel = current_runlevel.trim().to_string();

    let result = match args.command {
        RcUpdateCommand::Add { service, runlevels } => {
            let levels = if runlevels.is_empty() { vec![current_runlevel] } else { runlevels };
            add(&runlevel_root, &scripts_dir, &service, &levels)
        }
        RcUpdateCommand::Del { service, runlevels } => {
            let levels = if runlevels.is_empty() { vec![current_runlevel] } else { runlevels };
            del(&runlevel_root, &service, &levels)
        }
        RcUpdateCommand::Show { runlevel } => show(&runlevel_root, runlevel.as_deref()),
    };

    if let Err(e) = result {
        error!(error = %e, "rc-update failed");
        std::process::exit(1);
    }
}

fn add(
    runlevel_root: &std::path::Path,
    scripts_dir: &std::path::Path,
    service: &str,
    levels: &[String],
) -> Result<(), rcman::error::RunlevelError> {
    let script_path = scripts_dir.join(service);
    for level in levels {
        runlevel::reject_reserved(level).or_else(|e| {
            if is_system_default(level) {
                Ok(())
            } else {
                Err(e)
            }
        })?;
        let rl = Runlevel::new(runlevel_root, level);
        rl.add(service, &script_path)?;
        println!(" * {service} added to runlevel {level}");
    }
    Ok(())
}

fn del(
    runlevel_root: &std::path::Path,
    service: &str,
    levels: &[String],
) -> Result<(), rcman::error::RunlevelError> {
    for level in levels {
        let rl = Runlevel::new(runlevel_root, level);
        rl.remove(service)?;
        println!(" * {service} removed from runlevel {level}");
    }
    Ok(())
}

fn show(runlevel_root: &std::path::Path, only: Option<&str>) -> Result<(), rcman::error::RunlevelError> {
    let entries = match std::fs::read_dir(runlevel_root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    let mut levels: Vec<String> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .collect();
    levels.sort();

    for level in levels {
        if let Some(only) = only {
            if only != level {
                continue;
            }
        }
        let rl = Runlevel::new(runlevel_root, &level);
        for member in rl.members()? {
            println!("{member:>25} | {level}");
        }
    }
    Ok(())
}

fn is_system_default(level: &str) -> bool {
    level == "default"
}

fn init_logging(common: &rcman::cli::CommonArgs) {
    let filter = common
        .log_level
        .map(|l| EnvFilter::new(l.as_str()))
        .unwrap_or_else(EnvFilter::from_default_env);
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
