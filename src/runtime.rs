//! Resolves runtime paths (state store root, log directory, config search
//! path) based on the active privilege mode, the way the per-invocation
//! supervisor fork needs to re-derive them after `fork()`.
use std::{
    env,
    path::PathBuf,
    sync::{OnceLock, RwLock},
};

#[cfg(test)]
use std::path::Path;

/// Runtime mode that determines where state, logs, and config are rooted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeMode {
    /// Userspace/development mode: state lives under the invoking user's home.
    User,
    /// System mode: state lives in `/var/lib`, `/var/log`, `/etc`, as a real
    /// init system would use; requires the caller to already hold the
    /// necessary privileges.
    System,
}

#[derive(Debug, Clone)]
struct RuntimeContext {
    mode: RuntimeMode,
    state_dir: PathBuf,
    log_dir: PathBuf,
    config_dirs: Vec<PathBuf>,
    runlevel_dir: PathBuf,
}

static CONTEXT: OnceLock<RwLock<RuntimeContext>> = OnceLock::new();

fn context_lock() -> &'static RwLock<RuntimeContext> {
    CONTEXT.get_or_init(|| RwLock::new(RuntimeContext::from_mode(RuntimeMode::User)))
}

impl RuntimeContext {
    fn from_mode(mode: RuntimeMode) -> Self {
        match mode {
            RuntimeMode::User => Self::user_directories(),
            RuntimeMode::System => Self::system_directories(),
        }
    }

    fn user_directories() -> Self {
        let home = env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/"));
        Self::from_user_home(home)
    }

    fn from_user_home(home: PathBuf) -> Self {
        let state_dir = home.join(".local/share/rcman");
        let log_dir = state_dir.join("logs");
        let config_dir = home.join(".config/rcman");
        let runlevel_dir = config_dir.join("runlevels");

        Self {
            mode: RuntimeMode::User,
            state_dir,
            log_dir,
            config_dirs: vec![config_dir],
            runlevel_dir,
        }
    }

    fn system_directories() -> Self {
        let state_dir = PathBuf::from("/var/lib/rcman");
        let log_dir = PathBuf::from("/var/log/rcman");
        let config_dir = PathBuf::from("/etc/rcman");
        let runlevel_dir = config_dir.join("runlevels");

        Self {
            mode: RuntimeMode::System,
            state_dir,
            log_dir,
            config_dirs: vec![config_dir],
            runlevel_dir,
        }
    }
}

/// Overwrites the active runtime context. Subsequent invocations (e.g. a
/// supervisor re-exec after `SIGHUP`) call this again to pick up the
/// correct mode post-fork.
pub fn init(mode: RuntimeMode) {
    let mut guard = context_lock().write().expect("runtime context poisoned");
    *guard = RuntimeContext::from_mode(mode);
}

#[cfg(test)]
pub fn init_with_test_home(home: &Path) {
    let mut guard = context_lock().write().expect("runtime context poisoned");
    *guard = RuntimeContext::from_user_home(home.to_path_buf());
}

/// Returns the current runtime mode.
pub fn mode() -> RuntimeMode {
    context_lock()
        .read()
        .expect("runtime context poisoned")
        .mode
}

/// Returns the root directory for the state store.
pub fn state_dir() -> PathBuf {
    context_lock()
        .read()
        .expect("runtime context poisoned")
        .state_dir
        .clone()
}

/// Returns the directory where supervisor and service logs should reside.
pub fn log_dir() -> PathBuf {
    context_lock()
        .read()
        .expect("runtime context poisoned")
        .log_dir
        .clone()
}

/// Returns the directories searched for the global configuration file and
/// per-service init scripts.
pub fn config_dirs() -> Vec<PathBuf> {
    context_lock()
        .read()
        .expect("runtime context poisoned")
        .config_dirs
        .clone()
}

/// Returns the directory holding runlevel membership symlink trees.
pub fn runlevel_dir() -> PathBuf {
    context_lock()
        .read()
        .expect("runtime context poisoned")
        .runlevel_dir
        .clone()
}
