//! Error types for rcman's subsystems.
//!
//! Each enum corresponds to one subsystem's failure modes.
//! Propagation policy: only `BrokenDependency`, `AlreadyExclusive`,
//! `PayloadFailed`, and `Fatal` abort an in-progress operation; all other
//! variants are surfaced as warnings by the caller, which then continues.
use thiserror::Error;

/// Errors raised while building or querying the dependency graph.
#[derive(Debug, Error)]
pub enum DependError {
    /// A `need` relation points at a service that does not exist.
    #[error("service '{service}' declares unknown dependency '{dependency}'")]
    MissingDependency {
        /// The service with the invalid reference.
        service: String,
        /// The unresolved target name.
        dependency: String,
    },

    /// A service declares itself as its own `need` target.
    #[error("service '{service}' cannot depend on itself")]
    SelfDependency {
        /// The offending service.
        service: String,
    },

    /// Failed to read the init-scripts or configuration directory.
    #[error("failed to scan dependency sources: {0}")]
    ScanFailed(#[from] std::io::Error),

    /// The cached dependency tree on disk is malformed.
    #[error("malformed dependency tree cache: {0}")]
    MalformedCache(String),
}

/// Errors raised by the filesystem-rooted state store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O failure manipulating a state-store path.
    #[error("state store I/O error at {path}: {source}")]
    Io {
        /// The path being operated on.
        path: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Another writer already holds the service's exclusive lock.
    #[error("service '{0}' is already held by another writer")]
    AlreadyExclusive(String),

    /// `wait_for` exceeded its deadline.
    #[error("timed out waiting for service '{0}' to settle")]
    Timeout(String),

    /// A `mark` was requested into a non-stopped state for a service with no script.
    #[error("service '{0}' has no backing script and cannot be marked active")]
    NoScript(String),
}

/// Errors raised by the service runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Requested service is not known to the dependency tree.
    #[error("no such service: {0}")]
    NotFound(String),

    /// A hard dependency is `failed` or carries the `broken` keyword.
    #[error("service '{service}' cannot start: dependency '{dependency}' is broken")]
    BrokenDependency {
        /// The service being started.
        service: String,
        /// The broken dependency.
        dependency: String,
    },

    /// Another writer holds the service's exclusive lock.
    #[error("service '{0}' is already being acted on")]
    AlreadyExclusive(String),

    /// The service's shell-helper payload returned non-zero.
    #[error("action '{action}' failed for service '{service}': exit status {status}")]
    PayloadFailed {
        /// The service whose payload failed.
        service: String,
        /// The action being performed.
        action: String,
        /// The process exit status.
        status: i32,
    },

    /// The start was deferred because a `need` ended up `inactive`.
    ///
    /// Not a failure: callers surface a warning and return success.
    #[error("start of '{0}' deferred: waiting on an inactive dependency")]
    Scheduled(String),

    /// The refused action would violate a precondition (already started, etc).
    #[error("cannot {action} service '{service}': {reason}")]
    Refused {
        /// Service name.
        service: String,
        /// Action attempted.
        action: String,
        /// Why it was refused.
        reason: String,
    },

    /// Underlying state-store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Underlying dependency-engine failure.
    #[error(transparent)]
    Depend(#[from] DependError),

    /// Underlying I/O failure launching or waiting on the payload.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised by the runlevel driver.
#[derive(Debug, Error)]
pub enum RunlevelError {
    /// Named runlevel does not exist on disk.
    #[error("no such runlevel: {0}")]
    NotFound(String),

    /// A reserved runlevel name was used somewhere it is not permitted.
    #[error("'{0}' is a reserved runlevel name")]
    Reserved(String),

    /// Underlying runner failure during the transition.
    #[error(transparent)]
    Runner(#[from] RunnerError),

    /// Underlying state-store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// I/O failure manipulating runlevel symlinks or sentinels.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised by the process supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Failed to fork or exec the supervised daemon.
    #[error("failed to launch daemon for '{service}': {source}")]
    Spawn {
        /// The service being supervised.
        service: String,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The respawn ceiling (`respawn_max` within `respawn_period`) was exceeded.
    #[error("service '{0}' exceeded its respawn ceiling")]
    RespawnCeilingExceeded(String),

    /// A privilege-dropping syscall failed.
    #[error("failed to apply privilege settings for '{service}': {source}")]
    Privilege {
        /// The service being started.
        service: String,
        /// The underlying errno.
        #[source]
        source: nix::errno::Errno,
    },

    /// The control FIFO could not be created or read.
    #[error("control channel error for '{0}': {1}")]
    ControlChannel(String, std::io::Error),

    /// Underlying stop-schedule failure.
    #[error(transparent)]
    StopSchedule(#[from] StopScheduleError),

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised while parsing or executing a stop-schedule.
#[derive(Debug, Error)]
pub enum StopScheduleError {
    /// A `forever` item appeared before any `timeout` item.
    #[error("stop-schedule has 'forever' before any 'timeout'")]
    ForeverBeforeTimeout,

    /// An unknown schedule item token was encountered while parsing.
    #[error("unrecognized stop-schedule item: {0}")]
    UnknownItem(String),
}

/// Errors raised during process discovery.
#[derive(Debug, Error)]
pub enum ProcscanError {
    /// The process table could not be read (e.g. `/proc` inaccessible).
    ///
    /// Callers must treat this as inconclusive, not as "no matching process".
    #[error("cannot enumerate processes: {0}")]
    CannotFindPids(String),
}

/// Top-level error, used at the binary boundary where any subsystem error
/// may surface.
#[derive(Debug, Error)]
pub enum RcError {
    /// Dependency-engine failure.
    #[error(transparent)]
    Depend(#[from] DependError),
    /// State-store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Runner failure.
    #[error(transparent)]
    Runner(#[from] RunnerError),
    /// Runlevel-driver failure.
    #[error(transparent)]
    Runlevel(#[from] RunlevelError),
    /// Supervisor failure.
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    /// Process-discovery failure.
    #[error(transparent)]
    Procscan(#[from] ProcscanError),
    /// Malformed or unreadable global configuration.
    #[error("configuration error: {0}")]
    Config(String),
    /// Unrecoverable failure: allocation, state-store unwritable, EIO.
    #[error("fatal error: {0}")]
    Fatal(String),
}
