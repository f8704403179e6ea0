//! Core dependency engine, state store, and process supervisor for a POSIX
//! service manager.

#![warn(unused_crate_dependencies)]
// These dependencies are only used in the binaries under src/bin/.
#[cfg(test)]
use assert_cmd as _;
use ctrlc as _;
use crossterm as _;
// caps is only available on Linux; referenced from src/supervisor.rs behind
// a cfg gate.
#[cfg(target_os = "linux")]
use caps as _;
#[cfg(test)]
use predicates as _;
use strum as _;
#[cfg(test)]
use tempfile as _;
use tracing_subscriber as _;

/// CLI argument parsing shared by the three binaries.
pub mod cli;

/// Global configuration loading.
pub mod config;

/// Constants.
pub mod constants;

/// Errors.
pub mod error;

/// Typed access to the runner/hotplug environment contract.
pub mod env;

/// Hook dispatch to external plugins.
pub mod hooks;

/// Process liveness discovery.
pub mod procscan;

/// Dependency engine: loading, graph, provider resolution, ordering, caching.
pub mod depend;

/// Filesystem-rooted state store and state machine.
pub mod store;

/// Runlevel membership model.
pub mod runlevel;

/// Service runner / action executor.
pub mod runner;

/// Runlevel driver (the `rc` transition engine).
pub mod rc;

/// Stop-schedule interpreter.
pub mod stopsched;

/// Process supervisor.
pub mod supervisor;

/// Runtime paths and modes.
pub mod runtime;

/// Test utils.
#[doc(hidden)]
pub mod test_utils;
