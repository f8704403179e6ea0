//! Command-line argument definitions for rcman's three binaries.
use clap::{Parser, Subcommand};
use std::str::FromStr;
use tracing::level_filters::LevelFilter;

/// Wrapper around `LevelFilter` so clap can parse log levels from either
/// string names ("info", "debug", etc.) or numeric shorthands (0-5).
#[derive(Clone, Copy, Debug)]
pub struct LogLevelArg(LevelFilter);

impl LogLevelArg {
    /// String representation suitable for `RUST_LOG`.
    pub fn as_str(&self) -> &'static str {
        match self.0 {
            LevelFilter::OFF => "off",
            LevelFilter::ERROR => "error",
            LevelFilter::WARN => "warn",
            LevelFilter::INFO => "info",
            LevelFilter::DEBUG => "debug",
            LevelFilter::TRACE => "trace",
        }
    }
}

impl FromStr for LogLevelArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("log level cannot be empty".into());
        }

        if let Ok(number) = trimmed.parse::<u8>() {
            let level = match number {
                0 => LevelFilter::OFF,
                1 => LevelFilter::ERROR,
                2 => LevelFilter::WARN,
                3 => LevelFilter::INFO,
                4 => LevelFilter::DEBUG,
                5 => LevelFilter::TRACE,
                _ => {
                    return Err(format!(
                        "unsupported log level number '{number}' (expected 0-5)"
                    ));
                }
            };

            return Ok(LogLevelArg(level));
        }

        let lowercase = trimmed.to_ascii_lowercase();
        let level = match lowercase.as_str() {
            "off" => Some(LevelFilter::OFF),
            "error" | "err" => Some(LevelFilter::ERROR),
            "warn" | "warning" => Some(LevelFilter::WARN),
            "info" | "information" => Some(LevelFilter::INFO),
            "debug" => Some(LevelFilter::DEBUG),
            "trace" => Some(LevelFilter::TRACE),
            _ => None,
        }
        .ok_or_else(|| format!("invalid log level '{trimmed}'"))?;

        Ok(LogLevelArg(level))
    }
}

/// Global flags shared by all three binaries.
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    /// Override the logging verbosity for this invocation only.
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Opt into privileged system mode (state under `/var/lib`, `/etc`).
    /// Requires running as root.
    #[arg(long = "sys", global = true)]
    pub sys: bool,
}

/// `rc`: the runlevel transition driver.
#[derive(Parser, Debug)]
#[command(name = "rc", version, author)]
#[command(about = "Bring the system to a named runlevel", long_about = None)]
pub struct RcArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Target runlevel name. Omit to re-run the current softlevel.
    pub runlevel: Option<String>,

    /// Disable interactive service skip/continue prompting.
    #[arg(long)]
    pub no_interactive: bool,
}

/// `rc-service`: run a single service action.
#[derive(Parser, Debug)]
#[command(name = "rc-service", version, author)]
#[command(about = "Run an action against a single service", long_about = None)]
pub struct RcServiceArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Only run the action if the service is currently started.
    #[arg(short = 'C', long = "ifstarted")]
    pub ifstarted: bool,

    /// Only run the action if the service is currently inactive.
    #[arg(short = 'i', long = "ifinactive")]
    pub ifinactive: bool,

    /// Only run the action if the service is currently stopped.
    #[arg(short = 's', long = "ifstopped")]
    pub ifstopped: bool,

    /// Do not run dependent services (used internally by the runlevel driver).
    #[arg(short = 'q', long = "nodeps")]
    pub nodeps: bool,

    /// Service name.
    pub service: String,

    /// Action to perform: start, stop, restart, status, describe, zap.
    pub action: String,
}

/// `rc-update`: manage runlevel membership.
#[derive(Parser, Debug)]
#[command(name = "rc-update", version, author)]
#[command(about = "Add, delete, and show runlevel membership", long_about = None)]
pub struct RcUpdateArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub command: RcUpdateCommand,
}

/// Subcommands accepted by `rc-update`.
#[derive(Subcommand, Debug)]
pub enum RcUpdateCommand {
    /// Add a service to one or more runlevels.
    Add {
        /// Service name.
        service: String,
        /// Runlevels to add the service to (defaults to the current one).
        runlevels: Vec<String>,
    },
    /// Remove a service from one or more runlevels.
    Del {
        /// Service name.
        service: String,
        /// Runlevels to remove the service from (defaults to the current one).
        runlevels: Vec<String>,
    },
    /// List runlevels and their member services.
    Show {
        /// Restrict the listing to a single runlevel.
        runlevel: Option<String>,
    },
}
