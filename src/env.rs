//! Typed access to the environment contract that runner payloads and
//! hotplug callers use to communicate intent.
use std::env;

use crate::constants::{
    ENV_IN_BACKGROUND, ENV_IN_HOTPLUG, ENV_RC_DEBUG, ENV_RC_NET_FS_LIST, ENV_RC_PARALLEL,
    ENV_RC_QUIET, ENV_RC_SVCNAME, ENV_RC_SYS, ENV_RC_VERBOSE, ENV_RCMAN_PID,
};

/// Snapshot of the runner environment contract, read once at process start.
///
/// Constructing this more than once per process is harmless but wasteful;
/// callers should read it early and pass the value down rather than calling
/// [`std::env::var`] ad hoc.
#[derive(Debug, Clone, Default)]
pub struct RcEnv {
    /// The service a runner invocation is operating on, if invoked as a
    /// sub-dependency rather than directly.
    pub svcname: Option<String>,
    /// Set when the action is running as a backgrounded (scheduled) start.
    pub in_background: bool,
    /// Set when the action was triggered by a hotplug event.
    pub in_hotplug: bool,
    /// Enables concurrent child spawns in the runlevel driver.
    pub parallel: bool,
    /// Debug-level shell tracing requested.
    pub debug: bool,
    /// Verbose output requested.
    pub verbose: bool,
    /// Quiet output requested.
    pub quiet: bool,
    /// Space-separated list of network filesystem types, consumed by
    /// unmount helper scripts.
    pub net_fs_list: Option<String>,
    /// Virtualization hint string (e.g. `"lxc"`, `"docker"`), empty on bare
    /// metal.
    pub sys: Option<String>,
}

impl RcEnv {
    /// Reads the current process environment into an [`RcEnv`] snapshot.
    pub fn from_process() -> Self {
        Self {
            svcname: env::var(ENV_RC_SVCNAME).ok(),
            in_background: is_truthy(ENV_IN_BACKGROUND),
            in_hotplug: is_truthy(ENV_IN_HOTPLUG),
            parallel: is_truthy(ENV_RC_PARALLEL),
            debug: is_truthy(ENV_RC_DEBUG),
            verbose: is_truthy(ENV_RC_VERBOSE),
            quiet: is_truthy(ENV_RC_QUIET),
            net_fs_list: env::var(ENV_RC_NET_FS_LIST).ok(),
            sys: env::var(ENV_RC_SYS).ok(),
        }
    }

    /// Applies this environment to a [`std::process::Command`] about to
    /// invoke a service payload, propagating only the variables a direct
    /// payload invocation should see.
    ///
    /// `IN_BACKGROUND` is deliberately not propagated to dependency
    /// sub-invocations; only the directly-invoked payload should observe it.
    pub fn apply_to_direct_payload(&self, cmd: &mut std::process::Command, svcname: &str) {
        cmd.env(ENV_RC_SVCNAME, svcname);
        if self.in_background {
            cmd.env(ENV_IN_BACKGROUND, "YES");
        }
        if self.in_hotplug {
            cmd.env(ENV_IN_HOTPLUG, "YES");
        }
        if self.parallel {
            cmd.env(ENV_RC_PARALLEL, "YES");
        }
        if self.debug {
            cmd.env(ENV_RC_DEBUG, "YES");
        }
        if self.verbose {
            cmd.env(ENV_RC_VERBOSE, "YES");
        }
        if self.quiet {
            cmd.env(ENV_RC_QUIET, "YES");
        }
        if let Some(ref list) = self.net_fs_list {
            cmd.env(ENV_RC_NET_FS_LIST, list);
        }
        if let Some(ref sys) = self.sys {
            cmd.env(ENV_RC_SYS, sys);
        }
        cmd.env(ENV_RCMAN_PID, std::process::id().to_string());
    }

    /// Applies the subset of variables appropriate for a dependency
    /// sub-invocation (no `IN_BACKGROUND`).
    pub fn apply_to_dependency(&self, cmd: &mut std::process::Command, svcname: &str) {
        cmd.env(ENV_RC_SVCNAME, svcname);
        if self.in_hotplug {
            cmd.env(ENV_IN_HOTPLUG, "YES");
        }
        if self.parallel {
            cmd.env(ENV_RC_PARALLEL, "YES");
        }
        cmd.env(ENV_RCMAN_PID, std::process::id().to_string());
    }
}

fn is_truthy(var: &str) -> bool {
    match env::var(var) {
        Ok(v) => !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("no"),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::env_lock;

    #[test]
    fn truthy_parsing() {
        let _guard = env_lock();
        env::set_var(ENV_RC_DEBUG, "YES");
        assert!(is_truthy(ENV_RC_DEBUG));
        env::set_var(ENV_RC_DEBUG, "0");
        assert!(!is_truthy(ENV_RC_DEBUG));
        env::remove_var(ENV_RC_DEBUG);
        assert!(!is_truthy(ENV_RC_DEBUG));
    }

    #[test]
    fn dependency_invocation_omits_in_background() {
        let env = RcEnv {
            in_background: true,
            ..Default::default()
        };
        let mut cmd = std::process::Command::new("true");
        env.apply_to_dependency(&mut cmd, "net");
        let envs: Vec<_> = cmd.get_envs().collect();
        assert!(envs.iter().all(|(k, _)| *k != ENV_IN_BACKGROUND));
    }
}
