//! Process liveness discovery, the way `start-stop-daemon`-equivalents
//! confirm a daemon is actually running rather than trusting a stale pidfile.
use std::collections::HashSet;

use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::constants::ENV_RCMAN_PID;
use crate::error::ProcscanError;

/// Criteria used to match running processes against a supervised daemon.
#[derive(Debug, Clone, Default)]
pub struct ProcMatch {
    /// Absolute path to the executable. Matched tolerating a trailing
    /// `" (deleted)"` suffix left by `/proc/<pid>/exe` after an upgrade.
    pub exec: Option<String>,
    /// Expected `argv[0]`.
    pub argv0: Option<String>,
    /// Expected effective uid.
    pub uid: Option<u32>,
    /// A specific pid to confirm, bypassing exec/argv0/uid matching.
    pub pid: Option<i32>,
}

/// Scans the process table and returns the set of pids matching `criteria`.
///
/// A single [`System::new_all`] refresh backs the whole scan; this is a
/// user-space equivalent of walking `/proc` once rather than re-stat'ing it
/// per candidate. Processes excluded with [`ENV_RCMAN_PID`] are the
/// supervisor's own pid, analogous to OpenRC's `OPENRC_PID` self-exclusion.
pub fn find_pids(criteria: &ProcMatch) -> Result<HashSet<i32>, ProcscanError> {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);

    let self_pid: Option<i32> = std::env::var(ENV_RCMAN_PID)
        .ok()
        .and_then(|v| v.parse().ok());

    if let Some(pid) = criteria.pid {
        let found = system.process(Pid::from_u32(pid as u32)).is_some();
        let mut set = HashSet::new();
        if found {
            set.insert(pid);
        }
        return Ok(set);
    }

    let mut matches = HashSet::new();
    for (pid, process) in system.processes() {
        let pid_i32 = pid.as_u32() as i32;
        if Some(pid_i32) == self_pid {
            continue;
        }

        if let Some(ref wanted_exec) = criteria.exec {
            let actual = process
                .exe()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            let trimmed = actual.strip_suffix(" (deleted)").unwrap_or(&actual);
            if trimmed != wanted_exec {
                continue;
            }
        }

        if let Some(ref wanted_argv0) = criteria.argv0 {
            let actual_argv0 = process.cmd().first().map(|s| s.to_string_lossy());
            match actual_argv0 {
                Some(a) if a.as_ref() == wanted_argv0.as_str() => {}
                _ => continue,
            }
        }

        if let Some(wanted_uid) = criteria.uid {
            match process.user_id() {
                Some(uid) => {
                    if **uid != wanted_uid {
                        continue;
                    }
                }
                None => continue,
            }
        }

        matches.insert(pid_i32);
    }

    Ok(matches)
}
