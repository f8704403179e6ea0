//! Magic numbers and fixed strings used across rcman, centralized as one
//! source of truth rather than scattered across modules.

use std::time::Duration;

// ============================================================================
// State-store directory/file names
// ============================================================================

/// Primary service-state directory names. A service's symlink lives in at
/// most one of these at a time.
pub const PRIMARY_STATES: &[&str] = &[
    "starting", "started", "stopping", "inactive", "stopped", "failed",
];

/// Flag directories: a service may appear in any subset of these
/// simultaneously, orthogonal to its primary state.
pub const FLAG_STATES: &[&str] = &["hotplugged", "wasinactive"];

/// Directory holding per-service exclusive-lock artifacts.
pub const EXCLUSIVE_DIR: &str = "exclusive";

/// Directory holding per-service scheduled-start markers.
pub const SCHEDULED_DIR: &str = "scheduled";

/// Directory holding recorded daemon tuples per service.
pub const DAEMONS_DIR: &str = "daemons";

/// Directory holding arbitrary per-service key/value scratch storage.
pub const OPTIONS_DIR: &str = "options";

/// Cached, serialized dependency tree file name.
pub const DEPTREE_FILE: &str = "deptree";

/// File recording the current runlevel name.
pub const SOFTLEVEL_FILE: &str = "softlevel";

/// Sentinel file present while a runlevel change is stopping services.
pub const RC_STOPPING_SENTINEL: &str = "rc.stopping";

/// Sentinel file present while a runlevel change is starting services.
pub const RC_STARTING_SENTINEL: &str = "rc.starting";

/// Sentinel file recording a detected clock-skew event during cache rebuild.
pub const CLOCK_SKEW_SENTINEL: &str = "clock_skew";

/// Sidecar file listing extra external config paths (outside the manager's
/// own script/config directories) whose mtime should also invalidate the
/// dependency cache.
pub const DEPCONFIG_FILE: &str = "depconfig";

// ============================================================================
// Reserved runlevel names
// ============================================================================

/// Runlevel names with system-defined meaning; administrators may not reuse
/// them for arbitrary stacks.
pub const RESERVED_RUNLEVELS: &[&str] = &[
    "sysinit", "boot", "default", "single", "shutdown", "reboot", "nonetwork",
];

// ============================================================================
// Timing
// ============================================================================

/// Poll interval for `wait_for` while a service settles.
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Default deadline for `wait_for`, disabled by the `notimeout` keyword.
pub const WAIT_DEFAULT_DEADLINE: Duration = Duration::from_secs(300);

/// Default stop-schedule timeout when none is configured.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll interval used while a stop-schedule timeout item waits for exit.
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// Keywords
// ============================================================================

/// Keyword disabling the `wait_for` deadline for a service.
pub const KEYWORD_NOTIMEOUT: &str = "notimeout";

/// Keyword marking a service as permanently unable to start cleanly.
pub const KEYWORD_BROKEN: &str = "broken";

// ============================================================================
// Environment variables consumed
// ============================================================================

/// The service a runner invocation is operating on.
pub const ENV_RC_SVCNAME: &str = "RC_SVCNAME";
/// Hints that the current action was triggered by a hotplug event.
pub const ENV_IN_BACKGROUND: &str = "IN_BACKGROUND";
/// If set, gates actions by the hotplug service glob list.
pub const ENV_IN_HOTPLUG: &str = "IN_HOTPLUG";
/// Enables concurrent child spawns in the runlevel driver.
pub const ENV_RC_PARALLEL: &str = "RC_PARALLEL";
/// Output verbosity toggles.
pub const ENV_RC_DEBUG: &str = "RC_DEBUG";
/// See [`ENV_RC_DEBUG`].
pub const ENV_RC_VERBOSE: &str = "RC_VERBOSE";
/// See [`ENV_RC_DEBUG`].
pub const ENV_RC_QUIET: &str = "RC_QUIET";
/// Exported for filesystem-unmount helpers.
pub const ENV_RC_NET_FS_LIST: &str = "RC_NET_FS_LIST";
/// Virtualization hint read by scripts.
pub const ENV_RC_SYS: &str = "RC_SYS";
/// PID of the runner/driver, used by process discovery to exclude itself.
pub const ENV_RCMAN_PID: &str = "RCMAN_PID";

// ============================================================================
// Control FIFO protocol
// ============================================================================

/// Maximum line length accepted on a supervisor control FIFO.
pub const CONTROL_FIFO_MAX_LINE: usize = 2048;
