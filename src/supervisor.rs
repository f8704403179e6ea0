//! Process supervisor: keeps a single daemon alive, applying privilege and
//! resource settings at spawn time and respawning it within configured
//! limits.
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use nix::sys::signal::{self, Signal};
use nix::unistd::{mkfifo, Gid, Uid};
use tracing::{error, info, warn};

use crate::constants::CONTROL_FIFO_MAX_LINE;
use crate::error::SupervisorError;
use crate::stopsched::{ScheduleItem, StopSchedule};
use crate::store::{self, StateHandle};

/// Full set of spawn-time and respawn parameters for a supervised service.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Absolute path to the daemon executable.
    pub exec: PathBuf,
    /// Arguments passed to the daemon.
    pub args: Vec<String>,
    /// Delay before a respawn attempt after an unexpected exit.
    pub respawn_delay: Duration,
    /// Maximum respawns allowed within `respawn_period`.
    pub respawn_max: u32,
    /// Rolling window over which `respawn_max` is counted.
    pub respawn_period: Duration,
    /// Delay before the first healthcheck probe after spawn.
    pub healthcheck_delay: Duration,
    /// Interval between healthcheck probes, if any.
    pub healthcheck_timer: Option<Duration>,
    /// Shell command run to probe health; non-zero exit is unhealthy.
    pub healthcheck_command: Option<String>,
    /// Stop schedule used when `stop` is requested.
    pub retry_schedule: StopSchedule,
    /// `nice(2)` value applied to the child.
    pub nicelevel: Option<i32>,
    /// `ionice` class:data pair, e.g. `(2, 4)` for best-effort priority 4.
    pub ionice: Option<(u32, u32)>,
    /// `/proc/<pid>/oom_score_adj` value.
    pub oom_score_adj: Option<i32>,
    /// `umask(2)` applied before exec.
    pub umask: Option<u32>,
    /// `chroot(2)` directory.
    pub chroot: Option<PathBuf>,
    /// Working directory after chroot (if any).
    pub chdir: Option<PathBuf>,
    /// User to run as, resolved to uid by the caller.
    pub user: Option<Uid>,
    /// Group to run as, resolved to gid by the caller.
    pub group: Option<Gid>,
    /// Linux capabilities retained after privilege drop (empty: drop all).
    pub capabilities: Vec<String>,
    /// Securebits value applied before privilege drop.
    pub secbits: Option<u32>,
    /// Sets `PR_SET_NO_NEW_PRIVS`.
    pub no_new_privs: bool,
    /// `sched_setscheduler` policy name (`other`, `fifo`, `rr`, `batch`, `idle`).
    pub scheduler: Option<String>,
    /// Priority used with `scheduler` for realtime policies.
    pub priority: Option<i32>,
    /// Path to append stdout to, `O_APPEND`.
    pub stdout_path: Option<PathBuf>,
    /// Path to append stderr to, `O_APPEND`.
    pub stderr_path: Option<PathBuf>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            exec: PathBuf::new(),
            args: Vec::new(),
            respawn_delay: Duration::from_secs(1),
            respawn_max: 10,
            respawn_period: Duration::from_secs(60),
            healthcheck_delay: Duration::from_secs(0),
            healthcheck_timer: None,
            healthcheck_command: None,
            retry_schedule: StopSchedule::default_schedule(),
            nicelevel: None,
            ionice: None,
            oom_score_adj: None,
            umask: None,
            chroot: None,
            chdir: None,
            user: None,
            group: None,
            capabilities: Vec::new(),
            secbits: None,
            no_new_privs: false,
            scheduler: None,
            priority: None,
            stdout_path: None,
            stderr_path: None,
        }
    }
}

/// A running supervised service and its respawn bookkeeping.
pub struct Supervisor<'a> {
    service: String,
    store: &'a StateHandle,
    config: SupervisorConfig,
    stopping: Arc<AtomicBool>,
    respawns: Mutex<Vec<Instant>>,
}

impl<'a> Supervisor<'a> {
    /// Builds a supervisor for `service`.
    pub fn new(service: &str, store: &'a StateHandle, config: SupervisorConfig) -> Self {
        Self {
            service: service.to_string(),
            store,
            config,
            stopping: Arc::new(AtomicBool::new(false)),
            respawns: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the daemon and blocks, respawning it as needed, until a stop
    /// is requested via the control FIFO or the respawn ceiling is hit.
    pub fn run(&self) -> Result<(), SupervisorError> {
        let fifo_path = self.control_fifo_path();
        self.ensure_control_fifo(&fifo_path)?;

        loop {
            if self.stopping.load(Ordering::SeqCst) {
                return Ok(());
            }

            let mut child = self.spawn_once()?;
            self.record_daemon(&child);

            let stopping = Arc::clone(&self.stopping);
            let fifo_path_clone = fifo_path.clone();
            let control_thread = std::thread::spawn(move || {
                Self::watch_control_fifo(&fifo_path_clone, &stopping)
            });

            let status = child.wait().map_err(|source| SupervisorError::Spawn {
                service: self.service.clone(),
                source,
            })?;

            let _ = control_thread.join();

            if self.stopping.load(Ordering::SeqCst) {
                return Ok(());
            }

            warn!(service = %self.service, status = ?status.code(), "daemon exited unexpectedly");

            if !self.respawn_allowed() {
                return Err(SupervisorError::RespawnCeilingExceeded(self.service.clone()));
            }

            std::thread::sleep(self.config.respawn_delay);
        }
    }

    fn respawn_allowed(&self) -> bool {
        let mut respawns = self.respawns.lock().expect("respawn tracker poisoned");
        let now = Instant::now();
        respawns.retain(|t| now.duration_since(*t) <= self.config.respawn_period);
        if respawns.len() as u32 >= self.config.respawn_max {
            return false;
        }
        respawns.push(now);
        true
    }

    fn spawn_once(&self) -> Result<Child, SupervisorError> {
        let mut cmd = Command::new(&self.config.exec);
        cmd.args(&self.config.args);

        if let Some(ref path) = self.config.stdout_path {
            if let Ok(file) = append_file(path) {
                cmd.stdout(file);
            }
        }
        if let Some(ref path) = self.config.stderr_path {
            if let Ok(file) = append_file(path) {
                cmd.stderr(file);
            }
        }

        let config = self.config.clone();
        unsafe {
            cmd.pre_exec(move || apply_privilege_settings(&config));
        }

        cmd.spawn().map_err(|source| SupervisorError::Spawn {
            service: self.service.clone(),
            source,
        })
    }

    fn record_daemon(&self, child: &Child) {
        let record = store::daemons::DaemonRecord {
            exec: self.config.exec.display().to_string(),
            argv0: None,
            uid: self.config.user.map(|u| u.as_raw()),
            pid: child.id() as i32,
        };
        if let Err(e) = store::daemons::record(self.store, &self.service, &record) {
            warn!(service = %self.service, error = %e, "failed to record daemon tuple");
        }
    }

    fn control_fifo_path(&self) -> PathBuf {
        self.store.root().join("control").join(&self.service)
    }

    fn ensure_control_fifo(&self, path: &PathBuf) -> Result<(), SupervisorError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| SupervisorError::ControlChannel(self.service.clone(), e))?;
        }
        if !path.exists() {
            mkfifo(path, nix::sys::stat::Mode::from_bits_truncate(0o600))
                .map_err(|e| {
                    SupervisorError::ControlChannel(
                        self.service.clone(),
                        std::io::Error::from_raw_os_error(e as i32),
                    )
                })?;
        }
        Ok(())
    }

    fn watch_control_fifo(path: &PathBuf, stopping: &Arc<AtomicBool>) {
        let Ok(file) = fs::File::open(path) else {
            return;
        };
        let mut reader = BufReader::new(file);
        loop {
            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {
                    let line = line.trim();
                    if line.len() > CONTROL_FIFO_MAX_LINE {
                        continue;
                    }
                    if line == "stop" {
                        stopping.store(true, Ordering::SeqCst);
                        break;
                    }
                    if let Some(sig) = line.strip_prefix("sig ") {
                        if let Ok(signum) = sig.trim().parse::<i32>() {
                            if let Ok(signal) = Signal::try_from(signum) {
                                let _ = signal::kill(nix::unistd::Pid::this(), signal);
                            }
                        }
                    }
                }
                Err(_) => break,
            }
        }
    }

    /// Stops the supervised daemon following its configured stop schedule,
    /// escalating through each signal/timeout item.
    pub fn stop(&self, pid: i32) -> Result<(), SupervisorError> {
        self.stopping.store(true, Ordering::SeqCst);
        let pid = nix::unistd::Pid::from_raw(pid);

        for item in self.config.retry_schedule.items() {
            match item {
                ScheduleItem::Signal(sig) => {
                    if let Ok(signal) = Signal::try_from(*sig) {
                        let _ = signal::kill(pid, signal);
                    }
                }
                ScheduleItem::Timeout(duration) => {
                    if wait_for_exit(pid, *duration) {
                        return Ok(());
                    }
                }
                ScheduleItem::Goto(_) => {
                    // Looping retry schedules are bounded by the caller's
                    // overall stop-timeout; a single pass through the
                    // schedule without success is reported as a failure.
                    break;
                }
            }
        }

        Err(SupervisorError::ControlChannel(
            self.service.clone(),
            std::io::Error::new(std::io::ErrorKind::TimedOut, "stop schedule exhausted"),
        ))
    }

    /// Re-executes the supervisor binary in place after `SIGHUP`, having
    /// persisted enough state in [`crate::store::options`] to resume
    /// supervising the same service without a gap.
    pub fn reexec(&self, argv0: &str) -> Result<(), SupervisorError> {
        store::options::set(self.store, &self.service, "reexec_pending", "1")
            .map_err(|e| SupervisorError::ControlChannel(self.service.clone(), std::io::Error::other(e)))?;

        let error = std::process::Command::new(argv0)
            .arg("--reexec")
            .arg(&self.service)
            .exec();
        Err(SupervisorError::Spawn {
            service: self.service.clone(),
            source: error,
        })
    }
}

fn wait_for_exit(pid: nix::unistd::Pid, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if signal::kill(pid, None).is_err() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    false
}

fn append_file(path: &PathBuf) -> std::io::Result<fs::File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o640)
        .open(path)
}

fn apply_privilege_settings(config: &SupervisorConfig) -> std::io::Result<()> {
    if let Some(mask) = config.umask {
        unsafe {
            libc::umask(mask as libc::mode_t);
        }
    }

    if let Some(nice) = config.nicelevel {
        unsafe {
            libc::nice(nice as libc::c_int);
        }
    }

    if let Some(ref root) = config.chroot {
        nix::unistd::chroot(root).map_err(to_io_error)?;
        nix::unistd::chdir("/").map_err(to_io_error)?;
    }

    if let Some(ref dir) = config.chdir {
        nix::unistd::chdir(dir).map_err(to_io_error)?;
    }

    if let Some(adj) = config.oom_score_adj {
        let _ = fs::write("/proc/self/oom_score_adj", adj.to_string());
    }

    if let Some((class, data)) = config.ionice {
        apply_ioprio(class, data);
    }

    if let Some(ref policy_name) = config.scheduler {
        apply_scheduler(policy_name, config.priority.unwrap_or(0));
    }

    #[cfg(target_os = "linux")]
    {
        if let Some(bits) = config.secbits {
            unsafe {
                libc::prctl(libc::PR_SET_SECUREBITS, bits as libc::c_ulong, 0, 0, 0);
            }
        }
        if !config.capabilities.is_empty() {
            apply_capabilities(&config.capabilities);
        }
        if config.no_new_privs {
            unsafe {
                libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0);
            }
        }
    }

    if let Some(gid) = config.group {
        nix::unistd::setgid(gid).map_err(to_io_error)?;
    }
    if let Some(uid) = config.user {
        nix::unistd::setuid(uid).map_err(to_io_error)?;
    }

    Ok(())
}

#[cfg(target_os = "linux")]
fn apply_ioprio(class: u32, data: u32) {
    const IOPRIO_WHO_PROCESS: libc::c_int = 1;
    let ioprio = ((class as libc::c_int) << 13) | data as libc::c_int;
    unsafe {
        libc::syscall(libc::SYS_ioprio_set, IOPRIO_WHO_PROCESS, 0, ioprio);
    }
}

#[cfg(not(target_os = "linux"))]
fn apply_ioprio(_class: u32, _data: u32) {}

fn apply_scheduler(policy_name: &str, priority: i32) {
    let policy = match policy_name {
        "fifo" => libc::SCHED_FIFO,
        "rr" => libc::SCHED_RR,
        "batch" => libc::SCHED_BATCH,
        "idle" => libc::SCHED_IDLE,
        _ => libc::SCHED_OTHER,
    };
    let param = libc::sched_param {
        sched_priority: priority,
    };
    unsafe {
        libc::sched_setscheduler(0, policy, &param);
    }
}

#[cfg(target_os = "linux")]
fn apply_capabilities(wanted: &[String]) {
    use caps::{CapSet, Capability};
    let mut keep = caps::CapsHashSet::new();
    for name in wanted {
        if let Ok(cap) = name.parse::<Capability>() {
            keep.insert(cap);
        }
    }
    let _ = caps::set(None, CapSet::Effective, &keep);
    let _ = caps::set(None, CapSet::Permitted, &keep);
}

fn to_io_error(errno: nix::errno::Errno) -> std::io::Error {
    std::io::Error::from_raw_os_error(errno as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn respawn_ceiling_is_enforced_within_period() {
        let temp = tempdir().unwrap();
        let store = StateHandle::open(temp.path().to_path_buf()).unwrap();
        let config = SupervisorConfig {
            respawn_max: 2,
            respawn_period: Duration::from_secs(60),
            ..Default::default()
        };
        let supervisor = Supervisor::new("flaky", &store, config);

        assert!(supervisor.respawn_allowed());
        assert!(supervisor.respawn_allowed());
        assert!(!supervisor.respawn_allowed());
    }

    #[test]
    fn default_stop_schedule_is_term_then_five_seconds() {
        let config = SupervisorConfig::default();
        assert_eq!(config.retry_schedule, StopSchedule::default_schedule());
    }
}
