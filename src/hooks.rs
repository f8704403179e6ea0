//! Hook dispatch to external plugins.
//!
//! Plugins are executables dropped in a hooks directory. Each is invoked
//! once per dispatched event with a `KEY=VALUE\0`-delimited record on
//! stdin describing the event; a non-zero exit is logged but never aborts
//! the calling phase.
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::warn;

/// Named points in the service lifecycle at which hooks may fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, strum_macros::AsRefStr)]
pub enum HookName {
    /// Before a service's `start` phase runs.
    #[strum(serialize = "start_pre")]
    StartPre,
    /// After a service successfully reaches `started`.
    #[strum(serialize = "start_post")]
    StartPost,
    /// Before a service's `stop` phase runs.
    #[strum(serialize = "stop_pre")]
    StopPre,
    /// After a service reaches `stopped`.
    #[strum(serialize = "stop_post")]
    StopPost,
    /// Before a runlevel transition begins.
    #[strum(serialize = "runlevel_start")]
    RunlevelStart,
    /// After a runlevel transition completes.
    #[strum(serialize = "runlevel_stop")]
    RunlevelStop,
}

/// One dispatched event, encoded as an ordered set of key/value fields.
#[derive(Debug, Clone, Default)]
pub struct HookEvent {
    fields: BTreeMap<String, String>,
}

impl HookEvent {
    /// Starts building an event for `service` under the given `hook`.
    pub fn new(hook: HookName, service: &str) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("hook".to_string(), hook.as_ref().to_string());
        fields.insert("service".to_string(), service.to_string());
        fields.insert("time".to_string(), chrono::Utc::now().to_rfc3339());
        Self { fields }
    }

    /// Adds a field to the event record.
    pub fn with_field(mut self, key: &str, value: &str) -> Self {
        self.fields.insert(key.to_string(), value.to_string());
        self
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (key, value) in &self.fields {
            out.extend_from_slice(key.as_bytes());
            out.push(b'=');
            out.extend_from_slice(value.as_bytes());
            out.push(0);
        }
        out
    }
}

/// Dispatches hook events to every executable plugin found under a fixed
/// set of directories.
#[derive(Debug, Clone)]
pub struct HookBus {
    dirs: Vec<PathBuf>,
}

impl HookBus {
    /// Builds a bus that searches `dirs` in order for plugins.
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// Runs every plugin found for `event.hook`, feeding each the encoded
    /// event record on stdin. Plugin failures are logged, never propagated.
    pub fn dispatch(&self, event: &HookEvent) {
        for dir in &self.dirs {
            let Ok(entries) = fs::read_dir(dir) else {
                continue;
            };

            for entry in entries.flatten() {
                let path = entry.path();
                if !is_executable(&path) {
                    continue;
                }
                self.run_plugin(&path, event);
            }
        }
    }

    fn run_plugin(&self, path: &Path, event: &HookEvent) {
        let mut child = match Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(plugin = %path.display(), error = %e, "failed to launch hook plugin");
                return;
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(&event.encode()) {
                warn!(plugin = %path.display(), error = %e, "failed to write hook event");
            }
        }

        match child.wait() {
            Ok(status) if !status.success() => {
                warn!(plugin = %path.display(), status = ?status.code(), "hook plugin exited non-zero");
            }
            Err(e) => {
                warn!(plugin = %path.display(), error = %e, "failed to wait on hook plugin");
            }
            _ => {}
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    #[test]
    fn encode_is_deterministic_key_order() {
        let event = HookEvent::new(HookName::StartPost, "net.eth0").with_field("pid", "123");
        let encoded = event.encode();
        let text = String::from_utf8_lossy(&encoded);
        let fields: Vec<&str> = text.split('\0').filter(|s| !s.is_empty()).collect();
        assert_eq!(fields[0], "hook=start_post");
        assert_eq!(fields[1], "pid=123");
        assert_eq!(fields[2], "service=net.eth0");
        assert!(fields[3].starts_with("time="));
    }

    #[test]
    fn dispatch_skips_non_executable_files() {
        let dir = tempdir().unwrap();
        let script = dir.path().join("noop.sh");
        fs::write(&script, "#!/bin/sh\nexit 0\n").unwrap();
        let mut perms = fs::metadata(&script).unwrap().permissions();
        perms.set_mode(0o644);
        fs::set_permissions(&script, perms).unwrap();

        let bus = HookBus::new(vec![dir.path().to_path_buf()]);
        // Should not panic or attempt to exec a non-executable file.
        bus.dispatch(&HookEvent::new(HookName::StartPre, "net.eth0"));
    }

    #[test]
    fn dispatch_runs_executable_plugin() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("ran");
        let script = dir.path().join("plugin.sh");
        fs::write(
            &script,
            format!("#!/bin/sh\ncat > {}\n", marker.display()),
        )
        .unwrap();
        let mut perms = fs::metadata(&script).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script, perms).unwrap();

        let bus = HookBus::new(vec![dir.path().to_path_buf()]);
        bus.dispatch(&HookEvent::new(HookName::StartPre, "net.eth0"));

        let contents = fs::read_to_string(&marker).unwrap();
        assert!(contents.contains("service=net.eth0"));
    }
}
