//! Runlevel membership model.
//!
//! A runlevel is a directory of symlinks, one per member service, pointing
//! at that service's init script. Runlevels may stack (`boot` pulled in by
//! `default`, for instance) via a `<runlevel>.d`-style dependency file; this
//! module only tracks direct membership and stacked resolution, not
//! execution order, which belongs to [`crate::depend::order`].
use std::collections::BTreeSet;
use std::fs;
use std::os::unix::fs as unix_fs;
use std::path::{Path, PathBuf};

use crate::constants::RESERVED_RUNLEVELS;
use crate::error::RunlevelError;

/// A single runlevel rooted at a directory under the runlevel store.
#[derive(Debug, Clone)]
pub struct Runlevel {
    name: String,
    dir: PathBuf,
}

impl Runlevel {
    /// Opens (without requiring it to already exist) the runlevel named
    /// `name` under `runlevel_root`.
    pub fn new(runlevel_root: &Path, name: &str) -> Self {
        Self {
            name: name.to_string(),
            dir: runlevel_root.join(name),
        }
    }

    /// The runlevel's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creates the runlevel's directory if it does not already exist.
    pub fn create(&self) -> Result<(), RunlevelError> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Direct (non-stacked) service membership, derived from the set of
    /// symlinks present in the runlevel directory.
    pub fn members(&self) -> Result<BTreeSet<String>, RunlevelError> {
        let mut members = BTreeSet::new();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(members),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            if entry.path().is_symlink() || entry.path().is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    members.insert(name.to_string());
                }
            }
        }
        Ok(members)
    }

    /// Adds `service` to this runlevel by symlinking at `script_path`.
    /// A pre-existing membership symlink is left untouched.
    pub fn add(&self, service: &str, script_path: &Path) -> Result<(), RunlevelError> {
        self.create()?;
        let link = self.dir.join(service);
        if link.is_symlink() || link.exists() {
            return Ok(());
        }
        unix_fs::symlink(script_path, &link)?;
        Ok(())
    }

    /// Removes `service` from this runlevel. A no-op if it was not a
    /// member.
    pub fn remove(&self, service: &str) -> Result<(), RunlevelError> {
        let link = self.dir.join(service);
        match fs::remove_file(&link) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether `service` is a direct member.
    pub fn contains(&self, service: &str) -> Result<bool, RunlevelError> {
        Ok(self.members()?.contains(service))
    }
}

/// Validates that `name` is not one of the system-reserved runlevel names,
/// for call sites (like `rc-update add`) where an administrator supplies an
/// arbitrary runlevel name.
pub fn reject_reserved(name: &str) -> Result<(), RunlevelError> {
    if RESERVED_RUNLEVELS.contains(&name) {
        return Err(RunlevelError::Reserved(name.to_string()));
    }
    Ok(())
}

/// Resolves the full, stacked set of member services for `runlevel`,
/// following `stack_of` to pull in other runlevels' memberships. Detects
/// and breaks cycles rather than looping forever.
pub fn stacked_members(
    runlevel_root: &Path,
    runlevel: &str,
    stack_of: impl Fn(&str) -> Vec<String>,
) -> Result<BTreeSet<String>, RunlevelError> {
    let mut visited = BTreeSet::new();
    let mut result = BTreeSet::new();
    let mut queue = vec![runlevel.to_string()];

    while let Some(level) = queue.pop() {
        if !visited.insert(level.clone()) {
            continue;
        }

        let rl = Runlevel::new(runlevel_root, &level);
        result.extend(rl.members()?);

        for stacked in stack_of(&level) {
            if !visited.contains(&stacked) {
                queue.push(stacked);
            }
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reserved_names_are_rejected() {
        assert!(reject_reserved("boot").is_err());
        assert!(reject_reserved("my-custom-level").is_ok());
    }

    #[test]
    fn add_and_remove_membership() {
        let root = tempdir().unwrap();
        let script = root.path().join("net.eth0");
        fs::write(&script, "").unwrap();

        let rl = Runlevel::new(root.path(), "default");
        rl.add("net.eth0", &script).unwrap();
        assert!(rl.contains("net.eth0").unwrap());

        rl.remove("net.eth0").unwrap();
        assert!(!rl.contains("net.eth0").unwrap());
    }

    #[test]
    fn stacked_members_follows_stack_of_without_looping_on_cycles() {
        let root = tempdir().unwrap();
        for level in ["boot", "default"] {
            let rl = Runlevel::new(root.path(), level);
            rl.create().unwrap();
        }
        let boot_script = root.path().join("boot_svc");
        fs::write(&boot_script, "").unwrap();
        Runlevel::new(root.path(), "boot")
            .add("boot_svc", &boot_script)
            .unwrap();

        let members = stacked_members(root.path(), "default", |level| match level {
            "default" => vec!["boot".to_string(), "default".to_string()],
            "boot" => vec!["default".to_string()],
            _ => vec![],
        })
        .unwrap();

        assert!(members.contains("boot_svc"));
    }
}
