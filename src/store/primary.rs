//! Primary service state: a service's state symlink lives in exactly one of
//! [`crate::constants::PRIMARY_STATES`] at a time. Moving between states
//! means removing the old symlink and
//! creating the new one; there is no window where two are simultaneously
//! present because the create-then-remove ordering always creates first.
use std::fs;
use std::os::unix::fs as unix_fs;
use std::path::Path;

use crate::constants::PRIMARY_STATES;
use crate::error::StoreError;

use super::layout::StateHandle;

/// Parses a primary state name into a typed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::AsRefStr, strum_macros::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum PrimaryState {
    /// Transitioning from stopped toward started.
    Starting,
    /// Running and considered healthy.
    Started,
    /// Transitioning from started toward stopped.
    Stopping,
    /// Not running but not considered a failure (e.g. hotplug-only service
    /// with no device present).
    Inactive,
    /// Not running.
    Stopped,
    /// The last start or stop attempt ended in an unrecoverable error.
    Failed,
}

/// Marks `service` as being in `state`, pointing its state symlink at
/// `script_path`. Removes the service's symlink from every other primary
/// state directory first is unsafe (would leave a gap), so the new link is
/// created before the old ones are removed.
pub fn mark(
    handle: &StateHandle,
    service: &str,
    state: PrimaryState,
    script_path: &Path,
) -> Result<(), StoreError> {
    let target_dir = state.as_ref();
    let target_link = handle.entry(target_dir, service);

    if target_link.is_symlink() || target_link.exists() {
        fs::remove_file(&target_link).map_err(|source| StoreError::Io {
            path: target_link.display().to_string(),
            source,
        })?;
    }
    unix_fs::symlink(script_path, &target_link).map_err(|source| StoreError::Io {
        path: target_link.display().to_string(),
        source,
    })?;

    for other in PRIMARY_STATES {
        if *other == target_dir {
            continue;
        }
        let link = handle.entry(other, service);
        if link.is_symlink() || link.exists() {
            fs::remove_file(&link).map_err(|source| StoreError::Io {
                path: link.display().to_string(),
                source,
            })?;
        }
    }

    Ok(())
}

/// Returns the current primary state of `service`, or `None` if it has
/// never been marked (equivalent to a freshly-discovered service, treated
/// as `stopped` by callers).
pub fn query(handle: &StateHandle, service: &str) -> Option<PrimaryState> {
    for state_name in PRIMARY_STATES {
        let link = handle.entry(state_name, service);
        if link.is_symlink() || link.exists() {
            return PrimaryState::try_from(*state_name).ok();
        }
    }
    None
}

impl TryFrom<&str> for PrimaryState {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        use std::str::FromStr;
        PrimaryState::from_str(value).map_err(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn mark_then_query_round_trips() {
        let temp = tempdir().unwrap();
        let handle = StateHandle::open(temp.path().to_path_buf()).unwrap();
        let script = temp.path().join("net.eth0");
        fs::write(&script, "").unwrap();

        mark(&handle, "net.eth0", PrimaryState::Starting, &script).unwrap();
        assert_eq!(query(&handle, "net.eth0"), Some(PrimaryState::Starting));

        mark(&handle, "net.eth0", PrimaryState::Started, &script).unwrap();
        assert_eq!(query(&handle, "net.eth0"), Some(PrimaryState::Started));
    }

    #[test]
    fn never_marked_service_has_no_state() {
        let temp = tempdir().unwrap();
        let handle = StateHandle::open(temp.path().to_path_buf()).unwrap();
        assert_eq!(query(&handle, "nope"), None);
    }

    #[test]
    fn at_most_one_state_directory_holds_the_service() {
        let temp = tempdir().unwrap();
        let handle = StateHandle::open(temp.path().to_path_buf()).unwrap();
        let script = temp.path().join("net.eth0");
        fs::write(&script, "").unwrap();

        mark(&handle, "net.eth0", PrimaryState::Starting, &script).unwrap();
        mark(&handle, "net.eth0", PrimaryState::Started, &script).unwrap();

        let present_in: Vec<&str> = PRIMARY_STATES
            .iter()
            .filter(|s| handle.entry(s, "net.eth0").exists())
            .copied()
            .collect();
        assert_eq!(present_in, vec!["started"]);
    }
}
