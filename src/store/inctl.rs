//! The "in control" test: whether the calling `rc` invocation
//! is the one actively driving the current runlevel transition, or whether
//! another instance already holds it.
//!
//! A sentinel file's mtime is refreshed periodically by whichever `rc`
//! holds control. A sentinel older than [`STALE_CONTROL_AGE`] is treated as
//! abandoned (the previous holder crashed or was killed) and can be taken
//! over by a fresh invocation.
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use crate::error::RunlevelError;

use super::layout::StateHandle;

/// How long a sentinel may go unrefreshed before it's considered abandoned.
const STALE_CONTROL_AGE: Duration = Duration::from_secs(30);

fn sentinel_path(handle: &StateHandle, sentinel: &str) -> PathBuf {
    handle.root().join(sentinel)
}

/// Attempts to take control under `sentinel`. Succeeds if no sentinel is
/// present, or if the existing one is stale; fails if another invocation
/// currently and recently holds it.
pub fn take_control(handle: &StateHandle, sentinel: &str) -> Result<(), RunlevelError> {
    let path = sentinel_path(handle, sentinel);

    if let Ok(meta) = fs::metadata(&path) {
        let age = meta
            .modified()
            .ok()
            .and_then(|m| SystemTime::now().duration_since(m).ok())
            .unwrap_or(Duration::MAX);
        if age <= STALE_CONTROL_AGE {
            return Err(RunlevelError::NotFound(format!(
                "another rc invocation is already in control via {sentinel}"
            )));
        }
    }

    touch(&path)
}

/// Refreshes the sentinel's mtime so other invocations see this one as
/// still alive. Called periodically while the transition is in progress.
pub fn refresh_control(handle: &StateHandle, sentinel: &str) -> Result<(), RunlevelError> {
    touch(&sentinel_path(handle, sentinel))
}

/// Releases control, removing the sentinel entirely.
pub fn release_control(handle: &StateHandle, sentinel: &str) -> Result<(), RunlevelError> {
    let path = sentinel_path(handle, sentinel);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn touch(path: &PathBuf) -> Result<(), RunlevelError> {
    fs::write(path, std::process::id().to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::RC_STARTING_SENTINEL;
    use tempfile::tempdir;

    #[test]
    fn take_control_then_release() {
        let temp = tempdir().unwrap();
        let handle = StateHandle::open(temp.path().to_path_buf()).unwrap();

        take_control(&handle, RC_STARTING_SENTINEL).unwrap();
        assert!(take_control(&handle, RC_STARTING_SENTINEL).is_err());

        release_control(&handle, RC_STARTING_SENTINEL).unwrap();
        assert!(take_control(&handle, RC_STARTING_SENTINEL).is_ok());
    }
}
