//! Scratch key/value storage per service, used for small
//! bits of state that don't warrant their own subdirectory: the supervisor
//! persists its re-exec arguments here across `SIGHUP`, for instance.
use std::fs;
use std::path::PathBuf;

use crate::constants::OPTIONS_DIR;
use crate::error::StoreError;

use super::layout::StateHandle;

fn entry_path(handle: &StateHandle, service: &str, key: &str) -> PathBuf {
    handle.dir(OPTIONS_DIR).join(service).join(key)
}

/// Sets `key` to `value` for `service`, creating the service's options
/// directory if needed.
pub fn set(handle: &StateHandle, service: &str, key: &str, value: &str) -> Result<(), StoreError> {
    let path = entry_path(handle, service, key);
    let dir = path.parent().expect("entry path always has a parent");
    fs::create_dir_all(dir).map_err(|source| StoreError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    fs::write(&path, value).map_err(|source| StoreError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Returns `key`'s value for `service`, or `None` if unset.
pub fn get(handle: &StateHandle, service: &str, key: &str) -> Result<Option<String>, StoreError> {
    let path = entry_path(handle, service, key);
    match fs::read_to_string(&path) {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StoreError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// Removes `key` for `service`, a no-op if it was unset.
pub fn unset(handle: &StateHandle, service: &str, key: &str) -> Result<(), StoreError> {
    let path = entry_path(handle, service, key);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StoreError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn set_get_unset_round_trip() {
        let temp = tempdir().unwrap();
        let handle = StateHandle::open(temp.path().to_path_buf()).unwrap();

        assert_eq!(get(&handle, "sshd", "reexec_args").unwrap(), None);

        set(&handle, "sshd", "reexec_args", "--foreground").unwrap();
        assert_eq!(
            get(&handle, "sshd", "reexec_args").unwrap(),
            Some("--foreground".to_string())
        );

        unset(&handle, "sshd", "reexec_args").unwrap();
        assert_eq!(get(&handle, "sshd", "reexec_args").unwrap(), None);
    }
}
