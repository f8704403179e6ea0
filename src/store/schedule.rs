//! Scheduled (deferred) starts.
//!
//! When a `need` dependency is `inactive` rather than `stopped` or
//! `started`, the dependent's start is deferred: a marker is left in
//! `scheduled/<service>/<waited-on>` recording what it's waiting for, and
//! the dependent is retried once the waited-on service settles.
use std::fs;
use std::path::PathBuf;

use crate::constants::SCHEDULED_DIR;
use crate::error::StoreError;

use super::layout::StateHandle;

/// Records that `service`'s start is deferred pending `waited_on` leaving
/// `inactive`.
pub fn schedule_start_on(
    handle: &StateHandle,
    service: &str,
    waited_on: &str,
) -> Result<(), StoreError> {
    let dir = handle.dir(SCHEDULED_DIR).join(service);
    fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    let marker = dir.join(waited_on);
    fs::write(&marker, "").map_err(|source| StoreError::Io {
        path: marker.display().to_string(),
        source,
    })
}

/// Clears every scheduled-start marker for `service`, called once it either
/// starts successfully or gives up.
pub fn clear_schedule(handle: &StateHandle, service: &str) -> Result<(), StoreError> {
    let dir = handle.dir(SCHEDULED_DIR).join(service);
    match fs::remove_dir_all(&dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StoreError::Io {
            path: dir.display().to_string(),
            source,
        }),
    }
}

/// Lists what `service` is currently waiting on, if anything.
pub fn waiting_on(handle: &StateHandle, service: &str) -> Result<Vec<String>, StoreError> {
    let dir = handle.dir(SCHEDULED_DIR).join(service);
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(StoreError::Io {
                path: dir.display().to_string(),
                source,
            });
        }
    };

    let mut waiting = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| StoreError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        if let Some(name) = entry.file_name().to_str() {
            waiting.push(name.to_string());
        }
    }
    Ok(waiting)
}

/// Every service with at least one scheduled-start marker pending.
pub fn all_scheduled(handle: &StateHandle) -> Result<Vec<String>, StoreError> {
    let root: PathBuf = handle.dir(SCHEDULED_DIR);
    let entries = match fs::read_dir(&root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(StoreError::Io {
                path: root.display().to_string(),
                source,
            });
        }
    };

    let mut services = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| StoreError::Io {
            path: root.display().to_string(),
            source,
        })?;
        if entry.path().is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                services.push(name.to_string());
            }
        }
    }
    Ok(services)
}
