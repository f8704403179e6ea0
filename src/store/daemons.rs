//! Daemon tuple recording.
//!
//! When the supervisor spawns a daemon for a service, it records a tuple
//! (exec path, argv0, uid, pid) under `daemons/<service>/<ordinal>` so a
//! later `rc-service <name> status` can rediscover the process without
//! trusting a single pidfile that might be stale. `<ordinal>` lets a
//! service record more than one tracked daemon (start-stop-daemon
//! `--pidfile` style multi-instance services).
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::DAEMONS_DIR;
use crate::error::StoreError;
use crate::procscan::{self, ProcMatch};

use super::layout::StateHandle;

/// One recorded daemon instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DaemonRecord {
    /// Executable path, as recorded at spawn time.
    pub exec: String,
    /// Expected `argv[0]`.
    pub argv0: Option<String>,
    /// Effective uid the daemon was started as.
    pub uid: Option<u32>,
    /// Pid recorded at spawn time.
    pub pid: i32,
}

impl From<&DaemonRecord> for ProcMatch {
    fn from(record: &DaemonRecord) -> Self {
        ProcMatch {
            exec: Some(record.exec.clone()),
            argv0: record.argv0.clone(),
            uid: record.uid,
            pid: Some(record.pid),
        }
    }
}

fn service_dir(handle: &StateHandle, service: &str) -> PathBuf {
    handle.dir(DAEMONS_DIR).join(service)
}

/// Records a new daemon tuple for `service` at the next free ordinal.
pub fn record(
    handle: &StateHandle,
    service: &str,
    record: &DaemonRecord,
) -> Result<(), StoreError> {
    let dir = service_dir(handle, service);
    fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    let ordinal = next_ordinal(&dir)?;
    let path = dir.join(ordinal.to_string());
    let serialized = serde_json::to_vec(record)
        .map_err(|e| StoreError::Io {
            path: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;

    fs::write(&path, serialized).map_err(|source| StoreError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn next_ordinal(dir: &std::path::Path) -> Result<u32, StoreError> {
    let entries = fs::read_dir(dir).map_err(|source| StoreError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    let max = entries
        .flatten()
        .filter_map(|e| e.file_name().to_str()?.parse::<u32>().ok())
        .max();
    Ok(max.map(|m| m + 1).unwrap_or(0))
}

/// Returns every daemon tuple recorded for `service`.
pub fn all(handle: &StateHandle, service: &str) -> Result<Vec<DaemonRecord>, StoreError> {
    let dir = service_dir(handle, service);
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

    let mut records = Vec::new();
    for entry in entries.flatten() {
        let raw = fs::read(entry.path()).map_err(|source| StoreError::Io {
            path: entry.path().display().to_string(),
            source,
        })?;
        if let Ok(record) = serde_json::from_slice::<DaemonRecord>(&raw) {
            records.push(record);
        }
    }
    Ok(records)
}

/// Clears every recorded daemon tuple for `service`, called when it stops
/// cleanly.
pub fn clear(handle: &StateHandle, service: &str) -> Result<(), StoreError> {
    let dir = service_dir(handle, service);
    match fs::remove_dir_all(&dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StoreError::Io {
            path: dir.display().to_string(),
            source,
        }),
    }
}

/// Whether any of `service`'s recorded daemons is no longer present in the
/// process table, i.e. it crashed rather than being stopped cleanly.
pub fn daemon_crashed(handle: &StateHandle, service: &str) -> Result<bool, StoreError> {
    let records = all(handle, service)?;
    if records.is_empty() {
        return Ok(false);
    }

    for record in &records {
        let criteria = ProcMatch::from(record);
        match procscan::find_pids(&criteria) {
            Ok(pids) if pids.is_empty() => return Ok(true),
            Ok(_) => continue,
            // An inconclusive scan must not be read as "crashed".
            Err(_) => continue,
        }
    }
    Ok(false)
}
