//! Exclusive per-service locking.
//!
//! `flock(2)` via [`fs2`] is the primary mechanism: a lock file per service
//! under `exclusive/`, held for the lifetime of an in-progress action. Some
//! filesystems (old NFS exports, in particular) don't support `flock`, so a
//! second mechanism backs it up: a named FIFO created exclusively
//! (`O_CREAT|O_EXCL` semantics via `mkfifo`), with a companion mtime
//! symlink refreshed periodically by the holder so a crashed holder's lock
//! can be detected as stale and reclaimed.
use std::fs::{self, File};
use std::io;
use std::os::unix::fs as unix_fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use fs2::FileExt;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;

use crate::constants::EXCLUSIVE_DIR;
use crate::error::StoreError;

use super::layout::StateHandle;

/// How long an unrefreshed fallback lock is considered abandoned and safe
/// to steal.
const STALE_LOCK_AGE: Duration = Duration::from_secs(300);

/// A held exclusive lock; releases automatically on drop.
pub enum ExclusiveGuard {
    /// Held via `flock` on an open file descriptor.
    Flock(File),
    /// Held via the FIFO + mtime-symlink fallback.
    Fallback {
        fifo_path: PathBuf,
        mtime_link: PathBuf,
    },
}

impl Drop for ExclusiveGuard {
    fn drop(&mut self) {
        match self {
            ExclusiveGuard::Flock(file) => {
                let _ = FileExt::unlock(file);
            }
            ExclusiveGuard::Fallback { fifo_path, mtime_link } => {
                let _ = fs::remove_file(mtime_link);
                let _ = fs::remove_file(fifo_path);
            }
        }
    }
}

/// Attempts to acquire the exclusive lock for `service`, returning
/// immediately with [`StoreError::AlreadyExclusive`] if another writer
/// already holds it.
pub fn try_acquire(handle: &StateHandle, service: &str) -> Result<ExclusiveGuard, StoreError> {
    let lock_path = handle.entry(EXCLUSIVE_DIR, service);

    match try_flock(&lock_path) {
        Ok(guard) => return Ok(guard),
        Err(StoreError::Io { source, .. }) if is_lock_unsupported(&source) => {}
        Err(e) => return Err(e),
    }

    try_fallback(handle, service)
}

fn is_lock_unsupported(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::ENOLCK) | Some(libc::ENOSYS) | Some(libc::EOPNOTSUPP)
    )
}

fn try_flock(lock_path: &Path) -> Result<ExclusiveGuard, StoreError> {
    let file = File::create(lock_path).map_err(|source| StoreError::Io {
        path: lock_path.display().to_string(),
        source,
    })?;

    match file.try_lock_exclusive() {
        Ok(()) => Ok(ExclusiveGuard::Flock(file)),
        Err(source) if source.kind() == fs2::lock_contended_error().kind() => {
            Err(StoreError::AlreadyExclusive(lock_path.display().to_string()))
        }
        Err(source) => Err(StoreError::Io {
            path: lock_path.display().to_string(),
            source,
        }),
    }
}

fn try_fallback(handle: &StateHandle, service: &str) -> Result<ExclusiveGuard, StoreError> {
    let fifo_path = handle.entry(EXCLUSIVE_DIR, &format!("{service}.fifo"));
    let mtime_link = handle.entry(EXCLUSIVE_DIR, &format!("{service}.holder"));

    match mkfifo(&fifo_path, Mode::from_bits_truncate(0o600)) {
        Ok(()) => {}
        Err(nix::errno::Errno::EEXIST) => {
            if is_stale(&mtime_link) {
                let _ = fs::remove_file(&mtime_link);
                let _ = fs::remove_file(&fifo_path);
                mkfifo(&fifo_path, Mode::from_bits_truncate(0o600)).map_err(|e| {
                    StoreError::Io {
                        path: fifo_path.display().to_string(),
                        source: io::Error::from_raw_os_error(e as i32),
                    }
                })?;
            } else {
                return Err(StoreError::AlreadyExclusive(service.to_string()));
            }
        }
        Err(e) => {
            return Err(StoreError::Io {
                path: fifo_path.display().to_string(),
                source: io::Error::from_raw_os_error(e as i32),
            });
        }
    }

    refresh_holder(&mtime_link)?;

    Ok(ExclusiveGuard::Fallback {
        fifo_path,
        mtime_link,
    })
}

fn is_stale(mtime_link: &Path) -> bool {
    let Ok(meta) = fs::symlink_metadata(mtime_link) else {
        return true;
    };
    let Ok(modified) = meta.modified() else {
        return true;
    };
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age > STALE_LOCK_AGE)
        .unwrap_or(false)
}

fn refresh_holder(mtime_link: &Path) -> Result<(), StoreError> {
    let _ = fs::remove_file(mtime_link);
    unix_fs::symlink(std::process::id().to_string(), mtime_link).map_err(|source| {
        StoreError::Io {
            path: mtime_link.display().to_string(),
            source,
        }
    })
}
