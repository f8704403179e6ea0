//! Dependency tree disk cache.
//!
//! Rebuilding the graph means reading and parsing every init script, which
//! is too slow to redo on every invocation. The compiled graph is cached to
//! [`crate::constants::DEPTREE_FILE`] in the same `depinfo_*` key/value
//! grammar [`super::loader`] parses, and only rebuilt when a script, a
//! config file, or an external config dependency is newer than the cache.
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::warn;

use crate::error::DependError;

use super::loader::{parse_stream, render_stream, ServiceDecl};

/// The filesystem locations whose mtimes gate cache freshness: the script
/// directory, the config directory, the global config file, and every path
/// listed in the external-config sidecar.
pub struct CacheInputs<'a> {
    /// Directory of per-service init scripts.
    pub scripts_dir: &'a Path,
    /// Directory of manager configuration files.
    pub config_dir: &'a Path,
    /// The single global configuration file.
    pub global_config_file: &'a Path,
    /// Sidecar file listing extra external config paths, one per line.
    pub external_config_list: &'a Path,
}

/// Recursively finds the newest modification time under `path`, descending
/// into subdirectories. Returns `None` if `path` doesn't exist.
fn newest_mtime(path: &Path) -> Option<SystemTime> {
    let metadata = fs::symlink_metadata(path).ok()?;
    if metadata.is_dir() {
        fs::read_dir(path)
            .ok()?
            .flatten()
            .filter_map(|entry| newest_mtime(&entry.path()))
            .max()
    } else {
        metadata.modified().ok()
    }
}

/// Reads the external-config sidecar and returns the newest mtime among the
/// paths it lists. A missing or empty sidecar contributes nothing.
fn newest_external_config(list_path: &Path) -> Option<SystemTime> {
    let contents = fs::read_to_string(list_path).ok()?;
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| newest_mtime(Path::new(line)))
        .max()
}

/// Newest mtime across every staleness input, or `None` if none exist.
fn newest_of(inputs: &CacheInputs<'_>) -> Option<SystemTime> {
    [
        newest_mtime(inputs.scripts_dir),
        newest_mtime(inputs.config_dir),
        newest_mtime(inputs.global_config_file),
        newest_external_config(inputs.external_config_list),
    ]
    .into_iter()
    .flatten()
    .max()
}

fn epoch_secs(time: SystemTime) -> u64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn sentinel_path(cache_path: &Path) -> PathBuf {
    cache_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(crate::constants::CLOCK_SKEW_SENTINEL)
}

const BUILT_AT_PREFIX: &str = "# built_at=";

/// Splits the leading `# built_at=<secs>` comment line from the rest of the
/// cache body.
fn split_built_at(raw: &str) -> Option<(u64, &str)> {
    let (first_line, rest) = raw.split_once('\n').unwrap_or((raw, ""));
    let secs = first_line.strip_prefix(BUILT_AT_PREFIX)?.trim().parse().ok()?;
    Some((secs, rest))
}

/// Loads the cached declarations at `cache_path` if they are still fresh
/// relative to every input in `inputs`, returning `None` when the cache
/// must be rebuilt (missing, unreadable, or stale).
pub fn load_if_fresh(cache_path: &Path, inputs: &CacheInputs<'_>) -> Option<Vec<ServiceDecl>> {
    let raw = fs::read_to_string(cache_path).ok()?;
    let (built_at, body) = split_built_at(&raw)?;

    if let Some(newest) = newest_of(inputs) {
        if epoch_secs(newest) > built_at {
            return None;
        }
    }

    if sentinel_path(cache_path).exists() {
        warn!(
            cache = %cache_path.display(),
            "dependency cache was rebuilt while the system clock had skewed backward; \
             ordering may be briefly inconsistent until the next rebuild"
        );
    }

    parse_stream(body).ok()
}

/// Publishes `decls` to `cache_path` atomically: writes to a sibling temp
/// file and renames over the target, so a concurrent reader never observes
/// a partially-written cache.
///
/// `built_at` is recorded as the newest mtime across every staleness input
/// rather than the write-time clock, so the cache is never immediately
/// stale by construction. If the write-time clock is nonetheless behind
/// that newest input (the system clock jumped backward since the newest
/// input was touched), the skew is recorded in
/// [`crate::constants::CLOCK_SKEW_SENTINEL`] and `built_at` is bumped
/// forward to the newest input's time so freshness checks don't
/// immediately reject the tree they were just asked to cache.
pub fn publish(cache_path: &Path, inputs: &CacheInputs<'_>, decls: &[ServiceDecl]) -> Result<(), DependError> {
    let now = SystemTime::now();
    let newest_input = newest_of(inputs);

    let (built_at, skewed) = match newest_input {
        Some(newest) if newest > now => (newest, true),
        Some(newest) => (now.max(newest), false),
        None => (now, false),
    };

    let sentinel = sentinel_path(cache_path);
    if skewed {
        fs::write(&sentinel, format!("{}\n", epoch_secs(now))).map_err(DependError::ScanFailed)?;
    } else if sentinel.exists() {
        let _ = fs::remove_file(&sentinel);
    }

    let body = render_stream(decls);
    let serialized = format!("{BUILT_AT_PREFIX}{}\n{body}", epoch_secs(built_at));

    let tmp_path = cache_path.with_extension("tmp");
    {
        let mut tmp = File::create(&tmp_path).map_err(DependError::ScanFailed)?;
        tmp.write_all(serialized.as_bytes()).map_err(DependError::ScanFailed)?;
        tmp.sync_all().map_err(DependError::ScanFailed)?;
    }
    fs::rename(&tmp_path, cache_path).map_err(DependError::ScanFailed)?;

    Ok(())
}
