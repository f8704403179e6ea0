//! Filesystem layout for the state store.
//!
//! The store is a directory tree rooted at [`crate::runtime::state_dir`],
//! with one subdirectory per primary state and flag in
//! [`crate::constants::PRIMARY_STATES`] / [`crate::constants::FLAG_STATES`],
//! plus `exclusive/`, `scheduled/`, `daemons/`, and `options/` working
//! directories.
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{
    DAEMONS_DIR, EXCLUSIVE_DIR, FLAG_STATES, OPTIONS_DIR, PRIMARY_STATES, SCHEDULED_DIR,
};
use crate::error::StoreError;

/// A handle to the state store rooted at a directory, opened once and
/// reused for all queries and mutations against it.
#[derive(Debug, Clone)]
pub struct StateHandle {
    root: PathBuf,
}

impl StateHandle {
    /// Opens the store at `root`, creating every required subdirectory if
    /// absent.
    pub fn open(root: PathBuf) -> Result<Self, StoreError> {
        let handle = Self { root };
        handle.ensure_layout()?;
        Ok(handle)
    }

    fn ensure_layout(&self) -> Result<(), StoreError> {
        for state in PRIMARY_STATES {
            self.create_dir(state)?;
        }
        for flag in FLAG_STATES {
            self.create_dir(flag)?;
        }
        self.create_dir(EXCLUSIVE_DIR)?;
        self.create_dir(SCHEDULED_DIR)?;
        self.create_dir(DAEMONS_DIR)?;
        self.create_dir(OPTIONS_DIR)?;
        Ok(())
    }

    fn create_dir(&self, name: &str) -> Result<(), StoreError> {
        let path = self.root.join(name);
        fs::create_dir_all(&path).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to one of the fixed subdirectories (a primary state, flag, or
    /// working directory name).
    pub fn dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Path to a service's entry within one of the fixed subdirectories.
    pub fn entry(&self, dir_name: &str, service: &str) -> PathBuf {
        self.dir(dir_name).join(service)
    }
}
