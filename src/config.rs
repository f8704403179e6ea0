//! Global configuration loading for rcman.
//!
//! Per-service dependency declarations are not YAML; they live in each
//! service's deptree stanza and are handled by [`crate::depend::loader`].
//! This module only covers the small amount of machine-wide configuration
//! an init system needs: where the state store lives, how many services may
//! be started concurrently, and where to find runlevel/init-script trees.
use serde::Deserialize;
use std::{fs, path::PathBuf};

use crate::error::RcError;

/// Default parallel-start fan-out when `RC_PARALLEL` is unset and no
/// configuration override is present.
const DEFAULT_PARALLEL: usize = 1;

/// Global configuration, typically loaded from `<config_dir>/rcman.yaml`.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RcConfig {
    /// Overrides the state-store root normally derived from
    /// [`crate::runtime::state_dir`].
    pub state_root: Option<PathBuf>,

    /// Maximum number of services the runlevel driver may start or stop
    /// concurrently. `None` defers to `RC_PARALLEL` or [`DEFAULT_PARALLEL`].
    pub parallel: Option<usize>,

    /// Additional directories to search for service init scripts, beyond
    /// the default config directories.
    #[serde(default)]
    pub extra_script_dirs: Vec<PathBuf>,

    /// Additional directories to search for hook plugins, beyond
    /// `<config_dir>/hooks`.
    #[serde(default)]
    pub extra_hook_dirs: Vec<PathBuf>,
}

impl RcConfig {
    /// Loads configuration from `path`, returning the default configuration
    /// if the file does not exist.
    pub fn load(path: &PathBuf) -> Result<Self, RcError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .map_err(|e| RcError::Config(format!("reading {}: {e}", path.display())))?;

        serde_yaml::from_str(&raw)
            .map_err(|e| RcError::Config(format!("parsing {}: {e}", path.display())))
    }

    /// Resolves the effective parallel-start fan-out, honoring
    /// `RC_PARALLEL` when no explicit configuration value is set.
    pub fn effective_parallel(&self) -> usize {
        if let Some(configured) = self.parallel {
            return configured.max(1);
        }

        std::env::var(crate::constants::ENV_RC_PARALLEL)
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_PARALLEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::env_lock;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn missing_file_yields_default() {
        let cfg = RcConfig::load(&PathBuf::from("/nonexistent/rcman.yaml")).unwrap();
        assert_eq!(cfg.effective_parallel(), DEFAULT_PARALLEL);
    }

    #[test]
    fn parallel_override_wins_over_env() {
        let _guard = env_lock();
        std::env::set_var(crate::constants::ENV_RC_PARALLEL, "4");
        let cfg = RcConfig {
            parallel: Some(8),
            ..Default::default()
        };
        assert_eq!(cfg.effective_parallel(), 8);
        std::env::remove_var(crate::constants::ENV_RC_PARALLEL);
    }

    #[test]
    fn env_fallback_when_unconfigured() {
        let _guard = env_lock();
        std::env::set_var(crate::constants::ENV_RC_PARALLEL, "3");
        let cfg = RcConfig::default();
        assert_eq!(cfg.effective_parallel(), 3);
        std::env::remove_var(crate::constants::ENV_RC_PARALLEL);
    }

    #[test]
    fn loads_yaml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "parallel: 5\nextra_script_dirs:\n  - /opt/rcman/init.d").unwrap();
        let cfg = RcConfig::load(&file.path().to_path_buf()).unwrap();
        assert_eq!(cfg.parallel, Some(5));
        assert_eq!(cfg.extra_script_dirs, vec![PathBuf::from("/opt/rcman/init.d")]);
    }
}
