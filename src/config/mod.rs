//! Install configuration and component definitions.
pub mod components;
pub mod ini;
pub mod validation;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Concurrent file transfers per instruction when multithreaded I/O is on.
pub const PARALLEL_IO_THREADS: usize = 16;

/// Extensions considered interchangeable by `del_duplicate` when an
/// instruction does not list its own, in priority order.
pub const DEFAULT_DEDUP_EXTENSIONS: &[&str] = &[".dds", ".tpc", ".tga"];

/// Immutable settings for one install run.
///
/// Loaded from TOML; every field is optional in the file.
///
/// ```
/// use mod_installer::config::InstallConfig;
///
/// let config: InstallConfig = toml::from_str(
///     "source_path = \"/mods\"\ndestination_path = \"/game\"\nmultithreaded_io = false\n",
/// ).unwrap();
/// assert_eq!(config.io_threads(), 1);
/// assert_eq!(config.process_timeout_secs, 3600);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Mod workspace, substituted for `<<modDirectory>>`.
    pub source_path: PathBuf,
    /// Game directory, substituted for `<<kotorDirectory>>`.
    pub destination_path: PathBuf,
    /// Where bundled tools such as the patcher live.
    pub resource_dir: Option<PathBuf>,
    /// Run multi-source file operations concurrently.
    pub multithreaded_io: bool,
    /// Match wildcard patterns and file names ignoring case.
    pub case_insensitive_paths: bool,
    /// Simulate every side effect.
    pub dry_run: bool,
    /// Wall-clock limit for external processes; `0` disables it.
    pub process_timeout_secs: u64,
    /// Default compatible extensions for `del_duplicate`.
    pub dedup_extensions: Vec<String>,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            source_path: PathBuf::new(),
            destination_path: PathBuf::new(),
            resource_dir: None,
            multithreaded_io: true,
            case_insensitive_paths: false,
            dry_run: false,
            process_timeout_secs: 3600,
            dedup_extensions: DEFAULT_DEDUP_EXTENSIONS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl InstallConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::InvalidSyntax {
            file: path.display().to_string(),
            message: e.message().to_string(),
        })
    }

    /// Worker count for concurrent file operations.
    #[must_use]
    pub const fn io_threads(&self) -> usize {
        if self.multithreaded_io {
            PARALLEL_IO_THREADS
        } else {
            1
        }
    }

    /// Timeout for external processes, if any.
    #[must_use]
    pub const fn process_timeout(&self) -> Option<Duration> {
        if self.process_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.process_timeout_secs))
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = InstallConfig::default();
        assert!(config.multithreaded_io);
        assert!(!config.case_insensitive_paths);
        assert_eq!(config.io_threads(), 16);
        assert_eq!(config.process_timeout(), Some(Duration::from_secs(3600)));
        assert_eq!(config.dedup_extensions, vec![".dds", ".tpc", ".tga"]);
    }

    #[test]
    fn zero_timeout_disables_limit() {
        let config = InstallConfig {
            process_timeout_secs: 0,
            ..InstallConfig::default()
        };
        assert_eq!(config.process_timeout(), None);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = InstallConfig::load(&dir.path().join("none.toml")).unwrap();
        assert_eq!(config, InstallConfig::default());
    }

    #[test]
    fn invalid_toml_is_reported_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "dry_run = maybe").unwrap();
        let err = InstallConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }
}
