//! Top-level subcommand orchestration.
pub mod install;
pub mod order;
pub mod restore;
pub mod snapshot;
pub mod status;
pub mod version;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

use crate::cli::GlobalOpts;
use crate::config::{InstallConfig, components, validation};
use crate::logging::Logger;
use crate::model::Component;

/// Settings file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "mod-installer.toml";

/// Shared state produced by the common command setup sequence.
///
/// Loads the settings file and layers the command-line overrides on top so
/// that each command does not have to repeat the boilerplate.
#[derive(Debug)]
pub struct CommandSetup {
    /// Settings with every override applied.
    pub config: InstallConfig,
}

impl CommandSetup {
    /// Load settings and apply global and per-command overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file exists but cannot be parsed.
    pub fn init(
        global: &GlobalOpts,
        source: Option<&Path>,
        destination: Option<&Path>,
        log: &Logger,
    ) -> Result<Self> {
        let path = global
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        log.debug(&format!("settings file: {}", path.display()));
        let mut config = InstallConfig::load(&path)?;

        config.dry_run |= global.dry_run;
        config.multithreaded_io &= global.parallel;
        config.case_insensitive_paths |= global.case_insensitive;
        if let Some(source) = source {
            config.source_path = source.to_path_buf();
        }
        if let Some(destination) = destination {
            config.destination_path = destination.to_path_buf();
        }
        // Session ids hash the destination path.
        config.source_path = canonical(&config.source_path);
        config.destination_path = canonical(&config.destination_path);

        log.debug(&format!("source: {}", config.source_path.display()));
        log.debug(&format!(
            "destination: {}",
            config.destination_path.display()
        ));
        log.debug(&format!("io threads: {}", config.io_threads()));
        Ok(Self { config })
    }

    /// The destination directory, which must have been configured.
    ///
    /// # Errors
    ///
    /// Returns an error if neither the settings file nor `--destination`
    /// named one.
    pub fn destination(&self) -> Result<&Path> {
        let dest = self.config.destination_path.as_path();
        if dest.as_os_str().is_empty() {
            anyhow::bail!("no destination: pass --destination or set destination_path");
        }
        Ok(dest)
    }
}

/// Absolute form of `path` without Windows verbatim prefixes; paths that
/// do not exist (or are empty) are returned unchanged.
fn canonical(path: &Path) -> PathBuf {
    if path.as_os_str().is_empty() {
        return PathBuf::new();
    }
    dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Load component definitions and print any validation warnings.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_components(path: &Path, log: &Logger) -> Result<Vec<Component>> {
    log.stage("Loading components");
    let loaded = components::load(path)
        .with_context(|| format!("loading components from {}", path.display()))?;
    let instructions: usize = loaded.iter().map(|c| c.instructions.len()).sum();
    log.info(&format!(
        "loaded {} components, {instructions} instructions",
        loaded.len()
    ));

    let warnings = validation::validate_all(&loaded);
    if !warnings.is_empty() {
        log.warn(&format!(
            "found {} configuration warning(s):",
            warnings.len()
        ));
        for warning in &warnings {
            log.warn(&format!("  {warning}"));
        }
    }
    Ok(loaded)
}
