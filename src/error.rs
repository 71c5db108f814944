//! Domain-specific error types for the installer engine.
//!
//! Subsystems return typed errors (e.g. [`CheckpointError`],
//! [`SnapshotError`]) while the CLI boundary converts them to
//! [`anyhow::Error`] via the standard `?` operator.
//!
//! # Error hierarchy
//!
//! ```text
//! InstallerError
//! ├── Config(ConfigError)         : component/config loading
//! ├── Checkpoint(CheckpointError) : session persistence (session-fatal)
//! ├── Snapshot(SnapshotError)     : backup capture and restore (session-fatal)
//! └── Archive(ArchiveError)       : archive extraction fallback chain
//! ```
//!
//! Instruction-level failures are not errors at all: they are mapped to an
//! [`ExitCode`](crate::instructions::ExitCode) at the instruction boundary.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the installer engine.
#[derive(Error, Debug)]
pub enum InstallerError {
    /// Configuration-related error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Session checkpoint error.
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Snapshot capture or restore error.
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// Archive extraction error.
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// The install destination does not exist or is not a directory.
    #[error("Destination directory does not exist: {}", .0.display())]
    MissingDestination(PathBuf),

    /// The run was cancelled before it could finish.
    #[error("Install cancelled")]
    Cancelled,
}

/// Errors that arise from loading configuration and component definitions.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A file could not be read.
    #[error("IO error reading {path}: {source}")]
    Io {
        /// Path to the file that could not be read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A TOML document failed to parse.
    #[error("Invalid TOML in {file}: {message}")]
    InvalidSyntax {
        /// File being parsed.
        file: String,
        /// Parser message.
        message: String,
    },

    /// Two components share the same id.
    #[error("Duplicate component id '{0}'")]
    DuplicateComponent(String),
}

/// Errors raised by the checkpoint (session) manager.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// An operation was requested before `initialize` was called.
    #[error("Checkpoint manager used before initialization")]
    NotInitialized,

    /// A component id was never registered with the session.
    ///
    /// Every component is registered at initialization, so this indicates a
    /// programming error in the caller.
    #[error("Component '{0}' is not registered in the session")]
    UnregisteredComponent(String),

    /// An instruction index is outside the component's checkpoint list.
    #[error("Instruction {index} is not registered for component '{component}'")]
    UnregisteredInstruction {
        /// Owning component id.
        component: String,
        /// Instruction index within the component.
        index: usize,
    },

    /// The session file exists but failed structural validation.
    #[error("Session file {} is invalid: {reason}", path.display())]
    InvalidSession {
        /// Session file path.
        path: PathBuf,
        /// Human-readable validation failure.
        reason: String,
    },

    /// Reading or writing the session file failed.
    #[error("Session I/O failed for {}: {source}", path.display())]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Serializing the session record failed.
    #[error("Session serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors raised by the snapshot (backup) manager.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// No snapshot exists to restore from.
    #[error("No snapshot found at {}", .0.display())]
    Missing(PathBuf),

    /// The snapshot operation was cancelled between file units.
    #[error("Snapshot operation cancelled")]
    Cancelled,

    /// Filesystem failure while copying, archiving, or restoring.
    #[error("Snapshot I/O failed for {}: {source}", path.display())]
    Io {
        /// Path being processed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Reading or writing the zip archive failed.
    #[error("Snapshot archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Errors raised by the archive extractor once every strategy has failed.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// The archive path does not exist.
    #[error("Archive not found: {}", .0.display())]
    NotFound(PathBuf),

    /// No extraction strategy could open the archive.
    #[error("Unable to extract {}: {}", path.display(), attempts.join("; "))]
    Unsupported {
        /// Archive path.
        path: PathBuf,
        /// One message per strategy that was tried.
        attempts: Vec<String>,
    },
}
