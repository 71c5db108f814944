//! Filesystem and process capability abstraction.
//!
//! Instruction execution never touches [`std::fs`] directly; it goes through
//! a [`FileSystemProvider`] so the same state machine drives both a real
//! install ([`RealFileSystem`]) and a dry run ([`SimulatedFileSystem`]).

pub mod archive;
pub mod helpers;
mod real;
mod simulated;

pub use archive::ArchiveExtractor;
pub use real::RealFileSystem;
pub use simulated::SimulatedFileSystem;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;

use crate::exec::ExecResult;

/// Capability interface for every filesystem and process side effect an
/// instruction can have.
///
/// File operations take full file paths for both source and destination.
/// When `overwrite` is `false` and the destination exists the operation
/// fails; callers decide beforehand whether a collision is a skip or an
/// error.
pub trait FileSystemProvider: Send + Sync + std::fmt::Debug {
    /// Whether side effects are simulated. Consulted to skip verification
    /// steps that presuppose a real external process ran.
    fn is_dry_run(&self) -> bool;

    /// Returns `true` if `path` is an existing regular file.
    fn file_exists(&self, path: &Path) -> bool;

    /// Returns `true` if `path` is an existing directory.
    fn dir_exists(&self, path: &Path) -> bool;

    /// List files inside `dir`, optionally descending into subdirectories.
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` cannot be read.
    fn files_in_dir(&self, dir: &Path, recursive: bool) -> Result<Vec<PathBuf>>;

    /// List the immediate subdirectories of `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` cannot be read.
    fn dirs_in_dir(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    /// Create `path` and any missing ancestors.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Copy `src` to `dst`.
    ///
    /// # Errors
    ///
    /// Returns an error if `src` is missing, `dst` exists without
    /// `overwrite`, or the copy fails.
    fn copy_file(&self, src: &Path, dst: &Path, overwrite: bool) -> Result<()>;

    /// Move `src` to `dst`, crossing filesystems if necessary.
    ///
    /// # Errors
    ///
    /// Same conditions as [`copy_file`](Self::copy_file).
    fn move_file(&self, src: &Path, dst: &Path, overwrite: bool) -> Result<()>;

    /// Rename `src` to `dst` within the same directory.
    ///
    /// # Errors
    ///
    /// Same conditions as [`copy_file`](Self::copy_file).
    fn rename_file(&self, src: &Path, dst: &Path, overwrite: bool) -> Result<()>;

    /// Delete the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or cannot be removed.
    fn delete_file(&self, path: &Path) -> Result<()>;

    /// Read a text file, replacing invalid UTF-8.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    fn read_file(&self, path: &Path) -> Result<String>;

    /// Replace the contents of a text file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    fn write_file(&self, path: &Path, contents: &str) -> Result<()>;

    /// Extract `archive` into `dest`, returning the extracted file paths.
    ///
    /// # Errors
    ///
    /// Returns an error once every extraction strategy has failed.
    fn extract_archive(&self, archive: &Path, dest: &Path) -> Result<Vec<PathBuf>>;

    /// Run an external program.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be spawned.
    fn execute_process(
        &self,
        program: &Path,
        args: &[String],
        cwd: Option<&Path>,
        timeout: Option<Duration>,
    ) -> Result<ExecResult>;

    /// Locate a program on `PATH`.
    fn find_program(&self, name: &str) -> Option<PathBuf>;
}
