//! Pre-install snapshot of the destination tree.
//!
//! A snapshot is a zip of everything under the destination except the
//! session folder, stored at `<destination>/.modinstall/backup.zip`.
//! Capture copies the tree to a scratch directory first and archives the
//! copy, so the archive writer is never held open across a slow walk of a
//! tree that may be changing.
//!
//! Restore is delete-then-repopulate. Cancelling it part-way leaves the
//! destination partially emptied; the snapshot itself is untouched and a
//! second restore recovers the tree.

use std::ffi::OsStr;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::cancel::CancellationToken;
use crate::checkpoint::{SESSION_DIR, session_dir};
use crate::error::SnapshotError;
use crate::provider::helpers::copy_dir_recursive;

/// File name of the backup archive inside the session folder.
pub const BACKUP_FILE: &str = "backup.zip";

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> SnapshotError + '_ {
    move |source| {
        if source.kind() == std::io::ErrorKind::Interrupted {
            SnapshotError::Cancelled
        } else {
            SnapshotError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// Captures and restores the destination snapshot.
#[derive(Debug)]
pub struct SnapshotManager {
    backup_path: PathBuf,
    archive_lock: Mutex<()>,
}

impl SnapshotManager {
    /// Manager for the snapshot belonging to `destination`.
    #[must_use]
    pub fn new(destination: &Path) -> Self {
        Self {
            backup_path: session_dir(destination).join(BACKUP_FILE),
            archive_lock: Mutex::new(()),
        }
    }

    /// Location of the backup archive.
    #[must_use]
    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    /// Whether a backup archive exists.
    #[must_use]
    pub fn has_snapshot(&self) -> bool {
        self.backup_path.is_file()
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.archive_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Capture `source_dir` unless a snapshot already exists.
    ///
    /// Returns `true` when a new snapshot was written.
    ///
    /// # Errors
    ///
    /// Returns an error if copying or archiving fails, or if `cancel` fires.
    pub fn ensure_snapshot(
        &self,
        source_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<bool, SnapshotError> {
        let _guard = self.lock();
        if self.has_snapshot() {
            tracing::debug!("snapshot already present at {}", self.backup_path.display());
            return Ok(false);
        }
        self.capture(source_dir, cancel)?;
        Ok(true)
    }

    /// Replace the existing snapshot with a fresh capture of `source_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if copying or archiving fails, or if `cancel` fires.
    /// The previous snapshot is kept when capture fails.
    pub fn promote_snapshot(
        &self,
        source_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), SnapshotError> {
        let _guard = self.lock();
        self.capture(source_dir, cancel)
    }

    fn capture(&self, source_dir: &Path, cancel: &CancellationToken) -> Result<(), SnapshotError> {
        let work = tempfile::tempdir().map_err(io_err(source_dir))?;
        let stats = copy_dir_recursive(
            source_dir,
            work.path(),
            Some(OsStr::new(SESSION_DIR)),
            cancel,
        )
        .map_err(io_err(source_dir))?;
        if stats.vanished > 0 {
            tracing::warn!(
                "{} file(s) disappeared while capturing the snapshot",
                stats.vanished
            );
        }

        let parent = self.backup_path.parent().unwrap_or(source_dir);
        std::fs::create_dir_all(parent).map_err(io_err(parent))?;
        let mut staged = tempfile::NamedTempFile::new_in(parent).map_err(io_err(parent))?;
        write_zip(work.path(), staged.as_file_mut(), cancel)?;
        staged
            .persist(&self.backup_path)
            .map_err(|e| io_err(&self.backup_path)(e.error))?;

        tracing::info!(
            "captured snapshot of {} files to {}",
            stats.copied,
            self.backup_path.display()
        );
        Ok(())
    }

    /// Restore `destination` to the captured snapshot.
    ///
    /// Everything under `destination` except the session folder is deleted
    /// and then repopulated from the archive.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Missing`] without a snapshot, and an error if
    /// extraction, deletion or copying fails or `cancel` fires.
    pub fn restore_snapshot(
        &self,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), SnapshotError> {
        let _guard = self.lock();
        if !self.has_snapshot() {
            return Err(SnapshotError::Missing(self.backup_path.clone()));
        }

        let scratch = tempfile::tempdir().map_err(io_err(destination))?;
        let restored = read_zip(&self.backup_path, scratch.path(), cancel)?;

        let entries = std::fs::read_dir(destination).map_err(io_err(destination))?;
        for entry in entries {
            if cancel.is_cancelled() {
                return Err(SnapshotError::Cancelled);
            }
            let entry = entry.map_err(io_err(destination))?;
            if entry.file_name() == SESSION_DIR {
                continue;
            }
            let path = entry.path();
            let result = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            result.map_err(io_err(&path))?;
        }

        copy_dir_recursive(
            scratch.path(),
            destination,
            Some(OsStr::new(SESSION_DIR)),
            cancel,
        )
        .map_err(io_err(destination))?;

        tracing::info!(
            "restored {restored} files into {}",
            destination.display()
        );
        Ok(())
    }
}

/// Archive every file and directory under `root` into `out`.
fn write_zip(root: &Path, out: &mut File, cancel: &CancellationToken) -> Result<(), SnapshotError> {
    let mut writer = zip::ZipWriter::new(out);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .large_file(true);

    for entry in walkdir::WalkDir::new(root).min_depth(1).sort_by_file_name() {
        if cancel.is_cancelled() {
            return Err(SnapshotError::Cancelled);
        }
        let entry = entry.map_err(|e| SnapshotError::Io {
            path: root.to_path_buf(),
            source: e.into(),
        })?;
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            writer.add_directory(name, options)?;
        } else {
            writer.start_file(name, options)?;
            let mut file = File::open(entry.path()).map_err(io_err(entry.path()))?;
            std::io::copy(&mut file, &mut writer).map_err(io_err(entry.path()))?;
        }
    }
    writer.finish()?;
    Ok(())
}

/// Extract `archive` into `dest`, returning the number of files written.
fn read_zip(archive: &Path, dest: &Path, cancel: &CancellationToken) -> Result<usize, SnapshotError> {
    let file = File::open(archive).map_err(io_err(archive))?;
    let mut zip = zip::ZipArchive::new(BufReader::new(file))?;
    let mut count = 0;

    for i in 0..zip.len() {
        if cancel.is_cancelled() {
            return Err(SnapshotError::Cancelled);
        }
        let mut entry = zip.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        let target = dest.join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&target).map_err(io_err(&target))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        let mut out = File::create(&target).map_err(io_err(&target))?;
        std::io::copy(&mut entry, &mut out).map_err(io_err(&target))?;
        count += 1;
    }
    Ok(count)
}
