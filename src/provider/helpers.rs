//! Filesystem helpers shared by the providers and the snapshot manager.
use anyhow::{Context as _, Result};
use std::ffi::OsStr;
use std::path::Path;

use crate::cancel::CancellationToken;

/// Ensure the parent directory of `path` exists, creating it (and any
/// ancestors) if necessary.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create parent: {}", parent.display()))?;
    }
    Ok(())
}

/// Remove an existing file or symlink at `path`, including broken symlinks.
///
/// Does nothing if `path` does not exist.
///
/// # Errors
///
/// Returns an error if the path exists but cannot be removed.
pub fn remove_existing(path: &Path) -> Result<()> {
    if path.exists() || path.symlink_metadata().is_ok() {
        std::fs::remove_file(path)
            .with_context(|| format!("remove existing: {}", path.display()))?;
    }
    Ok(())
}

/// Rename `src` to `dst`, falling back to copy + delete when the rename
/// crosses filesystems.
///
/// # Errors
///
/// Returns an error if both the rename and the fallback copy fail.
pub fn move_across(src: &Path, dst: &Path) -> Result<()> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    std::fs::copy(src, dst)
        .with_context(|| format!("copying {} to {}", src.display(), dst.display()))?;
    std::fs::remove_file(src).with_context(|| format!("removing {}", src.display()))?;
    Ok(())
}

/// Outcome counters for [`copy_dir_recursive`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CopyStats {
    /// Files copied.
    pub copied: usize,
    /// Files that disappeared between listing and copying.
    pub vanished: usize,
}

/// Recursively copy a directory tree, skipping a top-level entry named
/// `skip`. Nested entries with that name are copied.
///
/// Files that vanish between the directory listing and the copy are counted
/// in [`CopyStats::vanished`] rather than failing the walk. Cancellation is
/// checked before every file; a cancelled copy returns an
/// [`std::io::ErrorKind::Interrupted`] error.
///
/// # Errors
///
/// Returns an error if the destination cannot be created, a directory cannot
/// be read, a file cannot be copied, or the token is cancelled.
pub fn copy_dir_recursive(
    src: &Path,
    dst: &Path,
    skip: Option<&OsStr>,
    cancel: &CancellationToken,
) -> std::io::Result<CopyStats> {
    let mut stats = CopyStats::default();
    copy_dir_inner(src, dst, skip, cancel, &mut stats)?;
    Ok(stats)
}

fn copy_dir_inner(
    src: &Path,
    dst: &Path,
    skip: Option<&OsStr>,
    cancel: &CancellationToken,
    stats: &mut CopyStats,
) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        if cancel.is_cancelled() {
            return Err(std::io::Error::from(std::io::ErrorKind::Interrupted));
        }
        let entry = entry?;
        if skip.is_some_and(|s| entry.file_name() == s) {
            continue;
        }
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if src_path.is_dir() {
            copy_dir_inner(&src_path, &dst_path, None, cancel, stats)?;
        } else {
            match std::fs::copy(&src_path, &dst_path) {
                Ok(_) => stats.copied += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!("skipping vanished file {}", src_path.display());
                    stats.vanished += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
    Ok(())
}

/// Lower-cased extension of `path` including the leading dot, e.g. `".tga"`.
#[must_use]
pub fn dotted_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
}
