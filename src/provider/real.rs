use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result, bail};

use super::helpers::{ensure_parent_dir, move_across, remove_existing};
use super::{ArchiveExtractor, FileSystemProvider};
use crate::exec::{ExecResult, Executor};

/// Production [`FileSystemProvider`] that delegates to [`std::fs`] and a
/// real [`Executor`].
#[derive(Debug, Clone)]
pub struct RealFileSystem {
    executor: Arc<dyn Executor>,
    extractor: ArchiveExtractor,
}

impl RealFileSystem {
    /// Create a provider that spawns processes through `executor`.
    #[must_use]
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        let extractor = ArchiveExtractor::new(Arc::clone(&executor));
        Self {
            executor,
            extractor,
        }
    }

    fn check_transfer(src: &Path, dst: &Path, overwrite: bool) -> Result<()> {
        if !src.is_file() {
            bail!("source file does not exist: {}", src.display());
        }
        if dst.exists() {
            if !overwrite {
                bail!("destination already exists: {}", dst.display());
            }
            remove_existing(dst)?;
        } else {
            ensure_parent_dir(dst)?;
        }
        Ok(())
    }
}

impl FileSystemProvider for RealFileSystem {
    fn is_dry_run(&self) -> bool {
        false
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn dir_exists(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn files_in_dir(&self, dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
        if recursive {
            let mut files = Vec::new();
            for entry in walkdir::WalkDir::new(dir).min_depth(1) {
                let entry = entry.with_context(|| format!("walking {}", dir.display()))?;
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
            return Ok(files);
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
            let path = entry?.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn dirs_in_dir(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
            let path = entry?.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path).with_context(|| format!("creating {}", path.display()))
    }

    fn copy_file(&self, src: &Path, dst: &Path, overwrite: bool) -> Result<()> {
        Self::check_transfer(src, dst, overwrite)?;
        std::fs::copy(src, dst)
            .with_context(|| format!("copying {} to {}", src.display(), dst.display()))?;
        Ok(())
    }

    fn move_file(&self, src: &Path, dst: &Path, overwrite: bool) -> Result<()> {
        Self::check_transfer(src, dst, overwrite)?;
        move_across(src, dst)
    }

    fn rename_file(&self, src: &Path, dst: &Path, overwrite: bool) -> Result<()> {
        Self::check_transfer(src, dst, overwrite)?;
        std::fs::rename(src, dst)
            .with_context(|| format!("renaming {} to {}", src.display(), dst.display()))
    }

    fn delete_file(&self, path: &Path) -> Result<()> {
        std::fs::remove_file(path).with_context(|| format!("deleting {}", path.display()))
    }

    fn read_file(&self, path: &Path) -> Result<String> {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        ensure_parent_dir(path)?;
        std::fs::write(path, contents).with_context(|| format!("writing {}", path.display()))
    }

    fn extract_archive(&self, archive: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
        Ok(self.extractor.extract(archive, dest)?)
    }

    fn execute_process(
        &self,
        program: &Path,
        args: &[String],
        cwd: Option<&Path>,
        timeout: Option<Duration>,
    ) -> Result<ExecResult> {
        self.executor.run_unchecked(program, args, cwd, timeout)
    }

    fn find_program(&self, name: &str) -> Option<PathBuf> {
        self.executor.which(name)
    }
}
