use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};

use super::{ArchiveExtractor, FileSystemProvider};
use crate::exec::{ExecResult, Executor};

/// In-memory overlay over the real disk.
///
/// Reads fall through to disk unless the overlay has recorded a change for
/// the path; writes only ever touch the overlay. Every mutating call is
/// appended to an operation log so a dry run can report what it would have
/// done.
#[derive(Debug)]
pub struct SimulatedFileSystem {
    executor: Arc<dyn Executor>,
    extractor: ArchiveExtractor,
    state: Mutex<Overlay>,
}

/// Where the contents of an overlay file come from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Contents {
    /// Written during the dry run.
    Text(String),
    /// Unchanged copy of a file that still exists on disk.
    Disk(PathBuf),
    /// Produced by a simulated extraction; reads back empty.
    Unknown,
}

#[derive(Debug, Default)]
struct Overlay {
    /// Files created in the overlay.
    files: BTreeMap<PathBuf, Contents>,
    dirs: BTreeSet<PathBuf>,
    removed: HashSet<PathBuf>,
    operations: Vec<String>,
}

impl Overlay {
    fn file_exists(&self, path: &Path) -> bool {
        if self.files.contains_key(path) {
            return true;
        }
        !self.removed.contains(path) && path.is_file()
    }

    fn dir_exists(&self, path: &Path) -> bool {
        self.dirs.contains(path) || path.is_dir()
    }

    fn add_file(&mut self, path: &Path, contents: Contents) {
        self.removed.remove(path);
        if let Some(parent) = path.parent() {
            self.add_dir(parent);
        }
        self.files.insert(path.to_path_buf(), contents);
    }

    fn add_dir(&mut self, path: &Path) {
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() || ancestor.is_dir() {
                break;
            }
            self.dirs.insert(ancestor.to_path_buf());
        }
    }

    fn remove_file(&mut self, path: &Path) {
        self.files.remove(path);
        self.removed.insert(path.to_path_buf());
    }

    fn contents(&self, path: &Path) -> Option<Result<String>> {
        match self.files.get(path) {
            Some(Contents::Text(text)) => return Some(Ok(text.clone())),
            Some(Contents::Disk(origin)) => return Some(read_disk(origin)),
            Some(Contents::Unknown) => return Some(Ok(String::new())),
            None => {}
        }
        if self.removed.contains(path) {
            return Some(Err(anyhow!("file does not exist: {}", path.display())));
        }
        None
    }

    /// Contents a copy of `src` at `dst` would have.
    fn transfer(&self, src: &Path, dst: &Path, overwrite: bool) -> Result<Contents> {
        if !self.file_exists(src) {
            bail!("source file does not exist: {}", src.display());
        }
        if self.file_exists(dst) && !overwrite {
            bail!("destination already exists: {}", dst.display());
        }
        Ok(self
            .files
            .get(src)
            .cloned()
            .unwrap_or_else(|| Contents::Disk(src.to_path_buf())))
    }
}

fn read_disk(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| anyhow!("reading {}: {e}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

impl SimulatedFileSystem {
    /// Create an empty overlay; `executor` is only used for read-only
    /// lookups such as [`FileSystemProvider::find_program`].
    #[must_use]
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        let extractor = ArchiveExtractor::new(Arc::clone(&executor));
        Self {
            executor,
            extractor,
            state: Mutex::new(Overlay::default()),
        }
    }

    /// Descriptions of every simulated side effect, in call order.
    #[must_use]
    pub fn operations(&self) -> Vec<String> {
        self.lock().operations.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Overlay> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn list(&self, dir: &Path, recursive: bool, want_dirs: bool) -> Result<Vec<PathBuf>> {
        let overlay = self.lock();
        if !overlay.dir_exists(dir) {
            bail!("directory does not exist: {}", dir.display());
        }
        let mut out = BTreeSet::new();
        if dir.is_dir() {
            let depth = if recursive { usize::MAX } else { 1 };
            for entry in walkdir::WalkDir::new(dir)
                .min_depth(1)
                .max_depth(depth)
                .into_iter()
                .filter_map(std::result::Result::ok)
            {
                let is_dir = entry.file_type().is_dir();
                if is_dir == want_dirs && !overlay.removed.contains(entry.path()) {
                    out.insert(entry.into_path());
                }
            }
        }
        let virtual_entries: Vec<&PathBuf> = if want_dirs {
            overlay.dirs.iter().collect()
        } else {
            overlay.files.keys().collect()
        };
        for path in virtual_entries {
            let inside = if recursive {
                path.starts_with(dir) && path != dir
            } else {
                path.parent() == Some(dir)
            };
            if inside {
                out.insert(path.clone());
            }
        }
        Ok(out.into_iter().collect())
    }
}

impl FileSystemProvider for SimulatedFileSystem {
    fn is_dry_run(&self) -> bool {
        true
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.lock().file_exists(path)
    }

    fn dir_exists(&self, path: &Path) -> bool {
        self.lock().dir_exists(path)
    }

    fn files_in_dir(&self, dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
        self.list(dir, recursive, false)
    }

    fn dirs_in_dir(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        self.list(dir, false, true)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut overlay = self.lock();
        if !overlay.dir_exists(path) {
            overlay.add_dir(path);
            overlay
                .operations
                .push(format!("create directory {}", path.display()));
        }
        Ok(())
    }

    fn copy_file(&self, src: &Path, dst: &Path, overwrite: bool) -> Result<()> {
        let mut overlay = self.lock();
        let contents = overlay.transfer(src, dst, overwrite)?;
        overlay.add_file(dst, contents);
        overlay
            .operations
            .push(format!("copy {} -> {}", src.display(), dst.display()));
        Ok(())
    }

    fn move_file(&self, src: &Path, dst: &Path, overwrite: bool) -> Result<()> {
        let mut overlay = self.lock();
        let contents = overlay.transfer(src, dst, overwrite)?;
        overlay.remove_file(src);
        overlay.add_file(dst, contents);
        overlay
            .operations
            .push(format!("move {} -> {}", src.display(), dst.display()));
        Ok(())
    }

    fn rename_file(&self, src: &Path, dst: &Path, overwrite: bool) -> Result<()> {
        let mut overlay = self.lock();
        let contents = overlay.transfer(src, dst, overwrite)?;
        overlay.remove_file(src);
        overlay.add_file(dst, contents);
        overlay
            .operations
            .push(format!("rename {} -> {}", src.display(), dst.display()));
        Ok(())
    }

    fn delete_file(&self, path: &Path) -> Result<()> {
        let mut overlay = self.lock();
        if !overlay.file_exists(path) {
            bail!("file does not exist: {}", path.display());
        }
        overlay.remove_file(path);
        overlay.operations.push(format!("delete {}", path.display()));
        Ok(())
    }

    fn read_file(&self, path: &Path) -> Result<String> {
        let overlaid = self.lock().contents(path);
        overlaid.unwrap_or_else(|| read_disk(path))
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        let mut overlay = self.lock();
        overlay.add_file(path, Contents::Text(contents.to_string()));
        overlay.operations.push(format!("write {}", path.display()));
        Ok(())
    }

    fn extract_archive(&self, archive: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
        if !self.file_exists(archive) {
            bail!("archive does not exist: {}", archive.display());
        }
        // Archives produced earlier in the same dry run only exist in the
        // overlay, so their contents cannot be listed.
        let entries = if archive.is_file() {
            self.extractor.list_entries(archive).unwrap_or_else(|e| {
                tracing::debug!("cannot list {} in dry run: {e:#}", archive.display());
                Vec::new()
            })
        } else {
            Vec::new()
        };

        let mut overlay = self.lock();
        let extracted: Vec<PathBuf> = entries.iter().map(|e| dest.join(e)).collect();
        overlay.add_dir(dest);
        for path in &extracted {
            overlay.add_file(path, Contents::Unknown);
        }
        overlay.operations.push(format!(
            "extract {} -> {}",
            archive.display(),
            dest.display()
        ));
        Ok(extracted)
    }

    fn execute_process(
        &self,
        program: &Path,
        args: &[String],
        _cwd: Option<&Path>,
        _timeout: Option<Duration>,
    ) -> Result<ExecResult> {
        self.lock()
            .operations
            .push(format!("run {} {}", program.display(), args.join(" ")));
        Ok(ExecResult {
            success: true,
            code: Some(0),
            ..ExecResult::default()
        })
    }

    fn find_program(&self, name: &str) -> Option<PathBuf> {
        self.executor.which(name)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::provider::archive::tests::{NoToolsExecutor, write_zip};

    fn provider() -> SimulatedFileSystem {
        SimulatedFileSystem::new(Arc::new(NoToolsExecutor))
    }

    #[test]
    fn move_only_changes_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.txt");
        std::fs::write(&src, "content").unwrap();
        let dst = dir.path().join("out/a.txt");

        let fs = provider();
        fs.move_file(&src, &dst, false).unwrap();

        assert!(!fs.file_exists(&src));
        assert!(fs.file_exists(&dst));
        assert!(fs.dir_exists(&dir.path().join("out")));
        assert!(src.exists(), "disk must be untouched");
        assert!(!dst.exists(), "disk must be untouched");
        assert_eq!(fs.read_file(&dst).unwrap(), "content");
    }

    #[test]
    fn chained_transfers_keep_disk_contents() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("cleanlist.txt");
        std::fs::write(&src, "Mandatory Deletions,a.tga").unwrap();
        let staged = dir.path().join("stage/cleanlist.txt");
        let renamed = dir.path().join("stage/list.txt");

        let fs = provider();
        fs.copy_file(&src, &staged, false).unwrap();
        fs.rename_file(&staged, &renamed, false).unwrap();

        assert_eq!(fs.read_file(&renamed).unwrap(), "Mandatory Deletions,a.tga");
        assert!(fs.read_file(&staged).is_err());
    }

    #[test]
    fn overlay_writes_win_over_disk() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.ini");
        std::fs::write(&src, "old").unwrap();
        let dst = dir.path().join("b.ini");

        let fs = provider();
        fs.write_file(&src, "new").unwrap();
        fs.copy_file(&src, &dst, false).unwrap();

        assert_eq!(fs.read_file(&dst).unwrap(), "new");
        assert_eq!(std::fs::read_to_string(&src).unwrap(), "old");
    }

    #[test]
    fn listing_merges_disk_and_overlay() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.tga"), "").unwrap();
        std::fs::write(dir.path().join("b.tga"), "").unwrap();

        let fs = provider();
        fs.delete_file(&dir.path().join("a.tga")).unwrap();
        fs.write_file(&dir.path().join("c.tga"), "new").unwrap();

        let names: Vec<String> = fs
            .files_in_dir(dir.path(), false)
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["b.tga", "c.tga"]);
    }

    #[test]
    fn collision_without_overwrite_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), "").unwrap();
        std::fs::write(dir.path().join("b"), "").unwrap();
        let fs = provider();
        assert!(
            fs.copy_file(&dir.path().join("a"), &dir.path().join("b"), false)
                .is_err()
        );
    }

    #[test]
    fn delete_missing_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(provider().delete_file(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn extract_lists_zip_entries_into_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("mod.zip");
        write_zip(&archive, &[("Override/x.tga", "x")]);

        let fs = provider();
        let out = dir.path().join("out");
        let files = fs.extract_archive(&archive, &out).unwrap();

        assert_eq!(files, vec![out.join("Override/x.tga")]);
        assert!(fs.file_exists(&out.join("Override/x.tga")));
        assert!(!out.exists());
    }

    #[test]
    fn execute_records_but_does_not_run() {
        let fs = provider();
        let result = fs
            .execute_process(Path::new("/definitely/missing"), &["--x".to_string()], None, None)
            .unwrap();
        assert!(result.success);
        assert_eq!(fs.operations(), vec!["run /definitely/missing --x".to_string()]);
    }
}
