//! Move, Copy, Rename, and Delete.
use std::ops::AddAssign;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{ExitCode, InstructionExecutor, finish};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Transfer {
    Move,
    Copy,
}

impl Transfer {
    const fn verb(self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::Copy => "copy",
        }
    }
}

/// Per-file outcome counters, summed across pool workers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct TransferStats {
    done: usize,
    skipped: usize,
}

impl AddAssign for TransferStats {
    fn add_assign(&mut self, other: Self) {
        self.done += other.done;
        self.skipped += other.skipped;
    }
}

/// Whether `a` and `b` name the same file, comparing canonical forms when
/// both exist on disk.
fn same_file(a: &Path, b: &Path) -> bool {
    a == b
        || matches!(
            (dunce::canonicalize(a), dunce::canonicalize(b)),
            (Ok(x), Ok(y)) if x == y
        )
}

impl InstructionExecutor {
    pub(super) fn transfer(
        &self,
        kind: Transfer,
        sources: &[String],
        destination: &str,
        overwrite: bool,
    ) -> ExitCode {
        let files = match self.resolve_sources(sources, true) {
            Ok(files) => files,
            Err(code) => return code,
        };
        let dest_dir = match self.ensure_destination(destination) {
            Ok(dir) => dir,
            Err(code) => return code,
        };

        match self.collect_parallel(files, |src| self.transfer_one(kind, &src, &dest_dir, overwrite)) {
            Ok(stats) => {
                self.ctx.log.info(&format!(
                    "{} {} file(s) to {} ({} skipped)",
                    kind.verb(),
                    stats.done,
                    dest_dir.display(),
                    stats.skipped
                ));
                ExitCode::Success
            }
            Err(code) => code,
        }
    }

    /// Run `work` over `items` on the I/O pool, summing the stats deltas.
    ///
    /// The first failing item stops the remaining ones from starting.
    fn collect_parallel(
        &self,
        items: Vec<PathBuf>,
        work: impl Fn(PathBuf) -> Result<TransferStats, ExitCode> + Sync + Send,
    ) -> Result<TransferStats, ExitCode> {
        use rayon::prelude::*;
        let stats = Mutex::new(TransferStats::default());
        self.pool.install(|| {
            items.into_par_iter().try_for_each(|item| -> Result<(), ExitCode> {
                let delta = work(item)?;
                *stats
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner) += delta;
                Ok(())
            })
        })?;
        Ok(stats
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner))
    }

    fn transfer_one(
        &self,
        kind: Transfer,
        src: &Path,
        dest_dir: &Path,
        overwrite: bool,
    ) -> Result<TransferStats, ExitCode> {
        if self.ctx.cancel.is_cancelled() {
            return Err(ExitCode::Cancelled);
        }
        let fs = self.fs();
        if fs.dir_exists(src) {
            self.ctx.log.error(&format!(
                "cannot {} a directory: {}",
                kind.verb(),
                src.display()
            ));
            return Err(ExitCode::InvalidSourcePath);
        }
        let Some(name) = src.file_name() else {
            return Err(ExitCode::InvalidSourcePath);
        };
        let dst = dest_dir.join(name);
        let mut delta = TransferStats::default();

        if same_file(src, &dst) {
            self.ctx.log.debug(&format!(
                "{} is already in {}",
                src.display(),
                dest_dir.display()
            ));
            delta.skipped += 1;
            return Ok(delta);
        }

        if fs.file_exists(&dst) {
            if !overwrite {
                self.ctx.log.warn(&format!(
                    "skipping {}: {} already exists",
                    src.display(),
                    dst.display()
                ));
                delta.skipped += 1;
                return Ok(delta);
            }
            fs.delete_file(&dst).map_err(|e| {
                self.ctx.log.error(&format!("{e:#}"));
                ExitCode::UnknownError
            })?;
        }

        let result = match kind {
            Transfer::Move => fs.move_file(src, &dst, false),
            Transfer::Copy => fs.copy_file(src, &dst, false),
        };
        if let Err(e) = result {
            self.ctx.log.error(&format!(
                "failed to {} {}: {e:#}",
                kind.verb(),
                src.display()
            ));
            return Err(if fs.file_exists(src) {
                ExitCode::UnknownError
            } else {
                ExitCode::FileNotFoundPost
            });
        }
        if fs.is_dry_run() {
            self.ctx.log.dry_run(&format!(
                "would {} {} -> {}",
                kind.verb(),
                src.display(),
                dst.display()
            ));
        } else {
            self.ctx.log.debug(&format!(
                "{} {} -> {}",
                kind.verb(),
                src.display(),
                dst.display()
            ));
        }
        delta.done += 1;
        Ok(delta)
    }

    pub(super) fn rename(&self, sources: &[String], new_name: &str, overwrite: bool) -> ExitCode {
        if new_name.trim().is_empty() || new_name.contains(['/', '\\']) {
            self.ctx.log.error(&format!(
                "rename target must be a bare file name, got '{new_name}'"
            ));
            return ExitCode::InvalidArguments;
        }
        let files = match self.resolve_sources(sources, true) {
            Ok(files) => files,
            Err(code) => return code,
        };
        let fs = self.fs();

        finish(files.iter().try_for_each(|src| {
            if self.ctx.cancel.is_cancelled() {
                return Err(ExitCode::Cancelled);
            }
            let dst = src.with_file_name(new_name);
            if dst == *src {
                return Ok(());
            }
            if fs.file_exists(&dst) {
                if !overwrite {
                    self.ctx.log.error(&format!(
                        "cannot rename {}: {} already exists",
                        src.display(),
                        dst.display()
                    ));
                    return Err(ExitCode::RenameTargetExists);
                }
                fs.delete_file(&dst).map_err(|e| {
                    self.ctx.log.error(&format!("{e:#}"));
                    ExitCode::UnknownError
                })?;
            }
            fs.rename_file(src, &dst, false).map_err(|e| {
                self.ctx.log.error(&format!("{e:#}"));
                ExitCode::FileNotFoundPost
            })?;
            self.ctx
                .log
                .debug(&format!("renamed {} -> {}", src.display(), dst.display()));
            Ok(())
        }))
    }

    pub(super) fn delete(&self, sources: &[String], strict: bool) -> ExitCode {
        let files = match self.resolve_sources(sources, false) {
            Ok(files) => files,
            Err(code) => return code,
        };
        if files.is_empty() {
            if strict {
                self.ctx.log.error("no files matched for deletion");
                return ExitCode::FileNotFoundPost;
            }
            self.ctx.log.info("no files matched for deletion");
            return ExitCode::Success;
        }
        let fs = self.fs();
        let mut deleted = 0usize;

        let result = files.iter().try_for_each(|path| {
            if self.ctx.cancel.is_cancelled() {
                return Err(ExitCode::Cancelled);
            }
            if !fs.file_exists(path) {
                if strict {
                    self.ctx
                        .log
                        .error(&format!("file to delete does not exist: {}", path.display()));
                    return Err(ExitCode::FileNotFoundPost);
                }
                self.ctx
                    .log
                    .info(&format!("skipping missing file {}", path.display()));
                return Ok(());
            }
            fs.delete_file(path).map_err(|e| {
                self.ctx.log.error(&format!("{e:#}"));
                ExitCode::UnknownError
            })?;
            deleted += 1;
            Ok(())
        });
        if result.is_ok() {
            self.ctx.log.info(&format!("deleted {deleted} file(s)"));
        }
        finish(result)
    }
}
