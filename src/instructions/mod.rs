//! The instruction state machine.
//!
//! Each [`Instruction`] moves from *unresolved* (raw path strings with
//! placeholders and wildcards) to *resolved* (concrete paths checked
//! against the provider) to *executed*, and always ends in an
//! [`ExitCode`]. Low-level errors are logged here and never escape.
mod cleanlist;
mod dedup;
mod extract;
mod patcher;
pub mod paths;
mod process;
mod transfer;

use std::path::PathBuf;

use anyhow::{Context as _, Result};

use crate::context::InstallContext;
use crate::model::{Action, Instruction};
use crate::provider::FileSystemProvider;

/// Result of executing one instruction.
///
/// # Examples
///
/// ```
/// use mod_installer::instructions::ExitCode;
///
/// assert!(ExitCode::Success.is_success());
/// assert_eq!(ExitCode::RenameTargetExists.to_string(), "rename target exists");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitCode {
    /// The instruction completed.
    Success,
    /// A source path was empty, missing, or matched nothing.
    InvalidSourcePath,
    /// The destination is missing or unusable.
    InvalidDestination,
    /// A file expected to exist was not there.
    FileNotFoundPost,
    /// Every extraction strategy failed.
    InvalidArchive,
    /// A rename would replace an existing file.
    RenameTargetExists,
    /// An external program failed, timed out, or could not be started.
    ChildProcessError,
    /// The patcher ran but logged errors.
    PatcherError,
    /// The instruction's arguments are malformed.
    InvalidArguments,
    /// The run was cancelled.
    Cancelled,
    /// Anything else.
    UnknownError,
}

impl ExitCode {
    /// Whether this is [`ExitCode::Success`].
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::InvalidSourcePath => "invalid source path",
            Self::InvalidDestination => "invalid destination",
            Self::FileNotFoundPost => "file not found",
            Self::InvalidArchive => "invalid archive",
            Self::RenameTargetExists => "rename target exists",
            Self::ChildProcessError => "child process error",
            Self::PatcherError => "patcher error",
            Self::InvalidArguments => "invalid arguments",
            Self::Cancelled => "cancelled",
            Self::UnknownError => "unknown error",
        };
        f.write_str(s)
    }
}

/// Executes instructions against the context's provider.
///
/// Owns a bounded thread pool sized from
/// [`InstallConfig::io_threads`](crate::config::InstallConfig::io_threads);
/// only the sources of a single Move or Copy run concurrently.
#[derive(Debug)]
pub struct InstructionExecutor {
    ctx: InstallContext,
    pool: rayon::ThreadPool,
}

impl InstructionExecutor {
    /// Create an executor and its I/O pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread pool cannot be built.
    pub fn new(ctx: InstallContext) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(ctx.config.io_threads())
            .thread_name(|i| format!("modinstall-io-{i}"))
            .build()
            .context("building I/O thread pool")?;
        Ok(Self { ctx, pool })
    }

    /// The context this executor runs in.
    #[must_use]
    pub const fn context(&self) -> &InstallContext {
        &self.ctx
    }

    fn fs(&self) -> &dyn FileSystemProvider {
        self.ctx.fs.as_ref()
    }

    /// Execute one instruction.
    ///
    /// `selected_names` are the display names of the selected components,
    /// consulted by clean lists.
    #[must_use]
    pub fn execute(&self, instruction: &Instruction, selected_names: &[String]) -> ExitCode {
        if self.ctx.cancel.is_cancelled() {
            return ExitCode::Cancelled;
        }
        self.ctx.log.debug(&format!(
            "instruction {} ({})",
            instruction.id,
            instruction.action.kind()
        ));

        let code = match &instruction.action {
            Action::Move {
                sources,
                destination,
                overwrite,
            } => self.transfer(transfer::Transfer::Move, sources, destination, *overwrite),
            Action::Copy {
                sources,
                destination,
                overwrite,
            } => self.transfer(transfer::Transfer::Copy, sources, destination, *overwrite),
            Action::Rename {
                sources,
                destination,
                overwrite,
            } => self.rename(sources, destination, *overwrite),
            Action::Delete { sources, strict } => self.delete(sources, *strict),
            Action::Extract {
                sources,
                destination,
            } => self.extract(sources, destination.as_deref()),
            Action::DelDuplicate {
                directory,
                compatible_extensions,
                preferred_extension,
            } => self.delete_duplicates(directory, compatible_extensions, preferred_extension),
            Action::Patcher {
                source,
                destination,
                arguments,
            } => self.run_patcher(source, destination, arguments),
            Action::Execute { sources, arguments } => self.run_programs(sources, arguments),
            Action::CleanList {
                list_file,
                destination,
            } => self.clean_list(list_file, destination, selected_names),
            Action::Choose { .. } => {
                self.ctx.log.error(&format!(
                    "instruction {}: choose must be expanded by the coordinator",
                    instruction.id
                ));
                ExitCode::InvalidArguments
            }
        };

        if !code.is_success() {
            self.ctx.log.error(&format!(
                "instruction {} ({}) failed: {code}",
                instruction.id,
                instruction.action.kind()
            ));
        }
        code
    }

    /// Substitute placeholders and, when configured, fix up case.
    fn resolve_path(&self, raw: &str) -> PathBuf {
        let path = PathBuf::from(paths::substitute(raw, &self.ctx.config));
        if self.ctx.config.case_insensitive_paths {
            paths::fix_case(self.fs(), &path)
        } else {
            path
        }
    }

    /// Resolve source patterns into concrete paths.
    ///
    /// Existence is checked only when `validate` is set and this is not a
    /// dry run; a wildcard that matches nothing counts as missing.
    fn resolve_sources(&self, patterns: &[String], validate: bool) -> Result<Vec<PathBuf>, ExitCode> {
        if patterns.iter().all(|p| p.trim().is_empty()) {
            self.ctx.log.error("instruction has no source paths");
            return Err(ExitCode::InvalidSourcePath);
        }
        let validate = validate && !self.ctx.is_dry_run();
        let mut resolved = Vec::new();

        for raw in patterns.iter().filter(|p| !p.trim().is_empty()) {
            let substituted = paths::substitute(raw, &self.ctx.config);
            if paths::has_wildcard(&substituted) {
                let matches = paths::expand(
                    self.fs(),
                    &PathBuf::from(&substituted),
                    self.ctx.config.case_insensitive_paths,
                )
                .map_err(|e| {
                    self.ctx.log.error(&format!("{e:#}"));
                    ExitCode::InvalidSourcePath
                })?;
                if matches.is_empty() && validate {
                    self.ctx
                        .log
                        .error(&format!("no files match {substituted}"));
                    return Err(ExitCode::InvalidSourcePath);
                }
                resolved.extend(matches);
            } else {
                let path = self.resolve_path(raw);
                if validate && !self.fs().file_exists(&path) && !self.fs().dir_exists(&path) {
                    self.ctx
                        .log
                        .error(&format!("source does not exist: {}", path.display()));
                    return Err(ExitCode::InvalidSourcePath);
                }
                resolved.push(path);
            }
        }

        let mut seen = std::collections::HashSet::new();
        resolved.retain(|p| seen.insert(p.clone()));
        Ok(resolved)
    }

    /// Resolve a directory the instruction writes into, creating it when
    /// missing.
    fn ensure_destination(&self, raw: &str) -> Result<PathBuf, ExitCode> {
        if raw.trim().is_empty() {
            self.ctx.log.error("instruction has no destination");
            return Err(ExitCode::InvalidDestination);
        }
        let dir = self.resolve_path(raw);
        if self.fs().file_exists(&dir) {
            self.ctx.log.error(&format!(
                "destination is a file, not a directory: {}",
                dir.display()
            ));
            return Err(ExitCode::InvalidDestination);
        }
        if !self.fs().dir_exists(&dir) {
            self.fs().create_dir_all(&dir).map_err(|e| {
                self.ctx.log.error(&format!("{e:#}"));
                ExitCode::InvalidDestination
            })?;
        }
        Ok(dir)
    }

    /// Resolve a directory that must already exist.
    fn existing_directory(&self, raw: &str) -> Result<PathBuf, ExitCode> {
        let dir = self.resolve_path(raw);
        if self.fs().dir_exists(&dir) {
            Ok(dir)
        } else {
            self.ctx
                .log
                .error(&format!("directory does not exist: {}", dir.display()));
            Err(ExitCode::InvalidDestination)
        }
    }
}

/// Collapse a `Result<(), ExitCode>` into an [`ExitCode`].
fn finish(result: Result<(), ExitCode>) -> ExitCode {
    result.err().unwrap_or(ExitCode::Success)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
pub(crate) mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use super::*;
    use crate::cancel::CancellationToken;
    use crate::config::InstallConfig;
    use crate::exec::Executor;
    use crate::logging::MemoryLog;
    use crate::provider::archive::tests::NoToolsExecutor;
    use crate::provider::{RealFileSystem, SimulatedFileSystem};

    /// A mod workspace and game directory under one temp dir.
    pub(crate) struct Fixture {
        pub dir: tempfile::TempDir,
        pub log: Arc<MemoryLog>,
        pub config: InstallConfig,
    }

    impl Fixture {
        pub fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let mods = dir.path().join("mods");
            let game = dir.path().join("game");
            std::fs::create_dir_all(&mods).unwrap();
            std::fs::create_dir_all(&game).unwrap();
            Self {
                dir,
                log: Arc::new(MemoryLog::default()),
                config: InstallConfig {
                    source_path: mods,
                    destination_path: game,
                    ..InstallConfig::default()
                },
            }
        }

        pub fn mods(&self) -> &Path {
            &self.config.source_path
        }

        pub fn game(&self) -> &Path {
            &self.config.destination_path
        }

        pub fn write(&self, path: &Path, contents: &str) {
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, contents).unwrap();
        }

        pub fn executor_with(&self, executor: Arc<dyn Executor>) -> InstructionExecutor {
            let ctx = InstallContext::new(
                self.config.clone(),
                self.log.clone(),
                Arc::new(RealFileSystem::new(executor)),
                CancellationToken::new(),
            );
            InstructionExecutor::new(ctx).unwrap()
        }

        pub fn executor(&self) -> InstructionExecutor {
            self.executor_with(Arc::new(NoToolsExecutor))
        }

        pub fn dry_run_executor(&self) -> (InstructionExecutor, Arc<SimulatedFileSystem>) {
            let fs = Arc::new(SimulatedFileSystem::new(Arc::new(NoToolsExecutor)));
            let ctx = InstallContext::new(
                self.config.clone(),
                self.log.clone(),
                fs.clone(),
                CancellationToken::new(),
            );
            (InstructionExecutor::new(ctx).unwrap(), fs)
        }
    }

    pub(crate) fn run(executor: &InstructionExecutor, action: Action) -> ExitCode {
        executor.execute(&Instruction::new("test-1", action), &[])
    }

    #[test]
    fn empty_sources_are_invalid() {
        let fx = Fixture::new();
        let code = run(
            &fx.executor(),
            Action::Copy {
                sources: vec![],
                destination: "<<kotorDirectory>>".to_string(),
                overwrite: true,
            },
        );
        assert_eq!(code, ExitCode::InvalidSourcePath);
    }

    #[test]
    fn missing_literal_source_is_invalid() {
        let fx = Fixture::new();
        let code = run(
            &fx.executor(),
            Action::Copy {
                sources: vec!["<<modDirectory>>/missing.2da".to_string()],
                destination: "<<kotorDirectory>>".to_string(),
                overwrite: true,
            },
        );
        assert_eq!(code, ExitCode::InvalidSourcePath);
        assert!(fx.log.contains("error", "missing.2da"));
    }

    #[test]
    fn unmatched_wildcard_is_invalid() {
        let fx = Fixture::new();
        let code = run(
            &fx.executor(),
            Action::Move {
                sources: vec!["<<modDirectory>>/*.tga".to_string()],
                destination: "<<kotorDirectory>>".to_string(),
                overwrite: true,
            },
        );
        assert_eq!(code, ExitCode::InvalidSourcePath);
    }

    #[test]
    fn choose_is_rejected_by_the_executor() {
        let fx = Fixture::new();
        let code = run(
            &fx.executor(),
            Action::Choose {
                options: vec!["x".to_string()],
            },
        );
        assert_eq!(code, ExitCode::InvalidArguments);
    }

    #[test]
    fn cancelled_context_short_circuits() {
        let fx = Fixture::new();
        let executor = fx.executor();
        executor.context().cancel.cancel();
        let code = run(
            &executor,
            Action::Delete {
                sources: vec!["x".to_string()],
                strict: true,
            },
        );
        assert_eq!(code, ExitCode::Cancelled);
    }

    #[test]
    fn case_insensitive_sources_resolve() {
        let mut fx = Fixture::new();
        fx.config.case_insensitive_paths = true;
        fx.write(&fx.mods().join("Data/File.2DA"), "x");
        let executor = fx.executor();

        let resolved = executor
            .resolve_sources(&["<<modDirectory>>/data/file.2da".to_string()], true)
            .unwrap();
        assert_eq!(resolved, vec![fx.mods().join("Data/File.2DA")]);
    }

    #[test]
    fn pool_size_follows_config() {
        let mut fx = Fixture::new();
        fx.config.multithreaded_io = false;
        assert_eq!(fx.executor().pool.current_num_threads(), 1);
    }
}
