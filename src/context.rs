use std::sync::Arc;

use crate::cancel::CancellationToken;
use crate::config::InstallConfig;
use crate::exec::Executor;
use crate::logging::Log;
use crate::provider::{FileSystemProvider, RealFileSystem, SimulatedFileSystem};

/// Shared, immutable state threaded through the coordinator and executor.
#[derive(Clone)]
pub struct InstallContext {
    /// Settings for this run.
    pub config: Arc<InstallConfig>,
    /// Logger for output and component recording.
    pub log: Arc<dyn Log>,
    /// Every side effect goes through this provider.
    pub fs: Arc<dyn FileSystemProvider>,
    /// Cooperative cancellation flag.
    pub cancel: CancellationToken,
}

impl std::fmt::Debug for InstallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallContext")
            .field("config", &self.config)
            .field("log", &"<dyn Log>")
            .field("fs", &self.fs)
            .field("cancel", &self.cancel)
            .finish()
    }
}

impl InstallContext {
    /// Build a context with an explicit provider.
    #[must_use]
    pub fn new(
        config: InstallConfig,
        log: Arc<dyn Log>,
        fs: Arc<dyn FileSystemProvider>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config: Arc::new(config),
            log,
            fs,
            cancel,
        }
    }

    /// Build a context whose provider matches `config.dry_run`: the
    /// simulated overlay for dry runs, the real filesystem otherwise.
    #[must_use]
    pub fn from_config(
        config: InstallConfig,
        log: Arc<dyn Log>,
        executor: Arc<dyn Executor>,
        cancel: CancellationToken,
    ) -> Self {
        let fs: Arc<dyn FileSystemProvider> = if config.dry_run {
            Arc::new(SimulatedFileSystem::new(executor))
        } else {
            Arc::new(RealFileSystem::new(executor))
        };
        Self::new(config, log, fs, cancel)
    }

    /// Whether side effects are simulated.
    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.fs.is_dry_run()
    }
}
