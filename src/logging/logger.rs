//! Structured logger with dry-run awareness and summary collection.
use std::path::PathBuf;
use std::sync::Mutex;

use super::types::{ComponentOutcome, ComponentRecord, Log};
use super::utils::log_file_path;

/// Implement the display methods of [`Log`] by delegating to inherent methods
/// of the same name on the implementing type.
macro_rules! forward_log_methods {
    ($($method:ident),+ $(,)?) => {
        $(
            fn $method(&self, msg: &str) {
                self.$method(msg);
            }
        )+
    };
}

/// Structured logger with dry-run awareness and summary collection.
///
/// Every message also lands in `$XDG_CACHE_HOME/mod-installer/<command>.log`
/// through the [`FileLayer`](super::subscriber::FileLayer) installed by
/// [`init_subscriber`](super::subscriber::init_subscriber).
#[derive(Debug)]
pub struct Logger {
    components: Mutex<Vec<ComponentRecord>>,
    log_file: Option<PathBuf>,
}

impl Logger {
    /// Create a new logger.
    ///
    /// Only remembers the log file path for the summary; the file itself is
    /// created by the subscriber.
    #[must_use]
    pub fn new(command: &str) -> Self {
        Self {
            components: Mutex::new(Vec::new()),
            log_file: log_file_path(command),
        }
    }

    /// Return the log file path, if available.
    #[cfg(test)]
    pub const fn log_path(&self) -> Option<&PathBuf> {
        self.log_file.as_ref()
    }

    /// Snapshot of every recorded component.
    #[must_use]
    pub fn records(&self) -> Vec<ComponentRecord> {
        self.components.lock().map_or_else(|_| vec![], |g| g.clone())
    }

    /// Log an error message.
    pub fn error(&self, msg: &str) {
        tracing::error!("{msg}");
    }

    /// Log a warning message.
    pub fn warn(&self, msg: &str) {
        tracing::warn!("{msg}");
    }

    /// Log a stage header (major section).
    pub fn stage(&self, msg: &str) {
        tracing::info!(target: "modinstall::stage", "{msg}");
    }

    /// Log an informational message.
    pub fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    /// Log a debug message.
    pub fn debug(&self, msg: &str) {
        tracing::debug!("{msg}");
    }

    /// Log a dry-run action message.
    pub fn dry_run(&self, msg: &str) {
        tracing::info!(target: "modinstall::dry_run", "{msg}");
    }

    /// Record a component result for the summary.
    pub fn record_component(&self, name: &str, outcome: ComponentOutcome, message: Option<&str>) {
        if let Ok(mut guard) = self.components.lock() {
            guard.push(ComponentRecord {
                name: name.to_string(),
                outcome,
                message: message.map(String::from),
            });
        }
    }

    /// Count the failed components.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.components.lock().map_or(0, |guard| {
            guard
                .iter()
                .filter(|c| c.outcome == ComponentOutcome::Failed)
                .count()
        })
    }

    /// Print the summary of all recorded components.
    pub fn print_summary(&self) {
        let records = self.records();
        if records.is_empty() {
            return;
        }

        self.stage("Summary");

        let mut installed = 0u32;
        let mut previous = 0u32;
        let mut skipped = 0u32;
        let mut blocked = 0u32;
        let mut dry_run = 0u32;
        let mut failed = 0u32;

        for record in &records {
            let (icon, color) = match record.outcome {
                ComponentOutcome::Installed => {
                    installed += 1;
                    ("✓", "\x1b[32m")
                }
                ComponentOutcome::AlreadyInstalled => {
                    previous += 1;
                    ("·", "\x1b[2m")
                }
                ComponentOutcome::Skipped => {
                    skipped += 1;
                    ("○", "\x1b[33m")
                }
                ComponentOutcome::Blocked => {
                    blocked += 1;
                    ("⊘", "\x1b[35m")
                }
                ComponentOutcome::DryRun => {
                    dry_run += 1;
                    ("~", "\x1b[37m")
                }
                ComponentOutcome::Failed => {
                    failed += 1;
                    ("✗", "\x1b[31m")
                }
            };

            let suffix = record
                .message
                .as_ref()
                .map_or_else(String::new, |msg| format!(" ({msg})"));

            self.info(&format!("{color}{icon} {}{suffix}\x1b[0m", record.name));
        }

        let total = installed + previous + skipped + blocked + dry_run + failed;
        self.info(&format!(
            "{total} components: \x1b[32m{installed} installed\x1b[0m, \x1b[2m{previous} previously installed\x1b[0m, \x1b[33m{skipped} skipped\x1b[0m, \x1b[35m{blocked} blocked\x1b[0m, \x1b[37m{dry_run} dry-run\x1b[0m, \x1b[31m{failed} failed\x1b[0m"
        ));

        if let Some(path) = &self.log_file {
            self.info(&format!("\x1b[2mlog: {}\x1b[0m", path.display()));
        }
    }
}

impl Log for Logger {
    forward_log_methods!(stage, info, debug, warn, error, dry_run);

    fn record_component(&self, name: &str, outcome: ComponentOutcome, message: Option<&str>) {
        self.record_component(name, outcome, message);
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::logging::isolated_logger;
    use std::fs;

    #[test]
    fn logger_starts_empty() {
        let (log, _tmp, _guard) = isolated_logger();
        assert!(log.records().is_empty());
    }

    #[test]
    fn record_component_with_message() {
        let (log, _tmp, _guard) = isolated_logger();
        log.record_component("HD Textures", ComponentOutcome::Failed, Some("InvalidArchive"));
        let records = log.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "HD Textures");
        assert_eq!(records[0].message.as_deref(), Some("InvalidArchive"));
    }

    #[test]
    fn failure_count_only_counts_failed() {
        let (log, _tmp, _guard) = isolated_logger();
        log.record_component("a", ComponentOutcome::Installed, None);
        log.record_component("b", ComponentOutcome::Failed, None);
        log.record_component("c", ComponentOutcome::Blocked, None);
        assert_eq!(log.failure_count(), 1);
    }

    #[test]
    fn log_trait_delegates_to_logger() {
        let (log, _tmp, _guard) = isolated_logger();
        let log_ref: &dyn Log = &log;
        log_ref.record_component("via-trait", ComponentOutcome::Skipped, None);
        assert_eq!(log.records().len(), 1);
    }

    #[test]
    fn tagged_messages_are_written_to_file() {
        let (log, _tmp, _guard) = isolated_logger();
        let marker = format!("marker-{}", std::process::id());
        log.stage(&format!("stage-{marker}"));
        log.warn(&format!("warn-{marker}"));
        log.dry_run(&format!("dry-{marker}"));
        log.debug(&format!("debug-{marker}"));

        let contents = fs::read_to_string(log.log_path().expect("log path")).unwrap();
        assert!(contents.contains(&format!("STAGE  stage-{marker}")));
        assert!(contents.contains(&format!("WARN   warn-{marker}")));
        assert!(contents.contains(&format!("DRYRUN dry-{marker}")));
        assert!(contents.contains(&format!("DEBUG  debug-{marker}")));
    }
}
