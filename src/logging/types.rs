//! Core logging types: component records, outcomes, and the [`Log`] trait.

/// Per-component result for summary reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRecord {
    /// Component display name.
    pub name: String,
    /// Final outcome for this run.
    pub outcome: ComponentOutcome,
    /// Optional detail (failure reason, skip reason).
    pub message: Option<String>,
}

/// How a component ended up after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentOutcome {
    /// Every instruction succeeded.
    Installed,
    /// Already completed in a previous run of the same session.
    AlreadyInstalled,
    /// Not selected, or its dependencies were not installed.
    Skipped,
    /// An ancestor failed earlier in this run.
    Blocked,
    /// Simulated only; nothing was changed.
    DryRun,
    /// An instruction failed.
    Failed,
}

/// Abstraction over logging backends.
///
/// [`Logger`](super::logger::Logger) forwards to `tracing`; tests can
/// substitute a recording implementation.
pub trait Log: Send + Sync {
    /// Log a stage header (major section).
    fn stage(&self, msg: &str);
    /// Log an informational message.
    fn info(&self, msg: &str);
    /// Log a debug message (may be suppressed on console).
    fn debug(&self, msg: &str);
    /// Log a warning message.
    fn warn(&self, msg: &str);
    /// Log an error message.
    fn error(&self, msg: &str);
    /// Log a dry-run action message.
    fn dry_run(&self, msg: &str);
    /// Record a component result for the summary.
    fn record_component(&self, name: &str, outcome: ComponentOutcome, message: Option<&str>);
}
