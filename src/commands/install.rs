//! Install command implementation.
use anyhow::Result;
use std::sync::Arc;

use crate::cancel::CancellationToken;
use crate::cli::{GlobalOpts, InstallOpts};
use crate::context::InstallContext;
use crate::coordinator::{InstallCoordinator, InstallSummary};
use crate::dialog::{AutoDialog, DialogPort, TerminalDialog};
use crate::exec::SystemExecutor;
use crate::logging::Logger;

/// Run the install command.
///
/// # Errors
///
/// Returns an error if configuration loading fails, the session or snapshot
/// cannot be written, or any component failed or was blocked.
pub fn run(
    global: &GlobalOpts,
    opts: &InstallOpts,
    log: &Arc<Logger>,
    cancel: CancellationToken,
) -> Result<()> {
    log.info(&format!("mod-installer {}", crate::version()));
    let setup = super::CommandSetup::init(
        global,
        opts.source.as_deref(),
        opts.destination.as_deref(),
        log,
    )?;
    let destination = setup.destination()?.to_path_buf();
    let mut components = super::load_components(&opts.components, log)?;

    let dialog: Arc<dyn DialogPort> = if opts.yes {
        Arc::new(AutoDialog)
    } else {
        Arc::new(TerminalDialog)
    };

    let selected = components.iter().filter(|c| c.is_selected).count();
    if !setup.config.dry_run
        && !dialog.confirm(&format!(
            "Install {selected} component(s) into {}?",
            destination.display()
        ))
    {
        log.warn("install declined");
        return Ok(());
    }

    let ctx = InstallContext::from_config(
        setup.config,
        log.clone(),
        Arc::new(SystemExecutor),
        cancel,
    );
    let coordinator = InstallCoordinator::new(ctx, dialog)?;
    let summary = coordinator.install(&mut components)?;

    log.print_summary();
    report(&summary, log)
}

fn report(summary: &InstallSummary, log: &Logger) -> Result<()> {
    if summary.has_cycle {
        log.warn("ordering constraints contain a cycle; the order used is not authoritative");
    }
    if summary.resumed {
        log.info("resumed a previous session");
    }
    if summary.is_success() {
        return Ok(());
    }
    log.info("rerun the same command to resume, or use `restore` to roll back");
    anyhow::bail!(
        "{} component(s) failed, {} blocked",
        summary.failed.len(),
        summary.blocked.len()
    )
}
