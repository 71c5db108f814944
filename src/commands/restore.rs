//! Restore command: roll a destination back to its pre-install snapshot.
use anyhow::Result;

use crate::cancel::CancellationToken;
use crate::checkpoint::CheckpointManager;
use crate::cli::{GlobalOpts, RestoreOpts};
use crate::dialog::{AutoDialog, DialogPort, TerminalDialog};
use crate::logging::Logger;
use crate::snapshot::SnapshotManager;

/// Run the restore command.
///
/// After a successful restore the stored session is discarded, since it
/// describes installs that no longer exist on disk.
///
/// # Errors
///
/// Returns an error if no snapshot exists or restoring fails.
pub fn run(
    global: &GlobalOpts,
    opts: &RestoreOpts,
    log: &Logger,
    cancel: &CancellationToken,
) -> Result<()> {
    let setup = super::CommandSetup::init(global, None, opts.target.destination.as_deref(), log)?;
    let destination = setup.destination()?;
    let snapshot = SnapshotManager::new(destination);
    if !snapshot.has_snapshot() {
        anyhow::bail!("no snapshot at {}", snapshot.backup_path().display());
    }

    log.stage("Restoring snapshot");
    if setup.config.dry_run {
        log.dry_run(&format!(
            "would restore {} from {}",
            destination.display(),
            snapshot.backup_path().display()
        ));
        return Ok(());
    }

    let dialog: &dyn DialogPort = if opts.yes { &AutoDialog } else { &TerminalDialog };
    if !dialog.confirm(&format!(
        "Replace everything in {} with the snapshot?",
        destination.display()
    )) {
        log.warn("restore declined");
        return Ok(());
    }

    snapshot.restore_snapshot(destination, cancel)?;
    if CheckpointManager::discard(destination)? {
        log.debug("discarded stale session");
    }
    log.info(&format!("restored {}", destination.display()));
    Ok(())
}
