//! Snapshot command: capture the destination ahead of an install.
use anyhow::Result;

use crate::cancel::CancellationToken;
use crate::cli::{GlobalOpts, SnapshotOpts};
use crate::logging::Logger;
use crate::snapshot::SnapshotManager;

/// Run the snapshot command.
///
/// Without `--promote` an existing snapshot is left alone.
///
/// # Errors
///
/// Returns an error if the destination is missing or capture fails.
pub fn run(
    global: &GlobalOpts,
    opts: &SnapshotOpts,
    log: &Logger,
    cancel: &CancellationToken,
) -> Result<()> {
    let setup = super::CommandSetup::init(global, None, opts.target.destination.as_deref(), log)?;
    let destination = setup.destination()?;
    if !destination.is_dir() {
        anyhow::bail!("destination does not exist: {}", destination.display());
    }
    let snapshot = SnapshotManager::new(destination);

    log.stage("Capturing snapshot");
    if setup.config.dry_run {
        log.dry_run(&format!(
            "would write {}",
            snapshot.backup_path().display()
        ));
        return Ok(());
    }

    if opts.promote {
        snapshot.promote_snapshot(destination, cancel)?;
        log.info(&format!("promoted {}", snapshot.backup_path().display()));
    } else if snapshot.ensure_snapshot(destination, cancel)? {
        log.info(&format!("wrote {}", snapshot.backup_path().display()));
    } else {
        log.info(&format!(
            "snapshot already exists at {} (use --promote to replace it)",
            snapshot.backup_path().display()
        ));
    }
    Ok(())
}
