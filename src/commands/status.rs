//! Status command: summarise the stored session for a destination.
use anyhow::Result;

use crate::checkpoint::{CheckpointManager, Session};
use crate::cli::{DestinationOpts, GlobalOpts};
use crate::logging::Logger;
use crate::model::InstallState;
use crate::snapshot::SnapshotManager;

/// Run the status command.
///
/// # Errors
///
/// Returns an error if the session file exists but is invalid.
pub fn run(global: &GlobalOpts, opts: &DestinationOpts, log: &Logger) -> Result<()> {
    let setup = super::CommandSetup::init(global, None, opts.destination.as_deref(), log)?;
    let destination = setup.destination()?;

    let snapshot = SnapshotManager::new(destination);
    log.info(&format!(
        "snapshot: {}",
        if snapshot.has_snapshot() {
            snapshot.backup_path().display().to_string()
        } else {
            "none".to_string()
        }
    ));

    let Some(session) = CheckpointManager::load(destination)? else {
        log.info("no session in progress");
        return Ok(());
    };
    for line in describe(&session) {
        log.info(&line);
    }
    Ok(())
}

fn describe(session: &Session) -> Vec<String> {
    let mut lines = vec![format!(
        "session {} (revision {}, started {})",
        session.session_id,
        session.current_revision,
        session.created_utc.format("%Y-%m-%d %H:%M:%S UTC")
    )];
    for id in &session.component_order {
        let Some(entry) = session.components.get(id) else {
            continue;
        };
        let done = entry
            .instructions
            .iter()
            .filter(|i| i.state == InstallState::Completed)
            .count();
        lines.push(format!(
            "  {id}: {:?} ({done}/{} instructions)",
            entry.state,
            entry.instructions.len()
        ));
    }
    lines
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::model::{Action, Component, Instruction};

    #[test]
    fn describes_components_in_session_order() {
        let dest = tempfile::tempdir().unwrap();
        let mut components = vec![
            Component::new("b", "B"),
            Component::new("a", "A").with_instruction(Instruction::new(
                "a-1",
                Action::Delete {
                    sources: vec!["x".to_string()],
                    strict: false,
                },
            )),
        ];
        let manager = CheckpointManager::new();
        manager.initialize(&mut components, dest.path()).unwrap();
        manager
            .set_component_order(&["a".to_string(), "b".to_string()])
            .unwrap();

        let session = CheckpointManager::load(dest.path()).unwrap().unwrap();
        let lines = describe(&session);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "  a: Pending (0/1 instructions)");
        assert_eq!(lines[2], "  b: Pending (0/0 instructions)");
    }
}
