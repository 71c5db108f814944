//! Persistent install session for crash-safe resume.
//!
//! The session lives at `<destination>/.modinstall/session.json` and mirrors
//! every component and instruction transition. Each save writes a sibling
//! temp file first and then copies it over the canonical path, so the
//! canonical file is never observed half-written.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::error::CheckpointError;
use crate::model::{Component, InstallState};

/// Hidden folder under the destination holding session and backup files.
pub const SESSION_DIR: &str = ".modinstall";

/// Canonical session file name.
pub const SESSION_FILE: &str = "session.json";

/// Session schema version written by this build.
pub const SESSION_VERSION: u32 = 1;

/// Session folder for `destination`.
#[must_use]
pub fn session_dir(destination: &Path) -> PathBuf {
    destination.join(SESSION_DIR)
}

/// Progress of one instruction of a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionCheckpoint {
    /// Instruction id, kept for readability of the session file.
    pub instruction_id: String,
    /// Latest state.
    pub state: InstallState,
    /// When the instruction last completed.
    #[serde(default)]
    pub completed_utc: Option<DateTime<Utc>>,
}

/// Persisted record for one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentEntry {
    /// Latest component state.
    pub state: InstallState,
    /// One checkpoint per top-level instruction, in declaration order.
    #[serde(default)]
    pub instructions: Vec<InstructionCheckpoint>,
    /// First time the component entered `InProgress`.
    #[serde(default)]
    pub started_utc: Option<DateTime<Utc>>,
    /// When the component reached `Completed`.
    #[serde(default)]
    pub completed_utc: Option<DateTime<Utc>>,
}

impl ComponentEntry {
    fn fresh(component: &Component) -> Self {
        Self {
            state: component.state(),
            instructions: component
                .instructions
                .iter()
                .map(|i| InstructionCheckpoint {
                    instruction_id: i.id.clone(),
                    state: InstallState::Pending,
                    completed_utc: None,
                })
                .collect(),
            started_utc: None,
            completed_utc: None,
        }
    }

    /// Whether the instruction at `index` already completed.
    #[must_use]
    pub fn instruction_done(&self, index: usize) -> bool {
        self.instructions
            .get(index)
            .is_some_and(|c| c.state == InstallState::Completed)
    }
}

/// The full session record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Schema version.
    pub version: u32,
    /// Hex id derived from the destination and creation time.
    pub session_id: String,
    /// When the session was created.
    pub created_utc: DateTime<Utc>,
    /// Install destination.
    pub destination_path: PathBuf,
    /// Component ids in resolved install order.
    pub component_order: Vec<String>,
    /// Per-component progress.
    pub components: BTreeMap<String, ComponentEntry>,
    /// Where the pre-install snapshot is stored.
    pub backup_path: PathBuf,
    /// Incremented on every save.
    pub current_revision: u64,
}

/// On-disk shape, with the structural fields optional so a truncated or
/// hand-edited file is reported as invalid rather than as a parse error.
#[derive(Deserialize)]
struct StoredSession {
    version: Option<u32>,
    session_id: Option<String>,
    created_utc: Option<DateTime<Utc>>,
    destination_path: Option<PathBuf>,
    component_order: Option<Vec<String>>,
    components: Option<BTreeMap<String, ComponentEntry>>,
    backup_path: Option<PathBuf>,
    #[serde(default)]
    current_revision: u64,
}

impl Session {
    fn new(destination: &Path, components: &[Component]) -> Self {
        let created_utc = Utc::now();
        Self {
            version: SESSION_VERSION,
            session_id: session_id(destination, created_utc),
            created_utc,
            destination_path: destination.to_path_buf(),
            component_order: components.iter().map(|c| c.id.clone()).collect(),
            components: components
                .iter()
                .map(|c| (c.id.clone(), ComponentEntry::fresh(c)))
                .collect(),
            backup_path: session_dir(destination).join(crate::snapshot::BACKUP_FILE),
            current_revision: 0,
        }
    }

    fn parse(path: &Path, text: &str) -> Result<Self, CheckpointError> {
        let invalid = |reason: &str| CheckpointError::InvalidSession {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        let stored: StoredSession =
            serde_json::from_str(text).map_err(|e| invalid(&e.to_string()))?;

        let version = stored.version.ok_or_else(|| invalid("missing version"))?;
        if version > SESSION_VERSION {
            return Err(invalid(&format!("unsupported version {version}")));
        }
        let component_order = stored
            .component_order
            .ok_or_else(|| invalid("missing component_order"))?;
        let components = stored
            .components
            .ok_or_else(|| invalid("missing components"))?;
        let destination_path = stored
            .destination_path
            .ok_or_else(|| invalid("missing destination_path"))?;
        let created_utc = stored.created_utc.unwrap_or_else(Utc::now);

        Ok(Self {
            version,
            session_id: stored
                .session_id
                .unwrap_or_else(|| session_id(&destination_path, created_utc)),
            created_utc,
            backup_path: stored.backup_path.unwrap_or_else(|| {
                session_dir(&destination_path).join(crate::snapshot::BACKUP_FILE)
            }),
            destination_path,
            component_order,
            components,
            current_revision: stored.current_revision,
        })
    }
}

fn session_id(destination: &Path, created: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(destination.to_string_lossy().as_bytes());
    hasher.update(created.to_rfc3339().as_bytes());
    hasher
        .finalize()
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// How [`CheckpointManager::initialize`] obtained its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStart {
    /// No usable session existed; a fresh one was written.
    Fresh,
    /// An existing session was loaded and its states imported.
    Resumed,
}

#[derive(Debug)]
struct Active {
    path: PathBuf,
    session: Session,
}

/// Owner of the session record.
///
/// All access goes through one mutex, so saves and deletes never interleave.
#[derive(Debug)]
pub struct CheckpointManager {
    persist: bool,
    active: Mutex<Option<Active>>,
}

impl Default for CheckpointManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckpointManager {
    /// Manager that persists every change to disk.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            persist: true,
            active: Mutex::new(None),
        }
    }

    /// Manager that keeps the session in memory only, for dry runs.
    #[must_use]
    pub const fn ephemeral() -> Self {
        Self {
            persist: false,
            active: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Active>> {
        self.active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Load or create the session for `destination`.
    ///
    /// When a valid session exists its component states are copied onto
    /// `components`; components it does not know about are registered as
    /// fresh entries. Otherwise a new session capturing the components'
    /// current state is written immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the session folder cannot be created, an existing
    /// session file is structurally invalid, or the save fails.
    pub fn initialize(
        &self,
        components: &mut [Component],
        destination: &Path,
    ) -> Result<SessionStart, CheckpointError> {
        let dir = session_dir(destination);
        let path = dir.join(SESSION_FILE);
        if self.persist {
            std::fs::create_dir_all(&dir).map_err(|source| CheckpointError::Io {
                path: dir.clone(),
                source,
            })?;
        }

        let existing = if self.persist && path.is_file() {
            let text = std::fs::read_to_string(&path).map_err(|source| CheckpointError::Io {
                path: path.clone(),
                source,
            })?;
            Some(Session::parse(&path, &text)?)
        } else {
            None
        };

        let (session, start) = match existing {
            Some(mut session) => {
                for component in components.iter_mut() {
                    match session.components.get_mut(&component.id) {
                        Some(entry) => {
                            if entry.instructions.len() != component.instructions.len() {
                                tracing::warn!(
                                    "instruction list of '{}' changed since the session was saved, restarting it",
                                    component.id
                                );
                                *entry = ComponentEntry::fresh(component);
                            }
                            component.restore_state(entry.state);
                        }
                        None => {
                            tracing::debug!("registering new component '{}'", component.id);
                            session
                                .components
                                .insert(component.id.clone(), ComponentEntry::fresh(component));
                        }
                    }
                }
                tracing::info!(
                    "resuming session {} at revision {}",
                    session.session_id,
                    session.current_revision
                );
                (session, SessionStart::Resumed)
            }
            None => (Session::new(destination, components), SessionStart::Fresh),
        };

        let mut guard = self.lock();
        let active = guard.insert(Active { path, session });
        self.save_locked(active)?;
        Ok(start)
    }

    /// Persist the current record.
    ///
    /// # Errors
    ///
    /// Returns an error if the manager is uninitialized or writing fails.
    pub fn save(&self) -> Result<(), CheckpointError> {
        let mut guard = self.lock();
        let active = guard.as_mut().ok_or(CheckpointError::NotInitialized)?;
        self.save_locked(active)
    }

    fn save_locked(&self, active: &mut Active) -> Result<(), CheckpointError> {
        active.session.current_revision += 1;
        if !self.persist {
            return Ok(());
        }
        let json = serde_json::to_string_pretty(&active.session)?;
        let tmp = active.path.with_extension("json.tmp");
        let io = |path: &Path| {
            let path = path.to_path_buf();
            move |source| CheckpointError::Io { path, source }
        };
        std::fs::write(&tmp, json).map_err(io(&tmp))?;
        std::fs::copy(&tmp, &active.path).map_err(io(&active.path))?;
        std::fs::remove_file(&tmp).map_err(io(&tmp))?;
        tracing::debug!(
            "saved session revision {} to {}",
            active.session.current_revision,
            active.path.display()
        );
        Ok(())
    }

    /// Remove the session file after a fully successful run.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn delete_session(&self) -> Result<(), CheckpointError> {
        let guard = self.lock();
        let Some(active) = guard.as_ref() else {
            return Ok(());
        };
        if self.persist && active.path.exists() {
            std::fs::remove_file(&active.path).map_err(|source| CheckpointError::Io {
                path: active.path.clone(),
                source,
            })?;
            tracing::debug!("deleted session {}", active.path.display());
        }
        Ok(())
    }

    /// Copy of the persisted entry for `component_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::UnregisteredComponent`] for unknown ids.
    pub fn component_entry(&self, component_id: &str) -> Result<ComponentEntry, CheckpointError> {
        let guard = self.lock();
        let active = guard.as_ref().ok_or(CheckpointError::NotInitialized)?;
        active
            .session
            .components
            .get(component_id)
            .cloned()
            .ok_or_else(|| CheckpointError::UnregisteredComponent(component_id.to_string()))
    }

    /// Mirror `component`'s current state into the session and save.
    ///
    /// # Errors
    ///
    /// Returns an error for unregistered components or if saving fails.
    pub fn update_component_state(&self, component: &Component) -> Result<(), CheckpointError> {
        let mut guard = self.lock();
        let active = guard.as_mut().ok_or(CheckpointError::NotInitialized)?;
        let entry = active
            .session
            .components
            .get_mut(&component.id)
            .ok_or_else(|| CheckpointError::UnregisteredComponent(component.id.clone()))?;

        let state = component.state();
        entry.state = state;
        match state {
            InstallState::InProgress if entry.started_utc.is_none() => {
                entry.started_utc = Some(Utc::now());
            }
            InstallState::Completed => entry.completed_utc = Some(Utc::now()),
            InstallState::Pending => {
                for checkpoint in &mut entry.instructions {
                    checkpoint.state = InstallState::Pending;
                    checkpoint.completed_utc = None;
                }
            }
            _ => {}
        }
        self.save_locked(active)
    }

    /// Record the state of instruction `index` of `component_id` and save.
    ///
    /// # Errors
    ///
    /// Returns an error for unregistered components or indices, or if
    /// saving fails.
    pub fn record_instruction(
        &self,
        component_id: &str,
        index: usize,
        state: InstallState,
    ) -> Result<(), CheckpointError> {
        let mut guard = self.lock();
        let active = guard.as_mut().ok_or(CheckpointError::NotInitialized)?;
        let entry = active
            .session
            .components
            .get_mut(component_id)
            .ok_or_else(|| CheckpointError::UnregisteredComponent(component_id.to_string()))?;
        let checkpoint = entry.instructions.get_mut(index).ok_or_else(|| {
            CheckpointError::UnregisteredInstruction {
                component: component_id.to_string(),
                index,
            }
        })?;
        checkpoint.state = state;
        checkpoint.completed_utc = (state == InstallState::Completed).then(Utc::now);
        self.save_locked(active)
    }

    /// Replace the stored install order and save.
    ///
    /// # Errors
    ///
    /// Returns an error if the manager is uninitialized or saving fails.
    pub fn set_component_order(&self, order: &[String]) -> Result<(), CheckpointError> {
        let mut guard = self.lock();
        let active = guard.as_mut().ok_or(CheckpointError::NotInitialized)?;
        active.session.component_order = order.to_vec();
        self.save_locked(active)
    }

    /// Copy of the whole in-memory record.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::NotInitialized`] before `initialize`.
    pub fn session(&self) -> Result<Session, CheckpointError> {
        self.lock()
            .as_ref()
            .map(|a| a.session.clone())
            .ok_or(CheckpointError::NotInitialized)
    }

    /// Read the session stored for `destination` without taking ownership.
    ///
    /// Returns `Ok(None)` when no session file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn load(destination: &Path) -> Result<Option<Session>, CheckpointError> {
        let path = session_dir(destination).join(SESSION_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path).map_err(|source| CheckpointError::Io {
            path: path.clone(),
            source,
        })?;
        Session::parse(&path, &text).map(Some)
    }

    /// Remove the session stored for `destination`, if any.
    ///
    /// Returns `true` when a file was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn discard(destination: &Path) -> Result<bool, CheckpointError> {
        let path = session_dir(destination).join(SESSION_FILE);
        if !path.is_file() {
            return Ok(false);
        }
        std::fs::remove_file(&path).map_err(|source| CheckpointError::Io { path, source })?;
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::model::{Action, Instruction};

    fn components() -> Vec<Component> {
        let delete = |id: &str| {
            Instruction::new(
                id,
                Action::Delete {
                    sources: vec!["x".to_string()],
                    strict: false,
                },
            )
        };
        vec![
            Component::new("a", "A")
                .with_instruction(delete("a-1"))
                .with_instruction(delete("a-2")),
            Component::new("b", "B").with_dependencies(["a"]),
        ]
    }

    #[test]
    fn fresh_session_is_written_immediately() {
        let dest = tempfile::tempdir().unwrap();
        let mut comps = components();
        let manager = CheckpointManager::new();

        let start = manager.initialize(&mut comps, dest.path()).unwrap();
        assert_eq!(start, SessionStart::Fresh);

        let stored = CheckpointManager::load(dest.path()).unwrap().unwrap();
        assert_eq!(stored.component_order, vec!["a", "b"]);
        assert_eq!(stored.components["a"].instructions.len(), 2);
        assert_eq!(stored.current_revision, 1);
        assert_eq!(stored.session_id.len(), 16);
        assert!(!session_dir(dest.path()).join("session.json.tmp").exists());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dest = tempfile::tempdir().unwrap();
        let mut comps = components();
        let manager = CheckpointManager::new();
        manager.initialize(&mut comps, dest.path()).unwrap();

        comps[0].begin();
        manager.update_component_state(&comps[0]).unwrap();
        manager
            .record_instruction("a", 0, InstallState::Completed)
            .unwrap();
        manager
            .set_component_order(&["b".to_string(), "a".to_string()])
            .unwrap();

        let in_memory = manager.session().unwrap();
        let stored = CheckpointManager::load(dest.path()).unwrap().unwrap();
        assert_eq!(in_memory, stored);
        assert_eq!(stored.components["a"].state, InstallState::InProgress);
        assert!(stored.components["a"].started_utc.is_some());
        assert!(stored.components["a"].instruction_done(0));
        assert!(!stored.components["a"].instruction_done(1));
    }

    #[test]
    fn revision_increments_on_every_save() {
        let dest = tempfile::tempdir().unwrap();
        let mut comps = components();
        let manager = CheckpointManager::new();
        manager.initialize(&mut comps, dest.path()).unwrap();
        manager.save().unwrap();
        manager.save().unwrap();
        assert_eq!(manager.session().unwrap().current_revision, 3);
    }

    #[test]
    fn resume_imports_states_and_registers_new_components() {
        let dest = tempfile::tempdir().unwrap();
        {
            let mut comps = components();
            let manager = CheckpointManager::new();
            manager.initialize(&mut comps, dest.path()).unwrap();
            comps[0].complete();
            manager.update_component_state(&comps[0]).unwrap();
        }

        let mut comps = components();
        comps.push(Component::new("c", "C"));
        let manager = CheckpointManager::new();
        let start = manager.initialize(&mut comps, dest.path()).unwrap();

        assert_eq!(start, SessionStart::Resumed);
        assert_eq!(comps[0].state(), InstallState::Completed);
        assert_eq!(comps[1].state(), InstallState::Pending);
        assert!(manager.component_entry("c").is_ok());
    }

    #[test]
    fn invalid_session_is_rejected() {
        let dest = tempfile::tempdir().unwrap();
        let dir = session_dir(dest.path());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(SESSION_FILE),
            r#"{"version": 1, "destination_path": "/x", "component_order": null}"#,
        )
        .unwrap();

        let err = CheckpointManager::new()
            .initialize(&mut components(), dest.path())
            .unwrap_err();
        assert!(matches!(err, CheckpointError::InvalidSession { .. }));
    }

    #[test]
    fn unknown_component_is_a_programmer_error() {
        let dest = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new();
        manager.initialize(&mut components(), dest.path()).unwrap();

        let stranger = Component::new("zzz", "Z");
        assert!(matches!(
            manager.update_component_state(&stranger),
            Err(CheckpointError::UnregisteredComponent(id)) if id == "zzz"
        ));
        assert!(matches!(
            manager.record_instruction("a", 9, InstallState::Completed),
            Err(CheckpointError::UnregisteredInstruction { index: 9, .. })
        ));
    }

    #[test]
    fn use_before_initialize_fails() {
        assert!(matches!(
            CheckpointManager::new().save(),
            Err(CheckpointError::NotInitialized)
        ));
    }

    #[test]
    fn delete_session_removes_file() {
        let dest = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new();
        manager.initialize(&mut components(), dest.path()).unwrap();
        manager.delete_session().unwrap();
        assert!(CheckpointManager::load(dest.path()).unwrap().is_none());
    }

    #[test]
    fn ephemeral_manager_never_touches_disk() {
        let dest = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::ephemeral();
        manager.initialize(&mut components(), dest.path()).unwrap();
        manager.save().unwrap();
        assert!(!session_dir(dest.path()).exists());
    }

    #[test]
    fn discard_removes_stored_session_once() {
        let dest = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new();
        manager.initialize(&mut components(), dest.path()).unwrap();
        assert!(CheckpointManager::discard(dest.path()).unwrap());
        assert!(!CheckpointManager::discard(dest.path()).unwrap());
    }
}
