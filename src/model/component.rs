//! Installable components, their options, and install state transitions.
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::instruction::Instruction;

/// Progress of a single component within an install session.
///
/// # Examples
///
/// ```
/// use mod_installer::model::InstallState;
///
/// assert_eq!(InstallState::default(), InstallState::Pending);
/// assert!(InstallState::Completed.is_settled());
/// assert!(!InstallState::InProgress.is_settled());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstallState {
    /// Not yet attempted in this session.
    #[default]
    Pending,
    /// Started; some instructions may already be complete.
    InProgress,
    /// Every instruction succeeded.
    Completed,
    /// An instruction failed.
    Failed,
    /// An ancestor failed, so this component is skipped for the run.
    Blocked,
}

impl InstallState {
    /// Whether the state is final for the current run.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Blocked)
    }
}

impl std::fmt::Display for InstallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
        };
        f.write_str(s)
    }
}

/// An optional sub-unit of a component with its own instructions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentOption {
    /// Stable unique id, referenced by `Choose` instructions.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Whether the user selected this option.
    #[serde(default)]
    pub is_selected: bool,
    /// Instructions executed when the option is chosen.
    #[serde(rename = "instruction", default)]
    pub instructions: Vec<Instruction>,
}

/// A named, independently installable unit.
///
/// The three edge families drive ordering: `dependencies` also gate
/// execution (they must have completed first), while `install_after` and
/// `install_before` are soft ordering hints only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    /// Stable unique id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Whether the user selected this component for installation.
    #[serde(default = "default_true")]
    pub is_selected: bool,
    /// Ordered instructions.
    #[serde(rename = "instruction", default)]
    pub instructions: Vec<Instruction>,
    /// Optional sub-units.
    #[serde(rename = "option", default)]
    pub options: Vec<ComponentOption>,
    /// Components that must complete successfully before this one starts.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Components this one should be installed after (ordering only).
    #[serde(default)]
    pub install_after: Vec<String>,
    /// Components this one should be installed before (ordering only).
    #[serde(default)]
    pub install_before: Vec<String>,
    #[serde(skip)]
    state: InstallState,
}

const fn default_true() -> bool {
    true
}

impl Component {
    /// Create a selected component with no instructions or edges.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_selected: true,
            instructions: Vec::new(),
            options: Vec::new(),
            dependencies: Vec::new(),
            install_after: Vec::new(),
            install_before: Vec::new(),
            state: InstallState::Pending,
        }
    }

    /// Add hard dependencies.
    #[must_use]
    pub fn with_dependencies<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Add soft "install after" edges.
    #[must_use]
    pub fn with_install_after<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.install_after.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Add soft "install before" edges.
    #[must_use]
    pub fn with_install_before<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.install_before.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Append an instruction.
    #[must_use]
    pub fn with_instruction(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }

    /// Append an option.
    #[must_use]
    pub fn with_option(mut self, option: ComponentOption) -> Self {
        self.options.push(option);
        self
    }

    /// Current install state.
    #[must_use]
    pub const fn state(&self) -> InstallState {
        self.state
    }

    /// Overwrite the state with a value imported from a persisted session.
    pub const fn restore_state(&mut self, state: InstallState) {
        self.state = state;
    }

    /// `Pending`/`InProgress` → `InProgress`.
    pub const fn begin(&mut self) -> InstallState {
        self.state = InstallState::InProgress;
        self.state
    }

    /// Mark every instruction as done.
    pub const fn complete(&mut self) -> InstallState {
        self.state = InstallState::Completed;
        self.state
    }

    /// Mark the component as failed.
    pub const fn fail(&mut self) -> InstallState {
        self.state = InstallState::Failed;
        self.state
    }

    /// `Pending` → `Blocked`. Any other state is left alone and `None` is
    /// returned.
    pub const fn block(&mut self) -> Option<InstallState> {
        if matches!(self.state, InstallState::Pending) {
            self.state = InstallState::Blocked;
            Some(self.state)
        } else {
            None
        }
    }

    /// `Failed`/`Blocked` → `Pending` so a resumed run retries them.
    pub const fn reset_for_retry(&mut self) -> Option<InstallState> {
        if matches!(self.state, InstallState::Failed | InstallState::Blocked) {
            self.state = InstallState::Pending;
            Some(self.state)
        } else {
            None
        }
    }

    /// Look up an option by id.
    #[must_use]
    pub fn option(&self, id: &str) -> Option<&ComponentOption> {
        self.options.iter().find(|o| o.id == id)
    }
}

/// Ids of every selected component and selected option.
///
/// Instruction dependency/restriction lists are evaluated against this set.
#[must_use]
pub fn selected_ids(components: &[Component]) -> HashSet<String> {
    components
        .iter()
        .filter(|c| c.is_selected)
        .flat_map(|c| {
            std::iter::once(c.id.clone()).chain(
                c.options
                    .iter()
                    .filter(|o| o.is_selected)
                    .map(|o| o.id.clone()),
            )
        })
        .collect()
}
