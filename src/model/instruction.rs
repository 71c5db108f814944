//! Declarative instructions and the closed set of actions they perform.
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// One operation, carrying exactly the fields that operation uses.
///
/// Path strings may contain the `<<modDirectory>>` and `<<kotorDirectory>>`
/// placeholders and the `*`/`?` wildcards; they are resolved immediately
/// before execution.
///
/// # Examples
///
/// ```
/// use mod_installer::model::Action;
///
/// let action: Action = toml::from_str(
///     "action = \"delete\"\nsources = [\"<<kotorDirectory>>/Override/a.tga\"]\nstrict = true\n",
/// ).unwrap();
/// assert!(matches!(action, Action::Delete { strict: true, .. }));
/// assert_eq!(action.kind(), "delete");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Extract archives into `destination` (default: each archive's folder).
    Extract {
        /// Archive paths.
        sources: Vec<String>,
        /// Target directory.
        #[serde(default)]
        destination: Option<String>,
    },
    /// Run an arbitrary program once per resolved source.
    #[serde(alias = "run")]
    Execute {
        /// Programs to run.
        sources: Vec<String>,
        /// Argument string; placeholders are substituted, then split on whitespace.
        #[serde(default)]
        arguments: String,
    },
    /// Run the external patcher against a `tslpatchdata` folder.
    Patcher {
        /// Mod folder or `tslpatchdata` folder.
        source: String,
        /// Game directory to patch.
        destination: String,
        /// Optional namespace option index.
        #[serde(default)]
        arguments: String,
    },
    /// Move files into a directory.
    Move {
        /// Files to move.
        sources: Vec<String>,
        /// Target directory.
        destination: String,
        /// Replace an existing file at the destination.
        #[serde(default = "default_true")]
        overwrite: bool,
    },
    /// Copy files into a directory.
    Copy {
        /// Files to copy.
        sources: Vec<String>,
        /// Target directory.
        destination: String,
        /// Replace an existing file at the destination.
        #[serde(default = "default_true")]
        overwrite: bool,
    },
    /// Rename files in place.
    Rename {
        /// Files to rename.
        sources: Vec<String>,
        /// New file name (not a directory).
        destination: String,
        /// Replace an existing file with the new name.
        #[serde(default = "default_true")]
        overwrite: bool,
    },
    /// Delete files.
    Delete {
        /// Files to delete.
        sources: Vec<String>,
        /// Treat a missing file as a failure instead of a skip.
        ///
        /// Older component files expressed this through `overwrite`.
        #[serde(default, alias = "overwrite")]
        strict: bool,
    },
    /// Delete same-named duplicates whose extension is not preferred.
    DelDuplicate {
        /// Directory to scan.
        directory: String,
        /// Priority-ordered compatible extensions; empty means the configured default.
        #[serde(default)]
        compatible_extensions: Vec<String>,
        /// Extension to keep.
        preferred_extension: String,
    },
    /// Install the instructions of the selected options.
    Choose {
        /// Candidate option ids.
        options: Vec<String>,
    },
    /// Delete files listed per mod in a clean-list file.
    CleanList {
        /// Path to the clean-list file.
        list_file: String,
        /// Directory the listed files are deleted from.
        destination: String,
    },
}

const fn default_true() -> bool {
    true
}

impl Action {
    /// Short, stable name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Extract { .. } => "extract",
            Self::Execute { .. } => "execute",
            Self::Patcher { .. } => "patcher",
            Self::Move { .. } => "move",
            Self::Copy { .. } => "copy",
            Self::Rename { .. } => "rename",
            Self::Delete { .. } => "delete",
            Self::DelDuplicate { .. } => "del_duplicate",
            Self::Choose { .. } => "choose",
            Self::CleanList { .. } => "clean_list",
        }
    }
}

/// One declarative action belonging to a component or option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// Stable id, used in checkpoints and logs.
    #[serde(default)]
    pub id: String,
    /// What to do.
    #[serde(flatten)]
    pub action: Action,
    /// Component/option ids that must all be selected for this to run.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Component/option ids that must all be unselected for this to run.
    #[serde(default)]
    pub restrictions: Vec<String>,
}

impl Instruction {
    /// Create an unconditional instruction.
    #[must_use]
    pub fn new(id: impl Into<String>, action: Action) -> Self {
        Self {
            id: id.into(),
            action,
            dependencies: Vec::new(),
            restrictions: Vec::new(),
        }
    }

    /// Require the given ids to be selected.
    #[must_use]
    pub fn with_dependencies<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Require the given ids to be unselected.
    #[must_use]
    pub fn with_restrictions<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.restrictions.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Whether the selection satisfies this instruction's gating lists.
    #[must_use]
    pub fn is_applicable(&self, selected: &HashSet<String>) -> bool {
        self.dependencies.iter().all(|d| selected.contains(d))
            && !self.restrictions.iter().any(|r| selected.contains(r))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Instruction {
        toml::from_str(src).expect("instruction should parse")
    }

    #[test]
    fn move_defaults_to_overwrite() {
        let i = parse("id = \"i1\"\naction = \"move\"\nsources = [\"a\"]\ndestination = \"d\"\n");
        assert_eq!(
            i.action,
            Action::Move {
                sources: vec!["a".to_string()],
                destination: "d".to_string(),
                overwrite: true,
            }
        );
    }

    #[test]
    fn run_is_an_alias_for_execute() {
        let i = parse("action = \"run\"\nsources = [\"setup.exe\"]\n");
        assert!(matches!(i.action, Action::Execute { .. }));
    }

    // Delete used to overload `overwrite` as "fail when missing"; the alias
    // keeps those files loading while the model carries an explicit flag.
    #[test]
    fn delete_accepts_legacy_overwrite_as_strict() {
        let i = parse("action = \"delete\"\nsources = [\"a\"]\noverwrite = true\n");
        assert_eq!(
            i.action,
            Action::Delete {
                sources: vec!["a".to_string()],
                strict: true,
            }
        );
    }

    #[test]
    fn delete_is_lenient_by_default() {
        let i = parse("action = \"delete\"\nsources = [\"a\"]\n");
        assert!(matches!(i.action, Action::Delete { strict: false, .. }));
    }

    #[test]
    fn applicability_honours_dependencies_and_restrictions() {
        let selected: HashSet<String> = ["a", "opt"].iter().map(ToString::to_string).collect();
        let base = Instruction::new(
            "i",
            Action::Choose {
                options: vec![],
            },
        );
        assert!(base.clone().with_dependencies(["a"]).is_applicable(&selected));
        assert!(!base.clone().with_dependencies(["a", "b"]).is_applicable(&selected));
        assert!(!base.clone().with_restrictions(["opt"]).is_applicable(&selected));
        assert!(base.with_restrictions(["zzz"]).is_applicable(&selected));
    }

    #[test]
    fn kind_names_are_snake_case() {
        let a = Action::DelDuplicate {
            directory: "d".to_string(),
            compatible_extensions: vec![],
            preferred_extension: ".tpc".to_string(),
        };
        assert_eq!(a.kind(), "del_duplicate");
    }
}
