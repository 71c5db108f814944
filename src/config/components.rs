//! Component definitions loaded from TOML.
//!
//! ```toml
//! [[component]]
//! id = "hd-textures"
//! name = "HD Textures"
//! dependencies = ["base-fixes"]
//!
//! [[component.instruction]]
//! action = "extract"
//! sources = ["<<modDirectory>>/hd-textures.7z"]
//!
//! [[component.option]]
//! id = "hd-textures-2k"
//! name = "2K variant"
//! ```
use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::model::Component;

#[derive(Deserialize)]
struct ComponentFile {
    #[serde(rename = "component", default)]
    components: Vec<Component>,
}

/// Load components from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, does not parse, or defines
/// the same component id twice.
pub fn load(path: &Path) -> Result<Vec<Component>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse(&content, &path.display().to_string())
}

/// Parse components from TOML text; `file` is only used in error messages.
///
/// Instructions without an explicit id are given `<component>-<n>` (or
/// `<option>-<n>`), counting from 1.
///
/// # Errors
///
/// Returns an error if the text does not parse or repeats a component id.
pub fn parse(content: &str, file: &str) -> Result<Vec<Component>, ConfigError> {
    let parsed: ComponentFile =
        toml::from_str(content).map_err(|e| ConfigError::InvalidSyntax {
            file: file.to_string(),
            message: e.message().to_string(),
        })?;

    let mut seen = HashSet::new();
    let mut components = parsed.components;
    for component in &mut components {
        if !seen.insert(component.id.clone()) {
            return Err(ConfigError::DuplicateComponent(component.id.clone()));
        }
        fill_ids(&component.id, &mut component.instructions);
        for option in &mut component.options {
            fill_ids(&option.id, &mut option.instructions);
        }
    }
    Ok(components)
}

fn fill_ids(owner: &str, instructions: &mut [crate::model::Instruction]) {
    for (n, instruction) in instructions.iter_mut().enumerate() {
        if instruction.id.is_empty() {
            instruction.id = format!("{owner}-{}", n + 1);
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::model::{Action, InstallState};

    const SAMPLE: &str = r#"
[[component]]
id = "base"
name = "Base Fixes"

[[component.instruction]]
action = "copy"
sources = ["<<modDirectory>>/base/*.2da"]
destination = "<<kotorDirectory>>/Override"
overwrite = false

[[component]]
id = "hd"
name = "HD Textures"
dependencies = ["base"]
is_selected = false

[[component.instruction]]
id = "hd-choose"
action = "choose"
options = ["hd-2k", "hd-4k"]

[[component.option]]
id = "hd-2k"
name = "2K"
is_selected = true

[[component.option.instruction]]
action = "move"
sources = ["<<modDirectory>>/2k/*"]
destination = "<<kotorDirectory>>/Override"
"#;

    #[test]
    fn parses_components_options_and_instructions() {
        let components = parse(SAMPLE, "mods.toml").unwrap();
        assert_eq!(components.len(), 2);

        let base = &components[0];
        assert!(base.is_selected);
        assert_eq!(base.state(), InstallState::Pending);
        assert_eq!(base.instructions[0].id, "base-1");
        assert!(matches!(
            base.instructions[0].action,
            Action::Copy {
                overwrite: false,
                ..
            }
        ));

        let hd = &components[1];
        assert!(!hd.is_selected);
        assert_eq!(hd.dependencies, vec!["base"]);
        assert_eq!(hd.instructions[0].id, "hd-choose");
        assert_eq!(hd.options[0].instructions[0].id, "hd-2k-1");
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let src = "[[component]]\nid = \"a\"\nname = \"A\"\n[[component]]\nid = \"a\"\nname = \"B\"\n";
        assert!(matches!(
            parse(src, "dup.toml"),
            Err(ConfigError::DuplicateComponent(id)) if id == "a"
        ));
    }

    #[test]
    fn unknown_action_is_a_syntax_error() {
        let src = "[[component]]\nid = \"a\"\nname = \"A\"\n[[component.instruction]]\naction = \"teleport\"\n";
        let err = parse(src, "bad.toml").unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn empty_file_has_no_components() {
        assert!(parse("", "empty.toml").unwrap().is_empty());
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
