//! Clean lists: per-mod files to delete from the destination.
//!
//! Each non-blank line is `Mod Name,file1,file2,...`. Lines for
//! `Mandatory Deletions` always apply; other lines apply when the mod name
//! matches a selected component.

use super::{ExitCode, InstructionExecutor};

const MANDATORY: &str = "Mandatory Deletions";

/// One line of a clean list.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CleanEntry {
    mod_name: String,
    files: Vec<String>,
}

fn parse_clean_list(text: &str) -> Vec<CleanEntry> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|line| {
            let mut parts = line.split(',').map(str::trim);
            let mod_name = parts.next()?.to_string();
            let files = parts.filter(|f| !f.is_empty()).map(String::from).collect();
            Some(CleanEntry { mod_name, files })
        })
        .collect()
}

/// Case-insensitive exact match, or either name containing the other.
fn names_match(list_name: &str, component_name: &str) -> bool {
    let a = list_name.to_lowercase();
    let b = component_name.to_lowercase();
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a == b || a.contains(&b) || b.contains(&a)
}

impl CleanEntry {
    fn applies(&self, selected_names: &[String]) -> bool {
        self.mod_name.eq_ignore_ascii_case(MANDATORY)
            || selected_names.iter().any(|n| names_match(&self.mod_name, n))
    }
}

impl InstructionExecutor {
    pub(super) fn clean_list(
        &self,
        list_file: &str,
        destination: &str,
        selected_names: &[String],
    ) -> ExitCode {
        let fs = self.fs();
        let list_path = self.resolve_path(list_file);
        if !fs.file_exists(&list_path) {
            self.ctx
                .log
                .error(&format!("clean list not found: {}", list_path.display()));
            return ExitCode::InvalidSourcePath;
        }
        let dest = match self.existing_directory(destination) {
            Ok(dir) => dir,
            Err(code) => return code,
        };
        let text = match fs.read_file(&list_path) {
            Ok(text) => text,
            Err(e) => {
                self.ctx.log.error(&format!("{e:#}"));
                return ExitCode::InvalidSourcePath;
            }
        };

        let mut deleted = 0usize;
        for entry in parse_clean_list(&text)
            .iter()
            .filter(|e| e.applies(selected_names))
        {
            self.ctx
                .log
                .debug(&format!("applying clean list entry '{}'", entry.mod_name));
            for name in &entry.files {
                if self.ctx.cancel.is_cancelled() {
                    return ExitCode::Cancelled;
                }
                let target = if self.ctx.config.case_insensitive_paths {
                    super::paths::fix_case(fs, &dest.join(name))
                } else {
                    dest.join(name)
                };
                if !fs.file_exists(&target) {
                    self.ctx
                        .log
                        .debug(&format!("not present, skipping {}", target.display()));
                    continue;
                }
                if let Err(e) = fs.delete_file(&target) {
                    self.ctx.log.error(&format!("{e:#}"));
                    return ExitCode::UnknownError;
                }
                deleted += 1;
            }
        }
        self.ctx
            .log
            .info(&format!("clean list removed {deleted} file(s)"));
        ExitCode::Success
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::super::tests::Fixture;
    use super::*;
    use crate::model::{Action, Instruction};

    #[test]
    fn parses_lines_and_skips_blanks() {
        let entries = parse_clean_list("A Mod, a.tga ,b.tga,\n\n# note\nOther\n");
        assert_eq!(
            entries,
            vec![
                CleanEntry {
                    mod_name: "A Mod".to_string(),
                    files: vec!["a.tga".to_string(), "b.tga".to_string()],
                },
                CleanEntry {
                    mod_name: "Other".to_string(),
                    files: vec![],
                },
            ]
        );
    }

    #[test]
    fn name_matching_is_case_insensitive_and_substring_both_ways() {
        assert!(names_match("hd textures", "HD Textures"));
        assert!(names_match("HD Textures v2", "HD Textures"));
        assert!(names_match("HD", "HD Textures"));
        assert!(!names_match("Sounds", "HD Textures"));
        assert!(!names_match("", "HD Textures"));
    }

    #[test]
    fn deletes_for_selected_and_mandatory_only() {
        let fx = Fixture::new();
        let o = fx.game().join("Override");
        for f in ["a.tga", "b.tga", "c.tga"] {
            fx.write(&o.join(f), "");
        }
        fx.write(
            &fx.mods().join("cleanlist.txt"),
            "Mandatory Deletions,a.tga\nHD Textures,b.tga,missing.tga\nUnselected Mod,c.tga\n",
        );

        let code = fx.executor().execute(
            &Instruction::new(
                "clean",
                Action::CleanList {
                    list_file: "<<modDirectory>>/cleanlist.txt".to_string(),
                    destination: "<<kotorDirectory>>/Override".to_string(),
                },
            ),
            &["HD Textures".to_string()],
        );

        assert_eq!(code, ExitCode::Success);
        assert!(!o.join("a.tga").exists());
        assert!(!o.join("b.tga").exists());
        assert!(o.join("c.tga").exists());
    }

    #[test]
    fn missing_list_is_invalid_source() {
        let fx = Fixture::new();
        let code = fx.executor().execute(
            &Instruction::new(
                "clean",
                Action::CleanList {
                    list_file: "<<modDirectory>>/none.txt".to_string(),
                    destination: "<<kotorDirectory>>".to_string(),
                },
            ),
            &[],
        );
        assert_eq!(code, ExitCode::InvalidSourcePath);
    }
}
