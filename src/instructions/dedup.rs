use std::collections::HashMap;
use std::path::PathBuf;

use super::{ExitCode, InstructionExecutor};
use crate::provider::helpers::dotted_extension;

/// Lower-case `ext` and give it a leading dot.
fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_ascii_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}

impl InstructionExecutor {
    /// Delete files sharing a base name with another compatible file,
    /// keeping the preferred extension.
    ///
    /// A base name that occurs only once is left alone even when its
    /// extension is not the preferred one.
    pub(super) fn delete_duplicates(
        &self,
        directory: &str,
        compatible: &[String],
        preferred: &str,
    ) -> ExitCode {
        if preferred.trim().is_empty() {
            self.ctx
                .log
                .error("del_duplicate requires a preferred extension");
            return ExitCode::InvalidArguments;
        }
        let dir = match self.existing_directory(directory) {
            Ok(dir) => dir,
            Err(code) => return code,
        };
        let compatible: Vec<String> = if compatible.is_empty() {
            self.ctx.config.dedup_extensions.clone()
        } else {
            compatible.to_vec()
        }
        .iter()
        .map(|e| normalize_extension(e))
        .collect();
        let preferred = normalize_extension(preferred);

        let files = match self.fs().files_in_dir(&dir, false) {
            Ok(files) => files,
            Err(e) => {
                self.ctx.log.error(&format!("{e:#}"));
                return ExitCode::InvalidDestination;
            }
        };

        let candidates: Vec<(PathBuf, String, String)> = files
            .into_iter()
            .filter_map(|path| {
                let ext = dotted_extension(&path)?;
                if !compatible.contains(&ext) {
                    return None;
                }
                let stem = path.file_stem()?.to_string_lossy().to_ascii_lowercase();
                Some((path, stem, ext))
            })
            .collect();

        let mut occurrences: HashMap<&str, usize> = HashMap::new();
        for (_, stem, _) in &candidates {
            *occurrences.entry(stem.as_str()).or_default() += 1;
        }

        let mut deleted = 0usize;
        for (path, stem, ext) in &candidates {
            if *ext == preferred || occurrences.get(stem.as_str()).copied().unwrap_or(0) < 2 {
                continue;
            }
            if self.ctx.cancel.is_cancelled() {
                return ExitCode::Cancelled;
            }
            if let Err(e) = self.fs().delete_file(path) {
                self.ctx.log.error(&format!("{e:#}"));
                return ExitCode::UnknownError;
            }
            self.ctx
                .log
                .debug(&format!("deleted duplicate {}", path.display()));
            deleted += 1;
        }
        self.ctx.log.info(&format!(
            "removed {deleted} duplicate(s) in {} keeping {preferred}",
            dir.display()
        ));
        ExitCode::Success
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::super::tests::{Fixture, run};
    use super::*;
    use crate::model::Action;

    fn dedup(extensions: &[&str], preferred: &str) -> Action {
        Action::DelDuplicate {
            directory: "<<kotorDirectory>>/Override".to_string(),
            compatible_extensions: extensions.iter().map(ToString::to_string).collect(),
            preferred_extension: preferred.to_string(),
        }
    }

    #[test]
    fn keeps_preferred_and_lone_files() {
        let fx = Fixture::new();
        let o = fx.game().join("Override");
        fx.write(&o.join("a.tpc"), "");
        fx.write(&o.join("a.tga"), "");
        fx.write(&o.join("b.tga"), "");
        fx.write(&o.join("a.txt"), "");

        let code = run(&fx.executor(), dedup(&[".tpc", ".tga"], ".tpc"));

        assert_eq!(code, ExitCode::Success);
        assert!(o.join("a.tpc").exists());
        assert!(!o.join("a.tga").exists());
        assert!(o.join("b.tga").exists());
        assert!(o.join("a.txt").exists());
    }

    #[test]
    fn extensions_match_without_case_or_dot() {
        let fx = Fixture::new();
        let o = fx.game().join("Override");
        fx.write(&o.join("Tex.TPC"), "");
        fx.write(&o.join("tex.Dds"), "");

        let code = run(&fx.executor(), dedup(&["tpc", "DDS"], "TPC"));

        assert_eq!(code, ExitCode::Success);
        assert!(o.join("Tex.TPC").exists());
        assert!(!o.join("tex.Dds").exists());
    }

    #[test]
    fn empty_extension_list_uses_configured_default() {
        let fx = Fixture::new();
        let o = fx.game().join("Override");
        fx.write(&o.join("a.dds"), "");
        fx.write(&o.join("a.tga"), "");

        let code = run(&fx.executor(), dedup(&[], ".dds"));

        assert_eq!(code, ExitCode::Success);
        assert!(o.join("a.dds").exists());
        assert!(!o.join("a.tga").exists());
    }

    #[test]
    fn missing_directory_is_invalid_destination() {
        let fx = Fixture::new();
        let code = run(&fx.executor(), dedup(&[".tga"], ".tpc"));
        assert_eq!(code, ExitCode::InvalidDestination);
    }
}
