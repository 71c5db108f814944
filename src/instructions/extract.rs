use std::path::PathBuf;

use super::{ExitCode, InstructionExecutor};

impl InstructionExecutor {
    pub(super) fn extract(&self, sources: &[String], destination: Option<&str>) -> ExitCode {
        let archives = match self.resolve_sources(sources, true) {
            Ok(archives) => archives,
            Err(code) => return code,
        };
        let explicit_dest = match destination.filter(|d| !d.trim().is_empty()) {
            Some(raw) => match self.ensure_destination(raw) {
                Ok(dir) => Some(dir),
                Err(code) => return code,
            },
            None => None,
        };

        for archive in &archives {
            if self.ctx.cancel.is_cancelled() {
                return ExitCode::Cancelled;
            }
            let dest = explicit_dest.clone().unwrap_or_else(|| {
                archive
                    .parent()
                    .map_or_else(|| PathBuf::from("."), PathBuf::from)
            });
            match self.fs().extract_archive(archive, &dest) {
                Ok(files) => self.ctx.log.info(&format!(
                    "extracted {} file(s) from {} into {}",
                    files.len(),
                    archive.display(),
                    dest.display()
                )),
                Err(e) => {
                    self.ctx.log.error(&format!("{e:#}"));
                    return ExitCode::InvalidArchive;
                }
            }
        }
        ExitCode::Success
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::super::tests::{Fixture, run};
    use super::*;
    use crate::model::Action;
    use crate::provider::FileSystemProvider as _;
    use crate::provider::archive::tests::write_zip;

    #[test]
    fn extracts_next_to_archive_by_default() {
        let fx = Fixture::new();
        let archive = fx.mods().join("pack.zip");
        write_zip(&archive, &[("pack/Override/a.tga", "A")]);

        let code = run(
            &fx.executor(),
            Action::Extract {
                sources: vec!["<<modDirectory>>/*.zip".to_string()],
                destination: None,
            },
        );

        assert_eq!(code, ExitCode::Success);
        assert!(fx.mods().join("pack/Override/a.tga").is_file());
        assert!(fx.log.contains("info", "extracted 1 file(s)"));
    }

    #[test]
    fn extracts_into_explicit_destination() {
        let fx = Fixture::new();
        write_zip(&fx.mods().join("pack.zip"), &[("a.tga", "A")]);

        let code = run(
            &fx.executor(),
            Action::Extract {
                sources: vec!["<<modDirectory>>/pack.zip".to_string()],
                destination: Some("<<modDirectory>>/unpacked".to_string()),
            },
        );

        assert_eq!(code, ExitCode::Success);
        assert!(fx.mods().join("unpacked/a.tga").is_file());
    }

    #[test]
    fn corrupt_archive_is_invalid() {
        let fx = Fixture::new();
        fx.write(&fx.mods().join("pack.7z"), "not really an archive");

        let code = run(
            &fx.executor(),
            Action::Extract {
                sources: vec!["<<modDirectory>>/pack.7z".to_string()],
                destination: None,
            },
        );

        assert_eq!(code, ExitCode::InvalidArchive);
    }

    #[test]
    fn dry_run_lists_entries_without_writing() {
        let fx = Fixture::new();
        write_zip(&fx.mods().join("pack.zip"), &[("a.tga", "A")]);
        let (executor, fs) = fx.dry_run_executor();

        let code = run(
            &executor,
            Action::Extract {
                sources: vec!["<<modDirectory>>/pack.zip".to_string()],
                destination: None,
            },
        );

        assert_eq!(code, ExitCode::Success);
        assert!(!fx.mods().join("a.tga").exists());
        assert!(fs.file_exists(&fx.mods().join("a.tga")));
    }
}
