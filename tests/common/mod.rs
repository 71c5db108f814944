// Shared helpers for integration tests.
//
// Provides a temporary mod workspace and game directory plus a fluent
// builder, so each integration test can set up an isolated install without
// repeating filesystem boilerplate.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;

use mod_installer::cancel::CancellationToken;
use mod_installer::config::InstallConfig;
use mod_installer::config::components;
use mod_installer::context::InstallContext;
use mod_installer::coordinator::{InstallCoordinator, InstallEvent, InstallSummary};
use mod_installer::dialog::AutoDialog;
use mod_installer::error::InstallerError;
use mod_installer::exec::SystemExecutor;
use mod_installer::logging::Logger;
use mod_installer::model::Component;

/// Result of one coordinator run.
pub struct Run {
    pub summary: Result<InstallSummary, InstallerError>,
    pub components: Vec<Component>,
    pub events: Vec<InstallEvent>,
}

/// A mod workspace (`mods/`) and a game directory (`game/`) backed by a
/// [`tempfile::TempDir`].
///
/// Both are automatically deleted when dropped.
pub struct IntegrationTestContext {
    pub root: tempfile::TempDir,
    pub components: String,
}

impl IntegrationTestContext {
    pub fn mods(&self) -> PathBuf {
        self.root.path().join("mods")
    }

    pub fn game(&self) -> PathBuf {
        self.root.path().join("game")
    }

    /// Settings pointing at this context, with sequential I/O.
    pub fn config(&self) -> InstallConfig {
        InstallConfig {
            source_path: self.mods(),
            destination_path: self.game(),
            multithreaded_io: false,
            ..InstallConfig::default()
        }
    }

    /// Parse the component file written by the builder.
    pub fn load_components(&self) -> Vec<Component> {
        components::parse(&self.components, "components.toml").expect("parse components")
    }

    /// Install the builder's components with `config`.
    pub fn install_with(&self, config: InstallConfig) -> Run {
        let mut components = self.load_components();
        let (tx, rx) = mpsc::channel();
        let ctx = InstallContext::from_config(
            config,
            Arc::new(Logger::new("test")),
            Arc::new(SystemExecutor),
            CancellationToken::new(),
        );
        let coordinator = InstallCoordinator::new(ctx, Arc::new(AutoDialog))
            .expect("create coordinator")
            .with_events(tx);
        let summary = coordinator.install(&mut components);
        drop(coordinator);
        Run {
            summary,
            components,
            events: rx.try_iter().collect(),
        }
    }

    pub fn install(&self) -> Run {
        self.install_with(self.config())
    }

    /// Write `content` to `path`, creating parent directories.
    pub fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dir");
        }
        std::fs::write(path, content).expect("write file");
    }

    /// Relative paths of every file under `dir`, sorted, with `/` separators.
    pub fn files_under(dir: &Path) -> Vec<String> {
        let mut files: Vec<String> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                e.path()
                    .strip_prefix(dir)
                    .ok()
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
            })
            .collect();
        files.sort();
        files
    }
}

/// Fluent builder for [`IntegrationTestContext`].
pub struct TestContextBuilder {
    ctx: IntegrationTestContext,
}

impl TestContextBuilder {
    /// Begin building with empty `mods/` and `game/` directories.
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("create temp dir");
        std::fs::create_dir_all(root.path().join("mods")).expect("create mods dir");
        std::fs::create_dir_all(root.path().join("game")).expect("create game dir");
        Self {
            ctx: IntegrationTestContext {
                root,
                components: String::new(),
            },
        }
    }

    /// Write a file into the mod workspace.
    pub fn with_mod_file(self, rel: &str, content: &str) -> Self {
        IntegrationTestContext::write(&self.ctx.mods().join(rel), content);
        self
    }

    /// Write a file into the game directory.
    pub fn with_game_file(self, rel: &str, content: &str) -> Self {
        IntegrationTestContext::write(&self.ctx.game().join(rel), content);
        self
    }

    /// Write a zip archive into the mod workspace.
    pub fn with_mod_zip(self, rel: &str, entries: &[(&str, &str)]) -> Self {
        let path = self.ctx.mods().join(rel);
        let file = std::fs::File::create(&path).expect("create archive");
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, contents) in entries {
            writer.start_file(*name, options).expect("start zip entry");
            writer
                .write_all(contents.as_bytes())
                .expect("write zip entry");
        }
        writer.finish().expect("finish archive");
        self
    }

    /// Component definitions in the TOML component-file format.
    pub fn with_components(mut self, toml: &str) -> Self {
        toml.clone_into(&mut self.ctx.components);
        self
    }

    /// Finish building and return the configured context.
    pub fn build(self) -> IntegrationTestContext {
        self.ctx
    }
}
