//! Running the external patcher against a `tslpatchdata` folder.
//!
//! The patcher itself is a black box. Before it runs, every ini under
//! `tslpatchdata` is switched to unattended mode; afterwards its plain-text
//! install log is scanned for `[Error]` lines.
use std::path::{Path, PathBuf};

use super::{ExitCode, InstructionExecutor};
use crate::config::ini::{has_section, parse_kv_sections_from_str, set_section_keys};

/// Executable names tried, in order.
const PATCHER_NAMES: &[&str] = &[
    "holopatcher",
    "holopatcher.exe",
    "HoloPatcher.exe",
    "TSLPatcher.exe",
    "TSLPatcherCLI.exe",
];

const PATCH_DATA_DIR: &str = "tslpatchdata";
const INSTALL_LOG: &str = "installlog.txt";
const NAMESPACES_INI: &str = "namespaces.ini";

/// `[Settings]` overrides that make the patcher run without prompting and
/// write a log we can read.
const UNATTENDED_SETTINGS: &[(&str, &str)] = &[
    ("PlaintextLog", "1"),
    ("LookupGameFolder", "0"),
    ("ConfirmMessage", "N"),
];

impl InstructionExecutor {
    pub(super) fn run_patcher(&self, source: &str, destination: &str, arguments: &str) -> ExitCode {
        match self.try_run_patcher(source, destination, arguments) {
            Ok(()) => ExitCode::Success,
            Err(code) => code,
        }
    }

    fn try_run_patcher(&self, source: &str, destination: &str, arguments: &str) -> Result<(), ExitCode> {
        let fs = self.fs();
        let data_dir = self.find_patch_data(source)?;
        let mod_dir = data_dir.parent().map_or_else(|| data_dir.clone(), Path::to_path_buf);
        let game_dir = self.existing_directory(destination)?;
        let option_index = self.namespace_index(&data_dir, arguments)?;
        let patcher = self.find_patcher(&mod_dir).ok_or_else(|| {
            self.ctx.log.error("no patcher executable found");
            ExitCode::ChildProcessError
        })?;

        self.prepare_settings(&data_dir)?;

        let install_log = mod_dir.join(INSTALL_LOG);
        if fs.file_exists(&install_log) {
            fs.delete_file(&install_log).map_err(|e| {
                self.ctx.log.error(&format!("{e:#}"));
                ExitCode::UnknownError
            })?;
        }

        let mut args = vec![
            "--install".to_string(),
            format!("--game-dir={}", game_dir.display()),
            format!("--tslpatchdata={}", data_dir.display()),
        ];
        if let Some(index) = option_index {
            args.push(format!("--namespace-option-index={index}"));
        }
        self.ctx
            .log
            .info(&format!("running {} {}", patcher.display(), args.join(" ")));

        let result = fs
            .execute_process(&patcher, &args, Some(&mod_dir), self.ctx.config.process_timeout())
            .map_err(|e| {
                self.ctx.log.error(&format!("{e:#}"));
                ExitCode::ChildProcessError
            })?;
        if result.timed_out {
            self.ctx.log.error("patcher timed out");
            return Err(ExitCode::ChildProcessError);
        }
        if !result.success {
            self.ctx.log.error(&format!(
                "patcher exited with code {}: {}",
                result.exit_code(),
                result.stderr.trim()
            ));
            return Err(ExitCode::ChildProcessError);
        }

        if fs.is_dry_run() {
            self.ctx.log.dry_run("would verify the patcher install log");
            return Ok(());
        }
        self.check_install_log(&install_log)
    }

    /// Accepts either the mod folder or the `tslpatchdata` folder itself.
    fn find_patch_data(&self, source: &str) -> Result<PathBuf, ExitCode> {
        let fs = self.fs();
        let path = self.resolve_path(source);
        if !fs.dir_exists(&path) {
            self.ctx
                .log
                .error(&format!("patcher source does not exist: {}", path.display()));
            return Err(ExitCode::InvalidSourcePath);
        }
        let is_data_dir = path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().eq_ignore_ascii_case(PATCH_DATA_DIR));
        if is_data_dir {
            return Ok(path);
        }
        fs.dirs_in_dir(&path)
            .unwrap_or_default()
            .into_iter()
            .find(|d| {
                d.file_name()
                    .is_some_and(|n| n.to_string_lossy().eq_ignore_ascii_case(PATCH_DATA_DIR))
            })
            .ok_or_else(|| {
                self.ctx.log.error(&format!(
                    "no {PATCH_DATA_DIR} folder under {}",
                    path.display()
                ));
                ExitCode::InvalidSourcePath
            })
    }

    fn find_patcher(&self, mod_dir: &Path) -> Option<PathBuf> {
        let fs = self.fs();
        let search_dirs = self
            .ctx
            .config
            .resource_dir
            .iter()
            .map(PathBuf::as_path)
            .chain(std::iter::once(mod_dir));
        for dir in search_dirs {
            if let Some(found) = PATCHER_NAMES
                .iter()
                .map(|name| dir.join(name))
                .find(|p| fs.file_exists(p))
            {
                return Some(found);
            }
        }
        PATCHER_NAMES.iter().find_map(|name| fs.find_program(name))
    }

    /// Parse the namespace option index, checking it against
    /// `namespaces.ini` when that file exists.
    fn namespace_index(&self, data_dir: &Path, arguments: &str) -> Result<Option<usize>, ExitCode> {
        let raw = arguments.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        let index: usize = raw.parse().map_err(|_| {
            self.ctx
                .log
                .error(&format!("namespace option index is not a number: '{raw}'"));
            ExitCode::InvalidArguments
        })?;

        let namespaces = data_dir.join(NAMESPACES_INI);
        if !self.fs().file_exists(&namespaces) {
            return Ok(Some(index));
        }
        let count = self
            .fs()
            .read_file(&namespaces)
            .and_then(|text| parse_kv_sections_from_str(&text))
            .map(|sections| {
                sections
                    .iter()
                    .find(|s| s.header.eq_ignore_ascii_case("Namespaces"))
                    .map_or(0, |s| s.entries.len())
            })
            .map_err(|e| {
                self.ctx.log.error(&format!("{e:#}"));
                ExitCode::PatcherError
            })?;
        if index >= count {
            self.ctx.log.error(&format!(
                "namespace option index {index} is out of range ({count} namespaces)"
            ));
            return Err(ExitCode::InvalidArguments);
        }
        Ok(Some(index))
    }

    fn prepare_settings(&self, data_dir: &Path) -> Result<(), ExitCode> {
        let fs = self.fs();
        let files = fs.files_in_dir(data_dir, true).map_err(|e| {
            self.ctx.log.error(&format!("{e:#}"));
            ExitCode::InvalidSourcePath
        })?;
        for ini in files.iter().filter(|p| {
            p.extension()
                .is_some_and(|e| e.eq_ignore_ascii_case("ini"))
        }) {
            let original = fs.read_file(ini).map_err(|e| {
                self.ctx.log.error(&format!("{e:#}"));
                ExitCode::PatcherError
            })?;
            // Only the patcher's own settings file carries [Settings].
            if !has_section(&original, "Settings") {
                continue;
            }
            let updated = set_section_keys(&original, "Settings", UNATTENDED_SETTINGS);
            if updated != original {
                fs.write_file(ini, &updated).map_err(|e| {
                    self.ctx.log.error(&format!("{e:#}"));
                    ExitCode::PatcherError
                })?;
                self.ctx
                    .log
                    .debug(&format!("set unattended settings in {}", ini.display()));
            }
        }
        Ok(())
    }

    fn check_install_log(&self, install_log: &Path) -> Result<(), ExitCode> {
        let fs = self.fs();
        if !fs.file_exists(install_log) {
            self.ctx.log.warn(&format!(
                "patcher did not write {}",
                install_log.display()
            ));
            return Ok(());
        }
        let text = fs.read_file(install_log).map_err(|e| {
            self.ctx.log.error(&format!("{e:#}"));
            ExitCode::PatcherError
        })?;
        let errors: Vec<&str> = text.lines().filter(|l| l.contains("[Error]")).collect();
        if errors.is_empty() {
            return Ok(());
        }
        for line in &errors {
            self.ctx.log.error(line.trim());
        }
        self.ctx
            .log
            .error(&format!("patcher reported {} error(s)", errors.len()));
        Err(ExitCode::PatcherError)
    }
}
