//! Placeholder substitution, wildcard expansion, and case-insensitive
//! path lookup for instruction paths.
use std::path::{Component as PathPart, Path, PathBuf};

use anyhow::{Context as _, Result};
use wax::{CandidatePath, Glob, Pattern};

use crate::config::InstallConfig;
use crate::provider::FileSystemProvider;

/// Placeholder for the mod source workspace.
pub const MOD_DIRECTORY: &str = "<<modDirectory>>";

/// Placeholder for the install destination.
pub const KOTOR_DIRECTORY: &str = "<<kotorDirectory>>";

/// Characters wax treats as syntax that may legitimately appear in mod
/// file names. `*` and `?` are deliberately absent.
const GLOB_META: &[char] = &['$', ':', '<', '>', '(', ')', '[', ']', '{', '}', ','];

/// Replace both placeholders in `raw`.
///
/// Component files are usually authored on Windows, so backslashes are
/// turned into forward slashes on other platforms.
///
/// ```
/// use mod_installer::config::InstallConfig;
/// use mod_installer::instructions::paths::substitute;
///
/// let config = InstallConfig {
///     source_path: "/mods".into(),
///     destination_path: "/game".into(),
///     ..InstallConfig::default()
/// };
/// assert_eq!(
///     substitute("<<modDirectory>>/a.zip -> <<kotorDirectory>>", &config),
///     "/mods/a.zip -> /game"
/// );
/// ```
#[must_use]
pub fn substitute(raw: &str, config: &InstallConfig) -> String {
    let replaced = raw
        .replace(MOD_DIRECTORY, &config.source_path.to_string_lossy())
        .replace(KOTOR_DIRECTORY, &config.destination_path.to_string_lossy());
    if cfg!(windows) {
        replaced
    } else {
        replaced.replace('\\', "/")
    }
}

/// Whether `path` contains a `*` or `?` wildcard.
#[must_use]
pub fn has_wildcard(path: &str) -> bool {
    path.contains(['*', '?'])
}

/// Split `path` at the first component containing a wildcard.
///
/// Returns the literal base directory and the remaining components.
fn split_at_wildcard(path: &Path) -> (PathBuf, Vec<String>) {
    let mut base = PathBuf::new();
    let mut rest = Vec::new();
    for part in path.components() {
        let text = part.as_os_str().to_string_lossy();
        if rest.is_empty() && !has_wildcard(&text) {
            base.push(part.as_os_str());
        } else {
            rest.push(text.into_owned());
        }
    }
    (base, rest)
}

fn escape(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for c in part.chars() {
        if GLOB_META.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Expand a wildcard path into the files it matches, sorted.
///
/// A missing base directory matches nothing.
///
/// # Errors
///
/// Returns an error if the wildcard portion is not a valid pattern or the
/// base directory cannot be listed.
pub fn expand(
    fs: &dyn FileSystemProvider,
    pattern: &Path,
    case_insensitive: bool,
) -> Result<Vec<PathBuf>> {
    let (base, rest) = split_at_wildcard(pattern);
    if rest.is_empty() {
        return Ok(vec![pattern.to_path_buf()]);
    }
    let base = if case_insensitive {
        fix_case(fs, &base)
    } else {
        base
    };
    if !fs.dir_exists(&base) {
        return Ok(Vec::new());
    }

    let mut expression = rest.iter().map(|p| escape(p)).collect::<Vec<_>>().join("/");
    if case_insensitive {
        expression.insert_str(0, "(?i)");
    }
    let glob = Glob::new(&expression)
        .with_context(|| format!("invalid wildcard pattern: {}", pattern.display()))?
        .into_owned();

    let recursive = rest.len() > 1;
    let mut matches: Vec<PathBuf> = fs
        .files_in_dir(&base, recursive)?
        .into_iter()
        .filter(|file| {
            file.strip_prefix(&base).is_ok_and(|rel| {
                let rel = to_forward_slashes(rel);
                glob.matched(&CandidatePath::from(rel.as_str())).is_some()
            })
        })
        .collect();
    matches.sort();
    Ok(matches)
}

fn to_forward_slashes(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolve `path` against the real names on disk, ignoring ASCII case.
///
/// Components that already exist are kept as written; a component with
/// no exact or case-insensitive match ends the lookup and the remainder is
/// appended unchanged.
pub fn fix_case(fs: &dyn FileSystemProvider, path: &Path) -> PathBuf {
    if fs.file_exists(path) || fs.dir_exists(path) {
        return path.to_path_buf();
    }
    let mut resolved = PathBuf::new();
    let mut parts = path.components();
    for part in parts.by_ref() {
        let PathPart::Normal(name) = part else {
            resolved.push(part.as_os_str());
            continue;
        };
        let exact = resolved.join(name);
        if fs.file_exists(&exact) || fs.dir_exists(&exact) {
            resolved = exact;
            continue;
        }
        match find_ignoring_case(fs, &resolved, &name.to_string_lossy()) {
            Some(found) => resolved = found,
            None => {
                resolved = exact;
                break;
            }
        }
    }
    for rest in parts {
        resolved.push(rest.as_os_str());
    }
    resolved
}

fn find_ignoring_case(fs: &dyn FileSystemProvider, dir: &Path, name: &str) -> Option<PathBuf> {
    let lookup_dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    if !fs.dir_exists(lookup_dir) {
        return None;
    }
    let dirs = fs.dirs_in_dir(lookup_dir).unwrap_or_default();
    let files = fs.files_in_dir(lookup_dir, false).unwrap_or_default();
    dirs.into_iter()
        .chain(files)
        .find(|p| {
            p.file_name()
                .is_some_and(|n| n.to_string_lossy().eq_ignore_ascii_case(name))
        })
        .map(|p| dir.join(p.file_name().unwrap_or_default()))
}
