//! Log file location, ANSI stripping and timestamps.
use std::path::PathBuf;

/// Application folder under the user cache directory.
const APP_DIR: &str = "mod-installer";

/// Remove CSI escape sequences (`ESC [ ... final-byte`) from `s`.
///
/// A lone `ESC` followed by anything other than `[` is dropped together with
/// that next character.
pub(super) fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find('\x1b') {
        out.push_str(rest.get(..pos).unwrap_or_default());
        let mut tail = rest.get(pos + 1..).unwrap_or_default().chars();
        if tail.next() == Some('[') {
            let _ = tail.by_ref().find(|c| ('@'..='~').contains(c));
        }
        rest = tail.as_str();
    }
    out.push_str(rest);
    out
}

/// `$XDG_CACHE_HOME/mod-installer`, falling back to `~/.cache/mod-installer`.
/// Created on first use.
pub(super) fn cache_dir() -> Option<PathBuf> {
    let base = match std::env::var_os("XDG_CACHE_HOME") {
        Some(dir) => PathBuf::from(dir),
        None => std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map_or_else(|| PathBuf::from("."), PathBuf::from)
            .join(".cache"),
    };
    let dir = base.join(APP_DIR);
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

/// Log file for one subcommand, e.g. `install.log`.
pub(super) fn log_file_path(command: &str) -> Option<PathBuf> {
    cache_dir().map(|dir| dir.join(command).with_extension("log"))
}

/// Current UTC time rendered with a `chrono` format string.
pub(super) fn utc_now(format: &str) -> String {
    chrono::Utc::now().format(format).to_string()
}

/// Run header timestamp.
pub(super) const HEADER_TIME: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Per-line timestamp.
pub(super) const LINE_TIME: &str = "%H:%M:%S%.3f";

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn strip_ansi_removes_colours_and_cursor_codes() {
        assert_eq!(strip_ansi("\x1b[33mWARN\x1b[0m  disk"), "WARN  disk");
        assert_eq!(strip_ansi("\x1b[2Kprogress"), "progress");
        assert_eq!(strip_ansi("plain"), "plain");
        assert_eq!(strip_ansi("a\x1b7b"), "ab");
        assert_eq!(strip_ansi("trailing\x1b"), "trailing");
    }

    #[test]
    fn log_file_is_named_after_command() {
        let path = log_file_path("install").unwrap();
        assert_eq!(path.file_name().unwrap(), "install.log");
        assert_eq!(path.parent().unwrap().file_name().unwrap(), APP_DIR);
    }

    #[test]
    fn line_timestamp_has_milliseconds() {
        let s = utc_now(LINE_TIME);
        assert_eq!(s.len(), 12, "HH:MM:SS.mmm");
        assert_eq!(&s[8..9], ".");
    }
}
