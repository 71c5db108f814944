//! Minimal INI reading and in-place key rewriting.
//!
//! Patcher configuration files are edited, not regenerated: only the
//! targeted keys change, every other line (comments, ordering, unknown
//! sections) is preserved byte for byte.
use anyhow::{Result, bail};

/// A key-value section.
///
/// # Examples
///
/// ```
/// use mod_installer::config::ini::KvSection;
///
/// let section = KvSection {
///     header: "Settings".to_string(),
///     entries: vec![("PlaintextLog".to_string(), "1".to_string())],
/// };
/// assert_eq!(section.get("plaintextlog"), Some("1"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvSection {
    /// The raw section header without brackets.
    pub header: String,
    /// Key-value entries in file order.
    pub entries: Vec<(String, String)>,
}

impl KvSection {
    /// Look up a value by key, ignoring ASCII case.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Parse key-value INI content.
///
/// Lines starting with `;` or `#` are comments. Headers preserve their
/// original case.
///
/// ```
/// use mod_installer::config::ini::parse_kv_sections_from_str;
///
/// let sections = parse_kv_sections_from_str(
///     "; generated\n[Namespaces]\nNamespace1=standard\nNamespace2=hardcore\n",
/// ).unwrap();
/// assert_eq!(sections[0].header, "Namespaces");
/// assert_eq!(sections[0].entries.len(), 2);
/// ```
///
/// # Errors
///
/// Returns an error if a line is not a header, comment, or `key=value`
/// pair, or if an entry appears before the first header.
pub fn parse_kv_sections_from_str(content: &str) -> Result<Vec<KvSection>> {
    let mut sections = Vec::new();
    let mut current: Option<KvSection> = None;

    for (line_num, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if is_blank_or_comment(trimmed) {
            continue;
        }

        if let Some(header) = parse_raw_header(trimmed) {
            if let Some(section) = current.take() {
                sections.push(section);
            }
            current = Some(KvSection {
                header,
                entries: Vec::new(),
            });
        } else if let Some(ref mut section) = current {
            if let Some((key, value)) = parse_kv_line(trimmed) {
                section.entries.push((key, value));
            } else {
                bail!(
                    "invalid key-value pair at line {}: {}",
                    line_num + 1,
                    trimmed
                );
            }
        } else {
            bail!(
                "entry outside of section at line {}: {}",
                line_num + 1,
                trimmed
            );
        }
    }

    if let Some(section) = current {
        sections.push(section);
    }

    Ok(sections)
}

/// Set `values` inside `[section]` of `content`, returning the new text.
///
/// Existing keys are rewritten where they stand (matching key and section
/// names case-insensitively); missing keys are appended at the end of the
/// section, and a missing section is appended at the end of the file. Line
/// endings follow the input.
///
/// ```
/// use mod_installer::config::ini::set_section_keys;
///
/// let out = set_section_keys(
///     "[Settings]\nConfirmMessage=Install?\n[Other]\nx=1\n",
///     "settings",
///     &[("ConfirmMessage", "N"), ("PlaintextLog", "1")],
/// );
/// assert_eq!(out, "[Settings]\nConfirmMessage=N\nPlaintextLog=1\n[Other]\nx=1\n");
/// ```
#[must_use]
pub fn set_section_keys(content: &str, section: &str, values: &[(&str, &str)]) -> String {
    let newline = if content.contains("\r\n") { "\r\n" } else { "\n" };
    let mut written = vec![false; values.len()];
    let mut out: Vec<String> = Vec::new();
    let mut in_target = false;
    let mut seen_target = false;

    let flush_missing = |out: &mut Vec<String>, written: &mut [bool]| {
        // Keep trailing blank lines after the appended keys.
        let mut insert_at = out.len();
        while insert_at > 0 && out.get(insert_at - 1).is_some_and(|l| l.trim().is_empty()) {
            insert_at -= 1;
        }
        for ((key, value), done) in values.iter().zip(written.iter_mut()) {
            if !*done {
                out.insert(insert_at, format!("{key}={value}"));
                insert_at += 1;
                *done = true;
            }
        }
    };

    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(header) = parse_raw_header(trimmed) {
            if in_target {
                flush_missing(&mut out, &mut written);
            }
            in_target = header.eq_ignore_ascii_case(section);
            seen_target |= in_target;
            out.push(line.to_string());
            continue;
        }
        if in_target
            && !is_blank_or_comment(trimmed)
            && let Some((key, _)) = parse_kv_line(trimmed)
            && let Some(pos) = values.iter().position(|(k, _)| k.eq_ignore_ascii_case(&key))
            && let (Some((_, value)), Some(done)) = (values.get(pos), written.get_mut(pos))
        {
            out.push(format!("{key}={value}"));
            *done = true;
            continue;
        }
        out.push(line.to_string());
    }

    if in_target {
        flush_missing(&mut out, &mut written);
    } else if !seen_target {
        out.push(format!("[{section}]"));
        flush_missing(&mut out, &mut written);
    }

    let mut text = out.join(newline);
    if content.is_empty() || content.ends_with('\n') || !seen_target {
        text.push_str(newline);
    }
    text
}

/// Whether `content` has a `[section]` header, compared case-insensitively.
#[must_use]
pub fn has_section(content: &str, section: &str) -> bool {
    content
        .lines()
        .filter_map(parse_raw_header)
        .any(|header| header.eq_ignore_ascii_case(section))
}

fn is_blank_or_comment(trimmed: &str) -> bool {
    trimmed.is_empty() || trimmed.starts_with(';') || trimmed.starts_with('#')
}

/// Parse a `[header]` line preserving original case.
fn parse_raw_header(line: &str) -> Option<String> {
    let inner = line.trim().strip_prefix('[')?.strip_suffix(']')?;
    let trimmed = inner.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

/// Parse a `key = value` line, stripping inline `;` comments from the value.
fn parse_kv_line(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), strip_inline_comment(value.trim()).to_string()))
}

/// Strip inline comments (`;` preceded by whitespace) from a value.
fn strip_inline_comment(value: &str) -> &str {
    value
        .find(" ;")
        .or_else(|| value.find("\t;"))
        .map_or(value, |idx| value.get(..idx).unwrap_or(value).trim_end())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    const PATCHER_SETTINGS: &[(&str, &str)] = &[
        ("PlaintextLog", "1"),
        ("LookupGameFolder", "0"),
        ("ConfirmMessage", "N"),
    ];

    #[test]
    fn rewrites_existing_keys_in_place() {
        let input = "[Settings]\nWindowCaption=My Mod\nPlaintextLog=0\nLookupGameFolder=1\nConfirmMessage=Really?\n\n[GFFList]\nFile0=a.utc\n";
        let out = set_section_keys(input, "Settings", PATCHER_SETTINGS);
        assert_eq!(
            out,
            "[Settings]\nWindowCaption=My Mod\nPlaintextLog=1\nLookupGameFolder=0\nConfirmMessage=N\n\n[GFFList]\nFile0=a.utc\n"
        );
    }

    #[test]
    fn appends_missing_keys_before_blank_separator() {
        let input = "[settings]\nWindowCaption=X\n\n[GFFList]\n";
        let out = set_section_keys(input, "Settings", &[("PlaintextLog", "1")]);
        assert_eq!(out, "[settings]\nWindowCaption=X\nPlaintextLog=1\n\n[GFFList]\n");
    }

    #[test]
    fn appends_missing_section() {
        let out = set_section_keys("[GFFList]\nFile0=a\n", "Settings", &[("ConfirmMessage", "N")]);
        assert_eq!(out, "[GFFList]\nFile0=a\n[Settings]\nConfirmMessage=N\n");
    }

    #[test]
    fn preserves_crlf_and_comments() {
        let input = "; header\r\n[Settings]\r\nConfirmMessage=Go\r\n";
        let out = set_section_keys(input, "Settings", &[("ConfirmMessage", "N")]);
        assert_eq!(out, "; header\r\n[Settings]\r\nConfirmMessage=N\r\n");
    }

    #[test]
    fn keys_in_other_sections_are_untouched() {
        let input = "[Other]\nConfirmMessage=keep\n[Settings]\n";
        let out = set_section_keys(input, "Settings", &[("ConfirmMessage", "N")]);
        assert_eq!(out, "[Other]\nConfirmMessage=keep\n[Settings]\nConfirmMessage=N\n");
    }

    #[test]
    fn has_section_ignores_case_and_keys() {
        assert!(has_section("; c\n[settings]\n", "Settings"));
        assert!(!has_section("[Namespaces]\nSettings=1\n", "Settings"));
        assert!(!has_section("", "Settings"));
    }

    #[test]
    fn parse_rejects_entry_outside_section() {
        assert!(parse_kv_sections_from_str("orphan=1\n").is_err());
    }

    #[test]
    fn parse_strips_inline_comments() {
        let sections = parse_kv_sections_from_str("[a]\nk = v ; note\n").unwrap();
        assert_eq!(sections[0].get("K"), Some("v"));
    }
}
