//! Multi-strategy archive extraction.
//!
//! Strategies are tried in order until one succeeds:
//!
//! 1. the `zip` library, for plain zip archives;
//! 2. a 7-Zip command-line tool (`7z`, `7za`, `7zz`) for everything it
//!    understands (7z, rar, and zips the library rejects);
//! 3. a raw signature scan for self-extracting executables: the embedded
//!    7z/zip payload is carved out to a scratch file and fed back through
//!    strategies 1 and 2.
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};

use crate::error::ArchiveError;
use crate::exec::Executor;

/// Local file header magic of a zip archive.
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Signature header of a 7z archive.
const SEVEN_ZIP_MAGIC: &[u8] = &[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C];

/// Names under which a 7-Zip CLI is commonly installed.
const SEVEN_ZIP_BINARIES: &[&str] = &["7z", "7za", "7zz", "7z.exe", "7za.exe"];

/// Container format recognised from leading magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// Zip archive.
    Zip,
    /// 7z archive.
    SevenZip,
    /// Anything else (rar, self-extracting exe, unknown).
    Other,
}

/// Detect the archive format from the first bytes of `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn detect_kind(path: &Path) -> std::io::Result<ArchiveKind> {
    let mut head = [0u8; 8];
    let mut file = File::open(path)?;
    let n = file.read(&mut head)?;
    let head = head.get(..n).unwrap_or_default();
    Ok(if head.starts_with(ZIP_MAGIC) {
        ArchiveKind::Zip
    } else if head.starts_with(SEVEN_ZIP_MAGIC) {
        ArchiveKind::SevenZip
    } else {
        ArchiveKind::Other
    })
}

/// Archive opener with a library → CLI → signature-scan fallback chain.
#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    executor: Arc<dyn Executor>,
}

impl ArchiveExtractor {
    /// Create an extractor that runs CLI tools through `executor`.
    #[must_use]
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }

    /// Extract `archive` into `dest`, returning the paths of extracted files.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::NotFound`] if the archive is missing and
    /// [`ArchiveError::Unsupported`] once every strategy has failed.
    pub fn extract(&self, archive: &Path, dest: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
        if !archive.is_file() {
            return Err(ArchiveError::NotFound(archive.to_path_buf()));
        }
        let mut attempts = Vec::new();

        match self.extract_direct(archive, dest, &mut attempts) {
            Some(files) => return Ok(files),
            None => tracing::debug!(
                "direct extraction of {} failed, scanning for embedded payload",
                archive.display()
            ),
        }

        match self.extract_embedded(archive, dest, &mut attempts) {
            Ok(Some(files)) => Ok(files),
            Ok(None) => {
                attempts.push("signature scan: no embedded archive found".to_string());
                Err(ArchiveError::Unsupported {
                    path: archive.to_path_buf(),
                    attempts,
                })
            }
            Err(e) => {
                attempts.push(format!("signature scan: {e:#}"));
                Err(ArchiveError::Unsupported {
                    path: archive.to_path_buf(),
                    attempts,
                })
            }
        }
    }

    /// List the file entries of a zip archive without extracting it.
    ///
    /// Used by dry runs to predict what an extraction would produce.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be read as a zip.
    pub fn list_entries(&self, archive: &Path) -> Result<Vec<PathBuf>> {
        let file =
            File::open(archive).with_context(|| format!("opening {}", archive.display()))?;
        let mut zip = zip::ZipArchive::new(BufReader::new(file))
            .with_context(|| format!("reading {} as zip", archive.display()))?;
        let mut entries = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let entry = zip.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            if let Some(name) = entry.enclosed_name() {
                entries.push(name.to_path_buf());
            }
        }
        Ok(entries)
    }

    /// Strategies 1 and 2. Failures are appended to `attempts`.
    fn extract_direct(
        &self,
        archive: &Path,
        dest: &Path,
        attempts: &mut Vec<String>,
    ) -> Option<Vec<PathBuf>> {
        let kind = detect_kind(archive).unwrap_or(ArchiveKind::Other);
        if kind == ArchiveKind::Zip {
            match extract_zip(archive, dest) {
                Ok(files) => return Some(files),
                Err(e) => attempts.push(format!("zip: {e:#}")),
            }
        }
        match self.extract_with_cli(archive, dest) {
            Ok(files) => Some(files),
            Err(e) => {
                attempts.push(format!("7z: {e:#}"));
                None
            }
        }
    }

    /// Strategy 2: shell out to a 7-Zip binary.
    fn extract_with_cli(&self, archive: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
        let Some(tool) = SEVEN_ZIP_BINARIES
            .iter()
            .find_map(|name| self.executor.which(name))
        else {
            bail!("no 7-Zip executable found on PATH");
        };

        std::fs::create_dir_all(dest)
            .with_context(|| format!("creating {}", dest.display()))?;
        let before = list_tree(dest);
        let args = vec![
            "x".to_string(),
            "-y".to_string(),
            format!("-o{}", dest.display()),
            archive.display().to_string(),
        ];
        let result = self.executor.run_unchecked(&tool, &args, None, None)?;
        if !result.success {
            bail!(
                "{} exited with {}: {}",
                tool.display(),
                result.exit_code(),
                result.stderr.trim()
            );
        }
        let before: HashSet<PathBuf> = before.into_iter().collect();
        Ok(list_tree(dest)
            .into_iter()
            .filter(|p| !before.contains(p))
            .collect())
    }

    /// Strategy 3: carve an embedded payload out of a self-extractor.
    fn extract_embedded(
        &self,
        archive: &Path,
        dest: &Path,
        attempts: &mut Vec<String>,
    ) -> Result<Option<Vec<PathBuf>>> {
        let bytes = std::fs::read(archive)
            .with_context(|| format!("reading {}", archive.display()))?;
        let Some((offset, extension)) = find_embedded_payload(&bytes) else {
            return Ok(None);
        };
        tracing::debug!(
            "found embedded {extension} payload at offset {offset} in {}",
            archive.display()
        );

        let scratch = tempfile::tempdir().context("creating scratch directory")?;
        let payload = scratch.path().join(format!("payload.{extension}"));
        std::fs::write(&payload, bytes.get(offset..).unwrap_or_default())
            .with_context(|| format!("writing {}", payload.display()))?;

        Ok(self.extract_direct(&payload, dest, attempts))
    }
}

/// Extract every entry of a zip archive, refusing entries that would escape
/// `dest`.
fn extract_zip(archive: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    let file = File::open(archive).with_context(|| format!("opening {}", archive.display()))?;
    let mut zip = zip::ZipArchive::new(BufReader::new(file))?;
    let mut extracted = Vec::with_capacity(zip.len());

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let Some(relative) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            tracing::warn!("skipping unsafe zip entry '{}'", entry.name());
            continue;
        };
        let output_path = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&output_path)?;
        } else {
            if let Some(parent) = output_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut outfile = File::create(&output_path)
                .with_context(|| format!("creating {}", output_path.display()))?;
            std::io::copy(&mut entry, &mut outfile)?;
            extracted.push(output_path);
        }
    }
    Ok(extracted)
}

/// Locate the first 7z or zip signature past offset zero.
fn find_embedded_payload(bytes: &[u8]) -> Option<(usize, &'static str)> {
    let seven = find_signature(bytes, SEVEN_ZIP_MAGIC).map(|o| (o, "7z"));
    let zip = find_signature(bytes, ZIP_MAGIC).map(|o| (o, "zip"));
    match (seven, zip) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn find_signature(bytes: &[u8], signature: &[u8]) -> Option<usize> {
    bytes
        .windows(signature.len())
        .skip(1)
        .position(|w| w == signature)
        .map(|p| p + 1)
}

fn list_tree(dir: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .collect()
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
pub(crate) mod tests {
    use super::*;
    use crate::exec::ExecResult;
    use std::io::Write as _;
    use std::time::Duration;

    /// Executor that reports no programs on PATH.
    #[derive(Debug, Default)]
    pub(crate) struct NoToolsExecutor;

    impl Executor for NoToolsExecutor {
        fn run_unchecked(
            &self,
            _: &Path,
            _: &[String],
            _: Option<&Path>,
            _: Option<Duration>,
        ) -> Result<ExecResult> {
            bail!("unexpected executor call in test")
        }

        fn which(&self, _: &str) -> Option<PathBuf> {
            None
        }
    }

    /// Write a zip at `path` containing `(name, contents)` entries.
    pub(crate) fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, contents) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    fn extractor() -> ArchiveExtractor {
        ArchiveExtractor::new(Arc::new(NoToolsExecutor))
    }

    #[test]
    fn extracts_plain_zip() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("mod.zip");
        write_zip(&archive, &[("Override/a.tga", "A"), ("readme.txt", "R")]);

        let out = dir.path().join("out");
        let files = extractor().extract(&archive, &out).unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(
            std::fs::read_to_string(out.join("Override/a.tga")).unwrap(),
            "A"
        );
    }

    #[test]
    fn missing_archive_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = extractor()
            .extract(&dir.path().join("nope.zip"), dir.path())
            .unwrap_err();
        assert!(matches!(err, ArchiveError::NotFound(_)));
    }

    #[test]
    fn garbage_reports_every_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.rar");
        std::fs::write(&archive, b"definitely not an archive").unwrap();

        let err = extractor().extract(&archive, dir.path()).unwrap_err();
        let ArchiveError::Unsupported { attempts, .. } = err else {
            panic!("expected Unsupported");
        };
        assert!(attempts.iter().any(|a| a.starts_with("7z:")));
        assert!(attempts.iter().any(|a| a.starts_with("signature scan")));
    }

    #[test]
    fn embedded_zip_payload_is_carved_out() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("inner.zip");
        write_zip(&inner, &[("file.txt", "payload")]);

        let mut sfx = b"MZ fake self-extractor stub".to_vec();
        sfx.extend(std::fs::read(&inner).unwrap());
        let exe = dir.path().join("setup.exe");
        std::fs::write(&exe, sfx).unwrap();

        let out = dir.path().join("out");
        let files = extractor().extract(&exe, &out).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(
            std::fs::read_to_string(out.join("file.txt")).unwrap(),
            "payload"
        );
    }

    #[test]
    fn list_entries_skips_directories() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("mod.zip");
        write_zip(&archive, &[("a/b.txt", "x"), ("c.txt", "y")]);
        let entries = extractor().list_entries(&archive).unwrap();
        assert_eq!(entries, vec![PathBuf::from("a/b.txt"), PathBuf::from("c.txt")]);
    }

    #[test]
    fn detect_kind_reads_magic() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("x.bin");
        write_zip(&archive, &[("a", "b")]);
        assert_eq!(detect_kind(&archive).unwrap(), ArchiveKind::Zip);
        std::fs::write(&archive, SEVEN_ZIP_MAGIC).unwrap();
        assert_eq!(detect_kind(&archive).unwrap(), ArchiveKind::SevenZip);
    }

    #[test]
    fn signature_at_offset_zero_is_not_embedded() {
        let mut bytes = ZIP_MAGIC.to_vec();
        bytes.extend_from_slice(b"rest");
        assert_eq!(find_embedded_payload(&bytes), None);
    }
}
