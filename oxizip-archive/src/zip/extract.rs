//! Extraction to the filesystem.
//!
//! File contents are written to a temporary file next to the destination
//! and renamed into place only after the CRC has been verified, so a failed
//! or cancelled extraction never leaves a partial file behind.

use super::entry::ZipEntry;
use super::options::{ExtractOptions, FailurePolicy, OverwritePolicy, PromptDecision};
use super::reader::ZipReader;
use filetime::FileTime;
use oxizip_core::error::{OxiZipError, Result};
use oxizip_core::progress::ArchiveEvent;
use std::fs;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::{Component, Path, PathBuf};

/// Outcome of extracting one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    /// Written to the given path.
    Written(PathBuf),
    /// Left alone because the destination exists.
    Skipped(PathBuf),
}

/// Summary of [`extract_all`].
#[derive(Debug, Default)]
pub struct ExtractReport {
    /// Entries written.
    pub extracted: usize,
    /// Entries skipped by the overwrite policy.
    pub skipped: usize,
    /// Entries that failed, with their errors.
    pub failures: Vec<(String, OxiZipError)>,
}

impl ExtractReport {
    /// Whether every entry was extracted or skipped.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Resolve `name` below `root`, rejecting absolute paths, drive prefixes
/// and `..` components.
pub fn safe_destination(root: &Path, name: &str) -> Result<PathBuf> {
    let bytes = name.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        return Err(OxiZipError::path_traversal(name));
    }

    let mut path = root.to_path_buf();
    for part in name.split(['/', '\\']) {
        match Path::new(part).components().next() {
            None | Some(Component::CurDir) => {}
            Some(Component::Normal(segment)) => path.push(segment),
            Some(Component::ParentDir | Component::RootDir | Component::Prefix(_)) => {
                return Err(OxiZipError::path_traversal(name));
            }
        }
    }
    if name.starts_with('/') || name.starts_with('\\') || path == root {
        return Err(OxiZipError::path_traversal(name));
    }
    Ok(path)
}

fn resolve_existing(path: &Path, policy: &OverwritePolicy) -> Result<bool> {
    if !path.exists() {
        return Ok(true);
    }
    match policy {
        OverwritePolicy::Fail => Err(OxiZipError::destination_exists(path)),
        OverwritePolicy::Overwrite => Ok(true),
        OverwritePolicy::Skip => Ok(false),
        OverwritePolicy::Prompt(ask) => match (**ask)(path) {
            PromptDecision::Overwrite => Ok(true),
            PromptDecision::Skip => Ok(false),
            PromptDecision::Abort => Err(OxiZipError::Cancelled),
        },
    }
}

#[cfg(unix)]
fn apply_mode(file: &fs::File, entry: &ZipEntry) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = entry.unix_mode().map(|m| m & 0o777).unwrap_or(0o644);
    file.set_permissions(fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn apply_mode(_file: &fs::File, _entry: &ZipEntry) -> Result<()> {
    Ok(())
}

/// Extract entry `index` below `root`.
pub fn extract_entry<R: Read + Seek>(
    reader: &mut ZipReader<R>,
    index: usize,
    root: &Path,
    options: &ExtractOptions,
) -> Result<Extracted> {
    let entry = reader
        .entries()
        .get(index)
        .cloned()
        .ok_or_else(|| OxiZipError::entry_not_found(format!("#{}", index)))?;
    let dest = safe_destination(root, &entry.name)?;

    if entry.is_dir {
        fs::create_dir_all(&dest)?;
        log::debug!("created directory {}", dest.display());
        return Ok(Extracted::Written(dest));
    }

    if !resolve_existing(&dest, &options.overwrite)? {
        log::debug!("skipping existing {}", dest.display());
        return Ok(Extracted::Skipped(dest));
    }

    let parent = dest.parent().unwrap_or(root);
    fs::create_dir_all(parent)?;

    // Dropping the temporary file on any error below deletes it
    let mut temp = tempfile::Builder::new()
        .prefix(".oxizip-")
        .tempfile_in(parent)?;
    {
        let mut out = BufWriter::new(temp.as_file_mut());
        reader.copy_entry_to(
            index,
            options.password_for(&entry.name),
            &mut out,
            options.cancel.as_ref(),
        )?;
        out.flush()?;
    }
    apply_mode(temp.as_file(), &entry)?;
    temp.persist(&dest).map_err(|e| OxiZipError::from(e.error))?;

    if options.restore_mtime {
        let mtime = FileTime::from_system_time(entry.modified.to_system_time());
        filetime::set_file_mtime(&dest, mtime)?;
    }

    log::debug!("extracted '{}' to {}", entry.name, dest.display());
    Ok(Extracted::Written(dest))
}

fn emit(options: &ExtractOptions, event: ArchiveEvent<'_>) {
    options.sink().on_event(&event);
}

/// Extract every entry below `root`.
///
/// By default ([`FailurePolicy::Continue`]) a failed entry is recorded in the
/// report and the remaining entries are still extracted.
/// [`FailurePolicy::StopOnFirst`] returns the first error instead.
/// Cancellation always stops.
pub fn extract_all<R: Read + Seek>(
    reader: &mut ZipReader<R>,
    root: &Path,
    options: &ExtractOptions,
) -> Result<ExtractReport> {
    let total = reader.len();
    emit(options, ArchiveEvent::ExtractStarted { entries: total });
    fs::create_dir_all(root)?;

    let mut report = ExtractReport::default();
    let mut outcome = Ok(());
    for index in 0..total {
        if let Some(token) = &options.cancel {
            if let Err(err) = token.check() {
                outcome = Err(err);
                break;
            }
        }

        let (name, size) = {
            let entry = &reader.entries()[index];
            (entry.name.clone(), entry.size)
        };
        match extract_entry(reader, index, root, options) {
            Ok(done) => {
                let skipped = matches!(done, Extracted::Skipped(_));
                if skipped {
                    report.skipped += 1;
                } else {
                    report.extracted += 1;
                }
                emit(
                    options,
                    ArchiveEvent::EntryExtracted {
                        index,
                        name: &name,
                        size,
                        skipped,
                    },
                );
            }
            Err(err) => {
                let fatal = matches!(err, OxiZipError::Cancelled)
                    || options.failure == FailurePolicy::StopOnFirst;
                if fatal {
                    outcome = Err(err);
                    break;
                }
                log::warn!("failed to extract '{}': {}", name, err);
                report.failures.push((name, err));
            }
        }
    }

    emit(
        options,
        ArchiveEvent::ExtractCompleted {
            extracted: report.extracted,
            not_extracted: total - report.extracted,
        },
    );
    outcome.map(|()| report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_destination() {
        let root = Path::new("/tmp/out");
        assert_eq!(
            safe_destination(root, "a/b.txt").unwrap(),
            Path::new("/tmp/out/a/b.txt")
        );
        assert_eq!(
            safe_destination(root, "./a//b.txt").unwrap(),
            Path::new("/tmp/out/a/b.txt")
        );
        assert_eq!(
            safe_destination(root, "dir/").unwrap(),
            Path::new("/tmp/out/dir")
        );
    }

    #[test]
    fn test_traversal_rejected() {
        let root = Path::new("/tmp/out");
        for name in ["../evil", "a/../../evil", "/etc/passwd", "C:/win.ini", "a\\..\\..\\x", "."] {
            assert!(
                matches!(
                    safe_destination(root, name),
                    Err(OxiZipError::PathTraversal { .. })
                ),
                "{}",
                name
            );
        }
    }

    #[test]
    fn test_overwrite_policies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x");
        assert!(resolve_existing(&path, &OverwritePolicy::Fail).unwrap());

        fs::write(&path, b"old").unwrap();
        assert!(matches!(
            resolve_existing(&path, &OverwritePolicy::Fail),
            Err(OxiZipError::DestinationExists { .. })
        ));
        assert!(resolve_existing(&path, &OverwritePolicy::Overwrite).unwrap());
        assert!(!resolve_existing(&path, &OverwritePolicy::Skip).unwrap());

        let abort = OverwritePolicy::Prompt(std::sync::Arc::new(|_: &Path| PromptDecision::Abort));
        assert!(matches!(
            resolve_existing(&path, &abort),
            Err(OxiZipError::Cancelled)
        ));
    }
}
