//! Test command implementation.

use crate::utils::{parse_encoding, resolve_password};
use oxizip_archive::zip::{ArchiveOptions, ZipArchive};
use std::path::Path;

pub fn cmd_test(
    archive: &Path,
    password: Option<String>,
    ask_password: bool,
    encoding: &str,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let encoding = parse_encoding(encoding)?;
    let mut zip = ZipArchive::open_with(
        archive,
        ArchiveOptions::new()
            .with_fallback_encoding(encoding)
            .with_comment_encoding(encoding),
    )?;
    let password = resolve_password(password, ask_password, false)?;

    println!("Testing: {}", archive.display());
    let report = zip.test_entries(password.as_ref())?;

    if verbose {
        for entry in zip.entries() {
            if !report.failures.iter().any(|(name, _)| name == &entry.name) {
                println!("  OK: {}", entry.name);
            }
        }
    }
    for (name, error) in &report.failures {
        println!("  FAILED: {} ({})", name, error);
    }

    println!();
    println!(
        "Tested {} entries: {} OK, {} failed",
        report.tested,
        report.tested - report.failures.len(),
        report.failures.len()
    );

    if report.is_ok() {
        Ok(())
    } else {
        Err(format!("{} entries failed the integrity test", report.failures.len()).into())
    }
}
