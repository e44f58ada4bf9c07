//! Utility functions for the CLI.

use glob::Pattern;
use indicatif::{ProgressBar, ProgressStyle};
use oxizip_archive::zip::options::SharedProgress;
use oxizip_archive::zip::{Encryption, Password, TextEncoding, ZipEntry};
use oxizip_core::ArchiveEvent;
use std::sync::Arc;

/// Create a progress bar with standard styling.
pub fn create_progress_bar(len: u64, enable: bool) -> ProgressBar {
    if !enable {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len);
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("█▓▒░ "));
    }
    pb
}

/// Check if a name matches the filter patterns.
/// - If include patterns are specified, the name must match at least one
/// - If exclude patterns are specified, the name must not match any
pub fn matches_filters(name: &str, include: &[String], exclude: &[String]) -> bool {
    let matches = |pattern: &String| Pattern::new(pattern).is_ok_and(|p| p.matches(name));

    if exclude.iter().any(matches) {
        return false;
    }
    include.is_empty() || include.iter().any(matches)
}

/// Filter entries based on include/exclude patterns.
pub fn filter_entries<'a>(
    entries: impl Iterator<Item = &'a ZipEntry>,
    include: &[String],
    exclude: &[String],
) -> Vec<&'a ZipEntry> {
    entries
        .filter(|e| matches_filters(&e.name, include, exclude))
        .collect()
}

/// Look up a code page by label.
pub fn parse_encoding(label: &str) -> Result<TextEncoding, Box<dyn std::error::Error>> {
    TextEncoding::for_label(label).ok_or_else(|| format!("unknown encoding '{}'", label).into())
}

/// Resolve the password from the command line or an interactive prompt.
pub fn resolve_password(
    password: Option<String>,
    ask: bool,
    confirm: bool,
) -> Result<Option<Password>, Box<dyn std::error::Error>> {
    if let Some(password) = password {
        return Ok(Some(Password::from(password)));
    }
    if !ask {
        return Ok(None);
    }
    let mut prompt = dialoguer::Password::new().with_prompt("Password");
    if confirm {
        prompt = prompt.with_confirmation("Repeat password", "Passwords do not match");
    }
    Ok(Some(Password::from(prompt.interact()?)))
}

/// Short label of an entry's encryption.
pub fn encryption_label(encryption: Encryption) -> String {
    match encryption {
        Encryption::None => "-".to_string(),
        Encryption::Traditional => "ZipCrypto".to_string(),
        Encryption::Aes(strength) => format!("AES-{}", strength.bits()),
    }
}

/// Print entries in a formatted table.
pub fn print_entries(entries: &[&ZipEntry], verbose: bool) {
    if !verbose {
        for entry in entries {
            println!("{}", entry.name);
        }
        return;
    }

    println!(
        "{:>10} {:>10} {:>6} {:>8} {:>9} {:>8}  {:<19}  Name",
        "Size", "Compressed", "Ratio", "Method", "Crypt", "CRC", "Modified",
    );
    println!("{}", "-".repeat(90));

    let mut total_size = 0u64;
    let mut total_compressed = 0u64;

    for entry in entries {
        let ratio = if entry.size > 0 {
            format!("{:.1}%", entry.compression_ratio())
        } else {
            "-".to_string()
        };
        let type_prefix = if entry.is_dir { "d " } else { "  " };

        println!(
            "{:>10} {:>10} {:>6} {:>8} {:>9} {:08x}  {:<19}  {}{}",
            entry.size,
            entry.compressed_size,
            ratio,
            entry.method.name(),
            encryption_label(entry.encryption),
            entry.crc32,
            entry.modified,
            type_prefix,
            entry.name
        );

        total_size += entry.size;
        total_compressed += entry.compressed_size;
    }

    println!("{}", "-".repeat(90));
    let total_ratio = if total_size > 0 {
        (1.0 - total_compressed as f64 / total_size as f64) * 100.0
    } else {
        0.0
    };
    println!(
        "{:>10} {:>10} {:>5.1}%  {} entries",
        total_size,
        total_compressed,
        total_ratio,
        entries.len()
    );
}

/// Progress sink driving an indicatif bar.
pub fn progress_sink(pb: &ProgressBar) -> SharedProgress {
    let pb = pb.clone();
    Arc::new(move |event: &ArchiveEvent<'_>| {
        match event {
            ArchiveEvent::SaveStarted { entries } | ArchiveEvent::ExtractStarted { entries } => {
                pb.set_length(*entries as u64);
            }
            ArchiveEvent::EntrySaved { name, .. } => {
                pb.set_message(name.to_string());
                pb.inc(1);
            }
            ArchiveEvent::EntryExtracted { name, skipped, .. } => {
                if *skipped {
                    pb.println(format!("  Skipped: {}", name));
                }
                pb.set_message(name.to_string());
                pb.inc(1);
            }
            ArchiveEvent::SaveCompleted { .. } | ArchiveEvent::ExtractCompleted { .. } => {
                pb.finish_with_message("Done");
            }
        }
    })
}
