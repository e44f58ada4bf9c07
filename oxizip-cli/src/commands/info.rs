//! Info command implementation.

use crate::utils::{encryption_label, parse_encoding};
use oxizip_archive::zip::{ArchiveOptions, ZipArchive};
use std::collections::BTreeMap;
use std::path::Path;

pub fn cmd_info(archive: &Path, encoding: &str) -> Result<(), Box<dyn std::error::Error>> {
    let encoding = parse_encoding(encoding)?;
    let zip = ZipArchive::open_with(
        archive,
        ArchiveOptions::new()
            .with_fallback_encoding(encoding)
            .with_comment_encoding(encoding),
    )?;
    let metadata = std::fs::metadata(archive)?;

    println!("Archive Information");
    println!("===================");
    println!("File: {}", archive.display());
    println!("Size: {} bytes", metadata.len());
    if !zip.comment().is_empty() {
        println!("Comment: {}", zip.comment());
    }

    let entries: Vec<_> = zip.entries().collect();
    let total_size: u64 = entries.iter().map(|e| e.size).sum();
    let total_compressed: u64 = entries.iter().map(|e| e.compressed_size).sum();

    println!();
    println!("Contents:");
    println!("  Files: {}", entries.iter().filter(|e| !e.is_dir).count());
    println!("  Directories: {}", entries.iter().filter(|e| e.is_dir).count());
    println!("  Total size: {} bytes", total_size);
    println!("  Compressed size: {} bytes", total_compressed);
    if total_size > 0 {
        println!(
            "  Compression ratio: {:.1}%",
            (1.0 - total_compressed as f64 / total_size as f64) * 100.0
        );
    }

    let mut encryption: BTreeMap<String, usize> = BTreeMap::new();
    let mut encodings: BTreeMap<&'static str, usize> = BTreeMap::new();
    for entry in &entries {
        if entry.is_encrypted() {
            *encryption.entry(encryption_label(entry.encryption)).or_default() += 1;
        }
        *encodings.entry(entry.text_encoding.name()).or_default() += 1;
    }

    if !encryption.is_empty() {
        println!();
        println!("Encryption:");
        for (label, count) in &encryption {
            println!("  {}: {}", label, count);
        }
    }

    println!();
    println!("Name encodings:");
    for (name, count) in &encodings {
        println!("  {}: {}", name, count);
    }
    println!(
        "  Unicode flag set: {}",
        entries.iter().filter(|e| e.is_unicode()).count()
    );

    Ok(())
}
