//! List command implementation.

use crate::utils::{encryption_label, filter_entries, parse_encoding, print_entries};
use oxizip_archive::zip::{ArchiveOptions, ZipArchive, ZipEntry};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// JSON serializable entry data for archive listings.
#[derive(Debug, Serialize, Deserialize)]
struct EntryJson {
    name: String,
    size: u64,
    compressed_size: u64,
    ratio: f64,
    method: String,
    crc: u32,
    modified: String,
    is_dir: bool,
    encryption: String,
    unicode: bool,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    comment: String,
}

impl EntryJson {
    fn from_entry(entry: &ZipEntry) -> Self {
        Self {
            name: entry.name.clone(),
            size: entry.size,
            compressed_size: entry.compressed_size,
            ratio: entry.compression_ratio(),
            method: entry.method.name(),
            crc: entry.crc32,
            modified: entry.modified.to_string(),
            is_dir: entry.is_dir,
            encryption: encryption_label(entry.encryption),
            unicode: entry.is_unicode(),
            comment: entry.comment.clone(),
        }
    }
}

/// JSON output for archive listing.
#[derive(Debug, Serialize, Deserialize)]
struct ArchiveListJson {
    archive: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    comment: String,
    entries: Vec<EntryJson>,
}

/// Options for listing archive contents.
pub struct ListOptions<'a> {
    pub verbose: bool,
    pub json: bool,
    pub encoding: &'a str,
    pub include: &'a [String],
    pub exclude: &'a [String],
}

pub fn cmd_list(archive: &Path, options: &ListOptions) -> Result<(), Box<dyn std::error::Error>> {
    let encoding = parse_encoding(options.encoding)?;
    let zip = ZipArchive::open_with(
        archive,
        ArchiveOptions::new()
            .with_fallback_encoding(encoding)
            .with_comment_encoding(encoding),
    )?;
    let entries = filter_entries(zip.entries(), options.include, options.exclude);

    if options.json {
        println!("{}", render_json(archive, zip.comment(), &entries)?);
        return Ok(());
    }

    println!("Archive: {}", archive.display());
    if !zip.comment().is_empty() {
        println!("Comment: {}", zip.comment());
    }
    print_entries(&entries, options.verbose);
    Ok(())
}

fn render_json(
    archive: &Path,
    comment: &str,
    entries: &[&ZipEntry],
) -> Result<String, serde_json::Error> {
    let listing = ArchiveListJson {
        archive: archive.display().to_string(),
        comment: comment.to_string(),
        entries: entries.iter().map(|e| EntryJson::from_entry(e)).collect(),
    };
    serde_json::to_string_pretty(&listing)
}
