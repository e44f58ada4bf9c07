//! ZIP archive format support.
//!
//! This module provides reading and writing of ZIP archives as specified
//! in the PKWARE APPNOTE, with per-entry encryption (traditional PKWARE and
//! WinZip AES) and a configurable encoding for entry names.
//!
//! The layers, from the bottom up:
//!
//! - [`header`] and [`extra`]: the on-disk records, Zip64 included
//! - [`text`]: name and comment encodings and the Unicode flag
//! - [`compression`]: store and deflate
//! - [`encryption`]: traditional and AES encryption
//! - [`reader`], [`writer`], [`extract`]: entry-level I/O
//! - [`archive`]: the editable [`ZipArchive`]

pub mod aes;
pub mod archive;
pub mod compression;
mod cp437;
pub mod crypto;
pub mod encryption;
pub mod entry;
pub mod extra;
pub mod extract;
pub mod header;
pub mod options;
pub mod reader;
pub mod text;
pub mod writer;

pub use aes::{AesStrength, AesVendorVersion};
pub use archive::{ArchiveState, ReadSeek, TestReport, ZipArchive};
pub use compression::{CompressionLevel, CompressionMethod};
pub use encryption::{Encryption, Password};
pub use entry::ZipEntry;
pub use extract::{ExtractReport, Extracted};
pub use header::LocalFileHeader;
pub use options::{
    ArchiveOptions, DuplicateNamePolicy, EntryOptions, ExtractOptions, FailurePolicy,
    OverwritePolicy, PromptDecision, SaveOptions,
};
pub use reader::ZipReader;
pub use text::{EncodingPolicy, TextEncoding};
pub use writer::{StreamingSink, ZipWriter};

use oxizip_core::error::Result;
use std::io::{Read, Seek, Write};

/// Read a ZIP archive.
pub fn read_zip<R: Read + Seek>(reader: R) -> Result<ZipReader<R>> {
    ZipReader::new(reader)
}

/// Create a new ZIP archive writer on a seekable sink.
pub fn write_zip<W: Write + Seek>(writer: W) -> ZipWriter<W> {
    ZipWriter::new(writer)
}
