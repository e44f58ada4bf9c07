//! # OxiZip Archive
//!
//! ZIP archive support for OxiZip:
//!
//! - **Entries** encrypted one by one, each with its own password and
//!   algorithm: none, traditional PKWARE or WinZip AES-128/192/256
//! - **Names** in any code page known to `encoding_rs` or in CP437, with the
//!   Unicode flag set only when the name needs it
//! - **Zip64** for archives and entries above 4 GiB
//! - **Streaming** output to sinks that cannot seek
//!
//! ## Example
//!
//! ```rust
//! use oxizip_archive::zip::{EntryOptions, ZipArchive};
//!
//! let mut archive = ZipArchive::new();
//! archive.add_bytes("readme.txt", b"plain text".to_vec()).unwrap();
//! archive
//!     .add_bytes_with("secret.txt", b"hidden".to_vec(), &EntryOptions::new().password("Password!"))
//!     .unwrap();
//!
//! let bytes = archive.to_bytes().unwrap();
//! let mut reopened = ZipArchive::from_bytes(bytes).unwrap();
//! assert_eq!(reopened.len(), 2);
//! assert_eq!(
//!     reopened.read_entry("secret.txt", Some(&"Password!".into())).unwrap(),
//!     b"hidden"
//! );
//! ```
//!
//! ## Features
//!
//! - `parallel`: compress and encrypt new entries on the rayon thread pool
//!   while saving.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod zip;

// Re-exports
pub use zip::{
    ArchiveOptions, ArchiveState, CompressionLevel, CompressionMethod, EncodingPolicy,
    Encryption, EntryOptions, ExtractOptions, Password, TextEncoding, ZipArchive, ZipEntry,
    ZipReader, ZipWriter,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::zip::{
        AesStrength, ArchiveOptions, ArchiveState, CompressionLevel, EncodingPolicy, Encryption,
        EntryOptions, ExtractOptions, FailurePolicy, OverwritePolicy, Password, SaveOptions,
        TextEncoding, ZipArchive, ZipEntry,
    };
    pub use oxizip_core::prelude::*;
}
