//! # OxiZip Core
//!
//! Shared building blocks for the OxiZip archive library:
//!
//! - [`error`]: the [`OxiZipError`] taxonomy and [`Result`] alias
//! - [`crc`]: CRC-32 plus checksumming reader/writer adapters
//! - [`datetime`]: MS-DOS timestamps as stored in ZIP headers
//! - [`progress`]: advisory progress events
//! - [`cancel`]: cooperative cancellation
//!
//! ## Example
//!
//! ```rust
//! use oxizip_core::crc::Crc32;
//! use oxizip_core::datetime::DosDateTime;
//!
//! let crc = Crc32::compute(b"Hello, World!");
//! assert_eq!(crc, 0xEC4AC3D0);
//!
//! let stamp = DosDateTime::from_fields(2024, 5, 17, 12, 30, 0).unwrap();
//! assert_eq!(stamp.to_string(), "2024-05-17 12:30:00");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod cancel;
pub mod crc;
pub mod datetime;
pub mod error;
pub mod progress;

// Re-exports for convenience
pub use cancel::CancellationToken;
pub use crc::{Crc32, CrcReader, CrcWriter};
pub use datetime::DosDateTime;
pub use error::{OxiZipError, Result};
pub use progress::{ArchiveEvent, NoProgress, ProgressSink};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::cancel::CancellationToken;
    pub use crate::crc::Crc32;
    pub use crate::datetime::DosDateTime;
    pub use crate::error::{OxiZipError, Result};
    pub use crate::progress::{ArchiveEvent, ProgressSink};
}
