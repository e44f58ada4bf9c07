//! Entry metadata.

use super::compression::CompressionMethod;
use super::encryption::Encryption;
use super::header::{FLAG_DATA_DESCRIPTOR, FLAG_ENCRYPTED, FLAG_UNICODE};
use super::text::TextEncoding;
use oxizip_core::datetime::DosDateTime;

/// Unix file type bits for a regular file.
pub const S_IFREG: u32 = 0o100000;

/// Unix file type bits for a directory.
pub const S_IFDIR: u32 = 0o040000;

/// MS-DOS directory attribute.
pub const DOS_DIRECTORY: u32 = 0x10;

/// Default mode of new files.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Default mode of new directories.
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Metadata of one archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    /// Name, forward-slash separated. Directories end with `/`.
    pub name: String,
    /// Whether this is a directory.
    pub is_dir: bool,
    /// Uncompressed size.
    pub size: u64,
    /// Stored payload size, encryption overhead included.
    pub compressed_size: u64,
    /// CRC-32 of the uncompressed data.
    pub crc32: u32,
    /// Last modification time.
    pub modified: DosDateTime,
    /// Compression method of the data (the real one for AES entries).
    pub method: CompressionMethod,
    /// General purpose bit flag.
    pub flags: u16,
    /// Encryption algorithm.
    pub encryption: Encryption,
    /// Encoding the name was read or written with.
    pub text_encoding: TextEncoding,
    /// Entry comment.
    pub comment: String,
    /// External file attributes.
    pub external_attr: u32,
    /// Offset of the local header in the backing archive.
    pub header_offset: u64,
    /// Extra fields the library does not interpret.
    pub extra: Vec<u8>,
}

impl ZipEntry {
    /// Whether the payload is encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// Whether sizes and CRC follow the payload.
    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    /// Whether the Unicode flag (bit 11) is set.
    pub fn is_unicode(&self) -> bool {
        self.flags & FLAG_UNICODE != 0
    }

    /// Unix permission and type bits, if recorded.
    pub fn unix_mode(&self) -> Option<u32> {
        let mode = self.external_attr >> 16;
        (mode != 0).then_some(mode)
    }

    /// Compression ratio in percent saved.
    pub fn compression_ratio(&self) -> f64 {
        if self.size == 0 {
            0.0
        } else {
            100.0 * (1.0 - self.compressed_size as f64 / self.size as f64)
        }
    }

    /// Minimum version needed to extract.
    pub fn version_needed(&self, zip64: bool) -> u16 {
        version_needed(self.is_dir, self.method, self.encryption, zip64)
    }
}

/// Minimum version needed to extract an entry with these properties.
pub fn version_needed(
    is_dir: bool,
    method: CompressionMethod,
    encryption: Encryption,
    zip64: bool,
) -> u16 {
    if matches!(encryption, Encryption::Aes(_)) {
        51
    } else if zip64 {
        45
    } else if is_dir || method == CompressionMethod::Deflated || encryption == Encryption::Traditional {
        20
    } else {
        10
    }
}

/// External attributes for a file with the given permission bits.
pub fn file_attributes(mode: u32) -> u32 {
    (S_IFREG | (mode & 0o7777)) << 16
}

/// External attributes for a directory with the given permission bits.
pub fn dir_attributes(mode: u32) -> u32 {
    ((S_IFDIR | (mode & 0o7777)) << 16) | DOS_DIRECTORY
}
