//! Error types for OxiZip operations.
//!
//! Every failure the library can report is a variant of [`OxiZipError`]. The
//! taxonomy separates structural damage ([`OxiZipError::CorruptArchive`]) from
//! a wrong or missing password ([`OxiZipError::BadPassword`],
//! [`OxiZipError::PasswordRequired`]): a CRC mismatch on an encrypted entry is
//! a password problem, the same mismatch on a plain entry is corruption.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for OxiZip operations.
#[derive(Debug, Error)]
pub enum OxiZipError {
    /// I/O error from the underlying reader/writer.
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    /// Malformed structure, truncated stream, or CRC mismatch on a plain entry.
    #[error("Corrupt archive: {message}")]
    CorruptArchive {
        /// Description of the damage.
        message: String,
    },

    /// Wrong password for an encrypted entry.
    #[error("Bad password for entry '{entry}'")]
    BadPassword {
        /// Name of the entry that failed to decrypt.
        entry: String,
    },

    /// An encrypted entry was read without any password.
    #[error("Entry '{entry}' is encrypted and no password was supplied")]
    PasswordRequired {
        /// Name of the encrypted entry.
        entry: String,
    },

    /// Compression method, extra field or algorithm that is not implemented.
    #[error("Unsupported feature: {feature}")]
    UnsupportedFeature {
        /// What was not supported.
        feature: String,
    },

    /// Duplicate entry name under a policy that forbids duplicates.
    #[error("An entry named '{name}' already exists")]
    NameCollision {
        /// The duplicated name.
        name: String,
    },

    /// Name or comment not representable in the configured encoding.
    #[error("Encoding error: {message}")]
    Encoding {
        /// Description of the encoding error.
        message: String,
    },

    /// Deflate stream corruption or decompressed length mismatch.
    #[error("Decompression error: {message}")]
    Decompression {
        /// Description of the failure.
        message: String,
    },

    /// Entry name that is empty or otherwise unusable.
    #[error("Invalid entry name: '{name}'")]
    InvalidEntryName {
        /// The rejected name.
        name: String,
    },

    /// Entry not found in archive.
    #[error("Entry not found: {name}")]
    EntryNotFound {
        /// Name of the missing entry.
        name: String,
    },

    /// Path traversal attack detected (e.g., "../" in filename).
    #[error("Path traversal detected in entry: {path}")]
    PathTraversal {
        /// The suspicious path.
        path: String,
    },

    /// Extraction target exists and the overwrite policy forbids replacing it.
    #[error("Destination already exists: {}", path.display())]
    DestinationExists {
        /// The existing file.
        path: PathBuf,
    },

    /// Operation not valid in the archive's current state.
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Description of the state violation.
        message: String,
    },

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type alias for OxiZip operations.
pub type Result<T> = std::result::Result<T, OxiZipError>;

impl From<io::Error> for OxiZipError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::CorruptArchive {
                message: format!("truncated record: {}", err),
            }
        } else {
            Self::Io(err)
        }
    }
}

impl OxiZipError {
    /// Create a corrupt archive error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::CorruptArchive {
            message: message.into(),
        }
    }

    /// Create a bad password error.
    pub fn bad_password(entry: impl Into<String>) -> Self {
        Self::BadPassword {
            entry: entry.into(),
        }
    }

    /// Create a password required error.
    pub fn password_required(entry: impl Into<String>) -> Self {
        Self::PasswordRequired {
            entry: entry.into(),
        }
    }

    /// Create an unsupported feature error.
    pub fn unsupported(feature: impl Into<String>) -> Self {
        Self::UnsupportedFeature {
            feature: feature.into(),
        }
    }

    /// Create a name collision error.
    pub fn name_collision(name: impl Into<String>) -> Self {
        Self::NameCollision { name: name.into() }
    }

    /// Create an encoding error.
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Create a decompression error.
    pub fn decompression(message: impl Into<String>) -> Self {
        Self::Decompression {
            message: message.into(),
        }
    }

    /// Create an invalid entry name error.
    pub fn invalid_name(name: impl Into<String>) -> Self {
        Self::InvalidEntryName { name: name.into() }
    }

    /// Create an entry not found error.
    pub fn entry_not_found(name: impl Into<String>) -> Self {
        Self::EntryNotFound { name: name.into() }
    }

    /// Create a path traversal error.
    pub fn path_traversal(path: impl Into<String>) -> Self {
        Self::PathTraversal { path: path.into() }
    }

    /// Create a destination exists error.
    pub fn destination_exists(path: impl Into<PathBuf>) -> Self {
        Self::DestinationExists { path: path.into() }
    }

    /// Create an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Whether this error means the supplied password was wrong or missing.
    pub fn is_password_error(&self) -> bool {
        matches!(self, Self::BadPassword { .. } | Self::PasswordRequired { .. })
    }
}
