//! Configuration values for writing, saving and extracting.
//!
//! Options are plain values captured when an operation starts. Changing an
//! [`ArchiveOptions`] after an entry was added does not affect that entry.

use super::compression::CompressionLevel;
use super::encryption::{Encryption, Password};
use super::text::{EncodingPolicy, TextEncoding};
use oxizip_core::cancel::CancellationToken;
use oxizip_core::datetime::DosDateTime;
use oxizip_core::progress::{NoProgress, ProgressSink};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Shared progress sink.
pub type SharedProgress = Arc<dyn ProgressSink + Send + Sync>;

fn sink_or_silent(progress: &Option<SharedProgress>) -> &dyn ProgressSink {
    match progress {
        Some(sink) => &**sink,
        None => &NoProgress,
    }
}

/// Write configuration of one entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryOptions {
    /// Compression level.
    pub compression: CompressionLevel,
    /// Encryption algorithm.
    pub encryption: Encryption,
    /// Password used when `encryption` is not `None`.
    pub password: Option<Password>,
    /// How the name and comment are encoded.
    pub encoding: EncodingPolicy,
    /// Entry comment.
    pub comment: String,
    /// Modification time; the time of writing when unset.
    pub modified: Option<DosDateTime>,
    /// Unix permission bits.
    pub unix_mode: Option<u32>,
    /// Always write a Zip64 extra field in the local header.
    pub large_file: bool,
}

impl EntryOptions {
    /// Defaults: deflate at normal level, no encryption, CP437 as necessary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the compression level.
    pub fn compression(mut self, level: CompressionLevel) -> Self {
        self.compression = level;
        self
    }

    /// Set the encryption algorithm. `Encryption::None` also drops any
    /// password.
    pub fn encryption(mut self, encryption: Encryption) -> Self {
        self.encryption = encryption;
        if encryption == Encryption::None {
            self.password = None;
        }
        self
    }

    /// Set the password. Selects traditional encryption unless an algorithm
    /// was already chosen.
    pub fn password(mut self, password: impl Into<Password>) -> Self {
        self.password = Some(password.into());
        if self.encryption == Encryption::None {
            self.encryption = Encryption::Traditional;
        }
        self
    }

    /// Set the encoding policy.
    pub fn encoding(mut self, policy: EncodingPolicy) -> Self {
        self.encoding = policy;
        self
    }

    /// Set the entry comment.
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Set the modification time.
    pub fn modified(mut self, modified: DosDateTime) -> Self {
        self.modified = Some(modified);
        self
    }

    /// Set the Unix permission bits.
    pub fn unix_mode(mut self, mode: u32) -> Self {
        self.unix_mode = Some(mode);
        self
    }

    /// Force a Zip64 local header.
    pub fn large_file(mut self, large: bool) -> Self {
        self.large_file = large;
        self
    }

    /// Password, if encryption is on.
    pub fn active_password(&self) -> Option<&Password> {
        if self.encryption.is_encrypted() {
            self.password.as_ref()
        } else {
            None
        }
    }
}

/// What happens when an added entry has the name of an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateNamePolicy {
    /// Fail with `NameCollision`.
    #[default]
    Reject,
    /// Replace the existing entry.
    Replace,
    /// Keep both.
    Allow,
}

/// Archive-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOptions {
    /// Options applied by the `add_*` shorthands.
    pub default_entry: EntryOptions,
    /// Encoding of the archive comment.
    pub comment_encoding: TextEncoding,
    /// Encoding of names without the Unicode flag when reading.
    pub fallback_encoding: TextEncoding,
    /// Duplicate name handling.
    pub duplicates: DuplicateNamePolicy,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            default_entry: EntryOptions::default(),
            comment_encoding: TextEncoding::Cp437,
            fallback_encoding: TextEncoding::Cp437,
            duplicates: DuplicateNamePolicy::default(),
        }
    }
}

impl ArchiveOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default entry options.
    pub fn with_default_entry(mut self, options: EntryOptions) -> Self {
        self.default_entry = options;
        self
    }

    /// Set the archive comment encoding.
    pub fn with_comment_encoding(mut self, encoding: TextEncoding) -> Self {
        self.comment_encoding = encoding;
        self
    }

    /// Set the read fallback encoding.
    pub fn with_fallback_encoding(mut self, encoding: TextEncoding) -> Self {
        self.fallback_encoding = encoding;
        self
    }

    /// Set the duplicate name policy.
    pub fn with_duplicates(mut self, policy: DuplicateNamePolicy) -> Self {
        self.duplicates = policy;
        self
    }
}

/// Options for one save.
#[derive(Clone, Default)]
pub struct SaveOptions {
    /// Progress receiver.
    pub progress: Option<SharedProgress>,
    /// Cancellation flag, polled between entries.
    pub cancel: Option<CancellationToken>,
}

impl SaveOptions {
    /// No progress, no cancellation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report progress to `sink`.
    pub fn with_progress(mut self, sink: SharedProgress) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Poll `token`.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The progress receiver, or [`NoProgress`] when none is set.
    pub fn sink(&self) -> &dyn ProgressSink {
        sink_or_silent(&self.progress)
    }
}

impl fmt::Debug for SaveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveOptions")
            .field("progress", &self.progress.is_some())
            .field("cancel", &self.cancel)
            .finish()
    }
}

/// Answer of an overwrite prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptDecision {
    /// Replace the existing file.
    Overwrite,
    /// Keep the existing file.
    Skip,
    /// Stop the extraction with `Cancelled`.
    Abort,
}

/// Callback deciding about one existing destination file.
pub type PromptFn = Arc<dyn Fn(&Path) -> PromptDecision + Send + Sync>;

/// What happens when a destination file exists.
#[derive(Clone, Default)]
pub enum OverwritePolicy {
    /// Fail with `DestinationExists`.
    #[default]
    Fail,
    /// Replace it.
    Overwrite,
    /// Leave it and count the entry as skipped.
    Skip,
    /// Ask the callback.
    Prompt(PromptFn),
}

impl fmt::Debug for OverwritePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fail => f.write_str("Fail"),
            Self::Overwrite => f.write_str("Overwrite"),
            Self::Skip => f.write_str("Skip"),
            Self::Prompt(_) => f.write_str("Prompt(..)"),
        }
    }
}

/// What happens when one entry fails to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Return the first error, leaving later entries unextracted.
    StopOnFirst,
    /// Record the error and carry on with the next entry.
    #[default]
    Continue,
}

/// Options for extraction.
#[derive(Clone, Default)]
pub struct ExtractOptions {
    /// Existing destination files.
    pub overwrite: OverwritePolicy,
    /// Per-entry failures.
    pub failure: FailurePolicy,
    /// Set the file modification time from the entry.
    pub restore_mtime: bool,
    /// Password for every encrypted entry.
    pub password: Option<Password>,
    /// Per-entry passwords, taking precedence over `password`.
    pub entry_passwords: HashMap<String, Password>,
    /// Progress receiver.
    pub progress: Option<SharedProgress>,
    /// Cancellation flag, polled between entries and chunks.
    pub cancel: Option<CancellationToken>,
}

impl ExtractOptions {
    /// Fail on existing files, continue past failed entries, restore times.
    pub fn new() -> Self {
        Self {
            restore_mtime: true,
            ..Self::default()
        }
    }

    /// Set the overwrite policy.
    pub fn overwrite(mut self, policy: OverwritePolicy) -> Self {
        self.overwrite = policy;
        self
    }

    /// Set the failure policy.
    pub fn failure(mut self, policy: FailurePolicy) -> Self {
        self.failure = policy;
        self
    }

    /// Restore modification times.
    pub fn restore_mtime(mut self, restore: bool) -> Self {
        self.restore_mtime = restore;
        self
    }

    /// Password for all encrypted entries.
    pub fn password(mut self, password: impl Into<Password>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Password for one entry.
    pub fn entry_password(mut self, name: impl Into<String>, password: impl Into<Password>) -> Self {
        self.entry_passwords.insert(name.into(), password.into());
        self
    }

    /// Report progress to `sink`.
    pub fn with_progress(mut self, sink: SharedProgress) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Poll `token`.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The progress receiver, or [`NoProgress`] when none is set.
    pub fn sink(&self) -> &dyn ProgressSink {
        sink_or_silent(&self.progress)
    }

    /// Password to try for `name`.
    pub fn password_for(&self, name: &str) -> Option<&Password> {
        self.entry_passwords.get(name).or(self.password.as_ref())
    }
}

impl fmt::Debug for ExtractOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractOptions")
            .field("overwrite", &self.overwrite)
            .field("failure", &self.failure)
            .field("restore_mtime", &self.restore_mtime)
            .field("password", &self.password)
            .field("entry_passwords", &self.entry_passwords.len())
            .field("progress", &self.progress.is_some())
            .field("cancel", &self.cancel)
            .finish()
    }
}
