//! The archive orchestrator.
//!
//! [`ZipArchive`] keeps an ordered list of entries. Entries read from an
//! existing archive stay in the backing file until the next save, where they
//! are copied byte for byte; entries added since then are compressed and
//! encrypted during the save with the [`EntryOptions`] captured when they
//! were added.
//!
//! ```text
//! Empty --add--> Populated --save--> Saved --add/remove--> Populated
//!                                      ^
//! open ------------------------> ReopenedForUpdate
//! ```
//!
//! Reading and extraction need an archive that matches its backing file,
//! i.e. the `Saved` or `ReopenedForUpdate` state.

use super::compression::{CHUNK_SIZE, CompressionMethod};
use super::encryption::{Encryption, Password};
use super::entry::{self, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, ZipEntry};
use super::extract::{self, ExtractReport, Extracted};
use super::header::{FLAG_ENCRYPTED, FLAG_UNICODE};
use super::options::{
    ArchiveOptions, DuplicateNamePolicy, EntryOptions, ExtractOptions, SaveOptions,
};
use super::reader::ZipReader;
use super::text;
use super::writer::{self, PreparedEntry, StreamingSink, ZipWriter};
use oxizip_core::cancel::CancellationToken;
use oxizip_core::datetime::DosDateTime;
use oxizip_core::error::{OxiZipError, Result};
use oxizip_core::progress::ArchiveEvent;
use std::borrow::Cow;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// A readable, seekable and sendable source.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Lifecycle state of a [`ZipArchive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveState {
    /// Created, nothing added.
    Empty,
    /// Modified since the last save or open.
    Populated,
    /// Written to disk and reloaded from there.
    Saved,
    /// Opened from an existing archive and not modified yet.
    ReopenedForUpdate,
}

impl fmt::Display for ArchiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Empty => "empty",
            Self::Populated => "populated",
            Self::Saved => "saved",
            Self::ReopenedForUpdate => "reopened for update",
        };
        f.write_str(name)
    }
}

enum PendingData {
    Bytes(Vec<u8>),
    File(PathBuf),
    Directory,
}

enum Source {
    /// Entry `index` of the backing archive.
    Existing(usize),
    Pending {
        data: PendingData,
        options: EntryOptions,
    },
}

struct Slot {
    entry: ZipEntry,
    source: Source,
}

/// Result of [`ZipArchive::test_entries`].
#[derive(Debug, Default)]
pub struct TestReport {
    /// Entries decoded.
    pub tested: usize,
    /// Entries that failed, with their errors.
    pub failures: Vec<(String, OxiZipError)>,
}

impl TestReport {
    /// Whether every entry decoded with a matching CRC.
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// An editable ZIP archive.
pub struct ZipArchive {
    slots: Vec<Slot>,
    backing: Option<ZipReader<Box<dyn ReadSeek>>>,
    path: Option<PathBuf>,
    comment: String,
    raw_comment: Vec<u8>,
    options: ArchiveOptions,
    state: ArchiveState,
}

impl fmt::Debug for ZipArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZipArchive")
            .field("entries", &self.slots.len())
            .field("path", &self.path)
            .field("state", &self.state)
            .finish()
    }
}

impl Default for ZipArchive {
    fn default() -> Self {
        Self::new()
    }
}

impl ZipArchive {
    /// An empty archive with default options.
    pub fn new() -> Self {
        Self::with_options(ArchiveOptions::default())
    }

    /// An empty archive.
    pub fn with_options(options: ArchiveOptions) -> Self {
        Self {
            slots: Vec::new(),
            backing: None,
            path: None,
            comment: String::new(),
            raw_comment: Vec::new(),
            options,
            state: ArchiveState::Empty,
        }
    }

    /// Open the archive at `path` for reading and updating.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, ArchiveOptions::default())
    }

    /// Open the archive at `path`. `options.fallback_encoding` decodes names
    /// without the Unicode flag.
    pub fn open_with(path: impl AsRef<Path>, options: ArchiveOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut archive = Self::from_reader(BufReader::new(file), options)?;
        archive.path = Some(path.to_path_buf());
        Ok(archive)
    }

    /// Open an archive held in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_reader(Cursor::new(bytes), ArchiveOptions::default())
    }

    /// Open an archive from any seekable source.
    pub fn from_reader(reader: impl ReadSeek + 'static, options: ArchiveOptions) -> Result<Self> {
        let mut archive = Self::with_options(options);
        archive.load(Box::new(reader))?;
        archive.state = ArchiveState::ReopenedForUpdate;
        Ok(archive)
    }

    fn load(&mut self, reader: Box<dyn ReadSeek>) -> Result<()> {
        let backing = ZipReader::with_fallback(reader, self.options.fallback_encoding)?;
        self.slots = backing
            .entries()
            .iter()
            .enumerate()
            .map(|(index, entry)| Slot {
                entry: entry.clone(),
                source: Source::Existing(index),
            })
            .collect();
        self.comment = backing.comment().to_string();
        self.raw_comment = backing.raw_comment().to_vec();
        log::debug!("loaded {} entries", self.slots.len());
        self.backing = Some(backing);
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ArchiveState {
        self.state
    }

    /// Archive-wide options.
    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    /// Path the archive was opened from or last saved to.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Entries in central directory order.
    pub fn entries(&self) -> impl ExactSizeIterator<Item = &ZipEntry> + '_ {
        self.slots.iter().map(|slot| &slot.entry)
    }

    /// First entry called `name`.
    pub fn entry(&self, name: &str) -> Option<&ZipEntry> {
        self.position(name).map(|i| &self.slots[i].entry)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the archive has no entries.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Archive comment.
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Set the archive comment, encoded with the archive comment encoding.
    pub fn set_comment(&mut self, comment: impl Into<String>) -> Result<()> {
        let comment = comment.into();
        let encoding = self.options.comment_encoding;
        let bytes = encoding.encode_lossless(&comment).ok_or_else(|| {
            OxiZipError::encoding(format!("archive comment is not representable in {}", encoding))
        })?;
        if bytes.len() > u16::MAX as usize {
            return Err(OxiZipError::unsupported("archive comment longer than 65535 bytes"));
        }
        self.comment = comment;
        self.raw_comment = bytes;
        self.touch();
        Ok(())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|slot| slot.entry.name == name)
    }

    fn touch(&mut self) {
        self.state = ArchiveState::Populated;
    }

    fn insert(&mut self, slot: Slot) -> Result<()> {
        match (self.position(&slot.entry.name), self.options.duplicates) {
            (Some(_), DuplicateNamePolicy::Reject) => {
                return Err(OxiZipError::name_collision(&slot.entry.name));
            }
            (Some(index), DuplicateNamePolicy::Replace) => {
                log::debug!("replacing entry '{}'", slot.entry.name);
                self.slots[index] = slot;
            }
            _ => {
                log::debug!("added entry '{}'", slot.entry.name);
                self.slots.push(slot);
            }
        }
        self.touch();
        Ok(())
    }

    fn add_pending(
        &mut self,
        name: &str,
        data: PendingData,
        size: u64,
        options: &EntryOptions,
    ) -> Result<()> {
        let is_dir = matches!(data, PendingData::Directory);
        let mut options = options.clone();
        let modified = *options.modified.get_or_insert_with(DosDateTime::now);
        let entry = provisional_entry(name, is_dir, size, modified, &options)?;
        self.insert(Slot {
            entry,
            source: Source::Pending { data, options },
        })
    }

    /// Add an entry from memory with the default entry options.
    pub fn add_bytes(&mut self, name: &str, data: impl Into<Vec<u8>>) -> Result<()> {
        let options = self.options.default_entry.clone();
        self.add_bytes_with(name, data, &options)
    }

    /// Add an entry from memory.
    pub fn add_bytes_with(
        &mut self,
        name: &str,
        data: impl Into<Vec<u8>>,
        options: &EntryOptions,
    ) -> Result<()> {
        let data = data.into();
        let size = data.len() as u64;
        self.add_pending(name, PendingData::Bytes(data), size, options)
    }

    /// Add an entry with the content of `reader`, read to the end now.
    pub fn add_reader<R: Read>(
        &mut self,
        name: &str,
        mut reader: R,
        options: &EntryOptions,
    ) -> Result<()> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        self.add_bytes_with(name, data, options)
    }

    /// Add the file at `path` as `name` with the default entry options.
    pub fn add_file(&mut self, path: impl AsRef<Path>, name: &str) -> Result<()> {
        let options = self.options.default_entry.clone();
        self.add_file_with(path, name, &options)
    }

    /// Add the file at `path` as `name`.
    ///
    /// The content is read when the archive is saved, streamed in chunks
    /// unless the `parallel` feature is enabled. Modification time and
    /// permissions come from the file unless `options` sets them.
    pub fn add_file_with(
        &mut self,
        path: impl AsRef<Path>,
        name: &str,
        options: &EntryOptions,
    ) -> Result<()> {
        let path = path.as_ref();
        let metadata = fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(OxiZipError::invalid_name(path.display().to_string()));
        }
        let options = with_file_metadata(options, &metadata);
        self.add_pending(
            name,
            PendingData::File(path.to_path_buf()),
            metadata.len(),
            &options,
        )
    }

    /// Add a directory entry.
    pub fn add_directory_entry(&mut self, name: &str) -> Result<()> {
        let options = self.options.default_entry.clone();
        self.add_pending(name, PendingData::Directory, 0, &options)
    }

    /// Add the tree below `dir`, sorted by name, under `prefix`.
    ///
    /// Returns the number of entries added. Symbolic links are skipped.
    pub fn add_directory(&mut self, dir: impl AsRef<Path>, prefix: &str) -> Result<usize> {
        let dir = dir.as_ref();
        let options = self.options.default_entry.clone();
        let prefix = prefix.trim_matches('/');
        let mut added = 0;

        for item in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
            let item = item.map_err(io::Error::from)?;
            let relative = item
                .path()
                .strip_prefix(dir)
                .map_err(|_| OxiZipError::invalid_name(item.path().display().to_string()))?;
            let mut name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if !prefix.is_empty() {
                name = format!("{}/{}", prefix, name);
            }

            let file_type = item.file_type();
            if file_type.is_dir() {
                let metadata = item.metadata().map_err(io::Error::from)?;
                let options = with_file_metadata(&options, &metadata);
                self.add_pending(&name, PendingData::Directory, 0, &options)?;
            } else if file_type.is_file() {
                self.add_file_with(item.path(), &name, &options)?;
            } else {
                log::warn!("skipping {}: not a regular file", item.path().display());
                continue;
            }
            added += 1;
        }
        Ok(added)
    }

    /// Remove the first entry called `name`.
    pub fn remove_entry(&mut self, name: &str) -> Result<ZipEntry> {
        let index = self
            .position(name)
            .ok_or_else(|| OxiZipError::entry_not_found(name))?;
        let slot = self.slots.remove(index);
        log::debug!("removed entry '{}'", name);
        self.touch();
        Ok(slot.entry)
    }

    /// Re-encode entry `name` with new options on the next save.
    ///
    /// An entry from the backing archive is decrypted with `password` now,
    /// so switching it to another algorithm, password or level is possible.
    /// The modification time is kept unless `options` sets one.
    pub fn update_entry_options(
        &mut self,
        name: &str,
        options: &EntryOptions,
        password: Option<&Password>,
    ) -> Result<()> {
        let index = self
            .position(name)
            .ok_or_else(|| OxiZipError::entry_not_found(name))?;

        let previous = &self.slots[index].entry;
        let mut options = options.clone();
        let modified = *options.modified.get_or_insert(previous.modified);
        if options.unix_mode.is_none() {
            options.unix_mode = previous.unix_mode().map(|m| m & 0o7777);
        }
        if options.comment.is_empty() {
            options.comment = previous.comment.clone();
        }
        let entry = provisional_entry(name, previous.is_dir, previous.size, modified, &options)?;

        let data = match &mut self.slots[index].source {
            Source::Existing(_) if entry.is_dir => PendingData::Directory,
            Source::Existing(backing_index) => {
                let backing_index = *backing_index;
                let backing = self
                    .backing
                    .as_mut()
                    .ok_or_else(|| OxiZipError::invalid_state("backing archive is gone"))?;
                PendingData::Bytes(backing.read_entry(backing_index, password)?)
            }
            Source::Pending { data, .. } => std::mem::replace(data, PendingData::Directory),
        };

        self.slots[index] = Slot {
            entry,
            source: Source::Pending { data, options },
        };
        log::debug!("updated options of '{}'", name);
        self.touch();
        Ok(())
    }

    /// Save to the path the archive was opened from or last saved to.
    pub fn save(&mut self) -> Result<()> {
        self.save_with(&SaveOptions::default())
    }

    /// [`save`](Self::save) with progress and cancellation.
    pub fn save_with(&mut self, options: &SaveOptions) -> Result<()> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| OxiZipError::invalid_state("archive has no path, use save_as"))?;
        self.save_as_with(path, options)
    }

    /// Save to `path` and reload the archive from there.
    pub fn save_as(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.save_as_with(path, &SaveOptions::default())
    }

    /// [`save_as`](Self::save_as) with progress and cancellation.
    ///
    /// The archive is written to a temporary file next to `path` and renamed
    /// over it once complete. On failure `path` is left untouched.
    pub fn save_as_with(&mut self, path: impl AsRef<Path>, options: &SaveOptions) -> Result<()> {
        let path = path.as_ref();
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut temp = tempfile::Builder::new()
            .prefix(".oxizip-")
            .suffix(".tmp")
            .tempfile_in(parent)?;
        {
            let mut out = self.write_to_with(BufWriter::new(temp.as_file_mut()), options)?;
            out.flush()?;
        }
        temp.as_file().sync_all()?;

        // The backing file may be the destination
        let backing = self.backing.take();
        if let Err(err) = temp.persist(path) {
            self.backing = backing;
            return Err(err.error.into());
        }
        drop(backing);

        let file = File::open(path)?;
        self.load(Box::new(BufReader::new(file)))?;
        self.path = Some(path.to_path_buf());
        self.state = ArchiveState::Saved;
        log::debug!("saved {} entries to {}", self.slots.len(), path.display());
        Ok(())
    }

    /// Write the archive to `sink`. The archive itself is not changed.
    pub fn write_to<W: Write>(&mut self, sink: W) -> Result<W> {
        self.write_to_with(sink, &SaveOptions::default())
    }

    /// [`write_to`](Self::write_to) with progress and cancellation.
    pub fn write_to_with<W: Write>(&mut self, sink: W, options: &SaveOptions) -> Result<W> {
        let cancel = options.cancel.as_ref();
        emit(
            options,
            ArchiveEvent::SaveStarted {
                entries: self.slots.len(),
            },
        );

        let mut jobs = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            check(cancel)?;
            jobs.push(Job::gather(slot)?);
        }

        #[cfg(feature = "parallel")]
        let prepared: Vec<Result<Option<PreparedEntry>>> =
            jobs.par_iter().map(|job| job.prepare(cancel)).collect();
        #[cfg(not(feature = "parallel"))]
        let prepared: Vec<Result<Option<PreparedEntry>>> =
            jobs.iter().map(|job| job.prepare(cancel)).collect();

        let mut writer = ZipWriter::streaming(sink);
        writer.allow_duplicate_names(true);
        writer.set_raw_comment(self.raw_comment.clone());

        for (index, (job, prepared)) in jobs.iter().zip(prepared).enumerate() {
            check(cancel)?;
            let slot = &self.slots[index];
            match (job, prepared?) {
                (Job::Copy(backing_index), _) => {
                    let backing = self
                        .backing
                        .as_mut()
                        .ok_or_else(|| OxiZipError::invalid_state("backing archive is gone"))?;
                    writer.raw_copy(backing, *backing_index)?;
                }
                (
                    Job::Stream {
                        name,
                        path,
                        options,
                    },
                    _,
                ) => stream_file(&mut writer, name, path, options, cancel)?,
                (_, Some(entry)) => writer.write_prepared(entry)?,
                (_, None) => {
                    return Err(OxiZipError::invalid_state(format!(
                        "entry '{}' was not prepared",
                        slot.entry.name
                    )));
                }
            }
            emit(
                options,
                ArchiveEvent::EntrySaved {
                    index,
                    name: &slot.entry.name,
                    size: slot.entry.size,
                },
            );
        }

        let mut sink = writer.finish()?;
        let bytes = sink.stream_position()?;
        emit(
            options,
            ArchiveEvent::SaveCompleted {
                entries: self.slots.len(),
                bytes,
            },
        );
        Ok(sink.into_inner())
    }

    /// The archive as it would be saved.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        self.write_to(Vec::new())
    }

    fn readable(&mut self, name: &str) -> Result<(&mut ZipReader<Box<dyn ReadSeek>>, usize)> {
        self.require_readable()?;
        let index = self
            .position(name)
            .ok_or_else(|| OxiZipError::entry_not_found(name))?;
        let Source::Existing(backing_index) = self.slots[index].source else {
            return Err(OxiZipError::invalid_state(format!(
                "entry '{}' has not been saved",
                name
            )));
        };
        let backing = self
            .backing
            .as_mut()
            .ok_or_else(|| OxiZipError::invalid_state("archive has no backing file"))?;
        Ok((backing, backing_index))
    }

    fn require_readable(&self) -> Result<()> {
        match self.state {
            ArchiveState::Saved | ArchiveState::ReopenedForUpdate => Ok(()),
            state => Err(OxiZipError::invalid_state(format!(
                "cannot read from an archive that is {}; save it first",
                state
            ))),
        }
    }

    /// Decrypt and decompress entry `name`.
    pub fn read_entry(&mut self, name: &str, password: Option<&Password>) -> Result<Vec<u8>> {
        let (backing, index) = self.readable(name)?;
        backing.read_entry(index, password)
    }

    /// Decode every entry and check its CRC.
    pub fn test_entries(&mut self, password: Option<&Password>) -> Result<TestReport> {
        self.require_readable()?;
        let backing = self
            .backing
            .as_mut()
            .ok_or_else(|| OxiZipError::invalid_state("archive has no backing file"))?;

        let mut report = TestReport::default();
        for index in 0..backing.len() {
            let name = backing.entries()[index].name.clone();
            match backing.test_entry(index, password) {
                Ok(()) => log::debug!("'{}' is intact", name),
                Err(err) => report.failures.push((name, err)),
            }
            report.tested += 1;
        }
        Ok(report)
    }

    /// Extract entry `name` below `root`.
    pub fn extract_entry(
        &mut self,
        name: &str,
        root: impl AsRef<Path>,
        options: &ExtractOptions,
    ) -> Result<Extracted> {
        let (backing, index) = self.readable(name)?;
        extract::extract_entry(backing, index, root.as_ref(), options)
    }

    /// Extract every entry below `root`.
    ///
    /// Failed entries are collected in the report unless `options` asks for
    /// [`FailurePolicy::StopOnFirst`](super::options::FailurePolicy::StopOnFirst).
    pub fn extract_all(
        &mut self,
        root: impl AsRef<Path>,
        options: &ExtractOptions,
    ) -> Result<ExtractReport> {
        self.require_readable()?;
        let backing = self
            .backing
            .as_mut()
            .ok_or_else(|| OxiZipError::invalid_state("archive has no backing file"))?;
        extract::extract_all(backing, root.as_ref(), options)
    }
}

/// Work item of one save.
enum Job<'a> {
    Copy(usize),
    /// File content copied from disk while writing. Parallel saves compress
    /// files in memory instead.
    Stream {
        name: &'a str,
        path: &'a Path,
        options: &'a EntryOptions,
    },
    Build {
        name: &'a str,
        data: Cow<'a, [u8]>,
        options: &'a EntryOptions,
        is_dir: bool,
    },
}

impl<'a> Job<'a> {
    fn gather(slot: &'a Slot) -> Result<Self> {
        let (data, options) = match &slot.source {
            Source::Existing(index) => return Ok(Job::Copy(*index)),
            Source::Pending { data, options } => (data, options),
        };
        let (data, is_dir) = match data {
            PendingData::Bytes(bytes) => (Cow::Borrowed(bytes.as_slice()), false),
            PendingData::File(path) if !cfg!(feature = "parallel") => {
                return Ok(Job::Stream {
                    name: &slot.entry.name,
                    path,
                    options,
                });
            }
            PendingData::File(path) => (Cow::Owned(fs::read(path)?), false),
            PendingData::Directory => (Cow::Borrowed(&[][..]), true),
        };
        Ok(Job::Build {
            name: &slot.entry.name,
            data,
            options,
            is_dir,
        })
    }

    fn prepare(&self, cancel: Option<&CancellationToken>) -> Result<Option<PreparedEntry>> {
        check(cancel)?;
        match self {
            Job::Copy(_) | Job::Stream { .. } => Ok(None),
            Job::Build {
                name,
                options,
                is_dir: true,
                ..
            } => writer::prepare_directory(name, options).map(Some),
            Job::Build {
                name,
                data,
                options,
                ..
            } => writer::prepare_entry(name, data, options).map(Some),
        }
    }
}

fn stream_file<W: Write>(
    writer: &mut ZipWriter<StreamingSink<W>>,
    name: &str,
    path: &Path,
    options: &EntryOptions,
    cancel: Option<&CancellationToken>,
) -> Result<()> {
    let mut file = BufReader::new(File::open(path)?);
    writer.start_entry(name, options)?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        check(cancel)?;
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n])?;
    }
    writer.finish_entry()
}

fn check(cancel: Option<&CancellationToken>) -> Result<()> {
    cancel.map_or(Ok(()), CancellationToken::check)
}

fn emit(options: &SaveOptions, event: ArchiveEvent<'_>) {
    options.sink().on_event(&event);
}

fn with_file_metadata(options: &EntryOptions, metadata: &fs::Metadata) -> EntryOptions {
    let mut options = options.clone();
    if options.modified.is_none() {
        options.modified = metadata.modified().ok().map(DosDateTime::from_system_time);
    }
    #[cfg(unix)]
    if options.unix_mode.is_none() {
        use std::os::unix::fs::PermissionsExt;
        options.unix_mode = Some(metadata.permissions().mode() & 0o7777);
    }
    options
}

/// Metadata of an entry that has not been written yet. Sizes after
/// compression and the CRC are filled in by the next save.
fn provisional_entry(
    name: &str,
    is_dir: bool,
    size: u64,
    modified: DosDateTime,
    options: &EntryOptions,
) -> Result<ZipEntry> {
    let mut name = writer::normalize_name(name)?;
    if is_dir && !name.ends_with('/') {
        name.push('/');
    }
    let text = text::encode_entry_text(&name, &options.comment, &options.encoding)?;

    let (method, encryption) = if is_dir {
        (CompressionMethod::Stored, Encryption::None)
    } else {
        (options.compression.method(), options.encryption)
    };
    if encryption.is_encrypted() && options.active_password().is_none() {
        return Err(OxiZipError::password_required(&name));
    }

    let mut flags = 0;
    if text.unicode {
        flags |= FLAG_UNICODE;
    }
    if encryption.is_encrypted() {
        flags |= FLAG_ENCRYPTED;
    }

    let external_attr = if is_dir {
        entry::dir_attributes(options.unix_mode.unwrap_or(DEFAULT_DIR_MODE))
    } else {
        entry::file_attributes(options.unix_mode.unwrap_or(DEFAULT_FILE_MODE))
    };

    Ok(ZipEntry {
        name,
        is_dir,
        size,
        compressed_size: 0,
        crc32: 0,
        modified,
        method,
        flags,
        encryption,
        text_encoding: text.encoding,
        comment: options.comment.clone(),
        external_attr,
        header_offset: 0,
        extra: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::aes::AesStrength;
    use crate::zip::compression::CompressionLevel;
    use std::sync::{Arc, Mutex};

    fn stamp() -> DosDateTime {
        DosDateTime::from_fields(2023, 6, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_state_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.zip");

        let mut archive = ZipArchive::new();
        assert_eq!(archive.state(), ArchiveState::Empty);

        archive.add_bytes("a.txt", b"alpha".to_vec()).unwrap();
        assert_eq!(archive.state(), ArchiveState::Populated);
        assert!(matches!(
            archive.read_entry("a.txt", None),
            Err(OxiZipError::InvalidState { .. })
        ));

        archive.save_as(&path).unwrap();
        assert_eq!(archive.state(), ArchiveState::Saved);
        assert_eq!(archive.read_entry("a.txt", None).unwrap(), b"alpha");

        let mut reopened = ZipArchive::open(&path).unwrap();
        assert_eq!(reopened.state(), ArchiveState::ReopenedForUpdate);
        reopened.add_bytes("b.txt", b"beta".to_vec()).unwrap();
        assert_eq!(reopened.state(), ArchiveState::Populated);
        reopened.save().unwrap();
        assert_eq!(reopened.state(), ArchiveState::Saved);
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.read_entry("a.txt", None).unwrap(), b"alpha");
        assert_eq!(reopened.read_entry("b.txt", None).unwrap(), b"beta");
    }

    #[test]
    fn test_save_without_path() {
        let mut archive = ZipArchive::new();
        archive.add_bytes("x", b"x".to_vec()).unwrap();
        assert!(matches!(
            archive.save(),
            Err(OxiZipError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_duplicate_policies() {
        let mut archive = ZipArchive::new();
        archive.add_bytes("a.txt", b"1".to_vec()).unwrap();
        assert!(matches!(
            archive.add_bytes("a.txt", b"2".to_vec()),
            Err(OxiZipError::NameCollision { .. })
        ));

        let mut archive =
            ZipArchive::with_options(ArchiveOptions::new().with_duplicates(DuplicateNamePolicy::Replace));
        archive.add_bytes("a.txt", b"1".to_vec()).unwrap();
        archive.add_bytes("b.txt", b"b".to_vec()).unwrap();
        archive.add_bytes("a.txt", b"22".to_vec()).unwrap();
        let names: Vec<_> = archive.entries().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a.txt", "b.txt"]);
        assert_eq!(archive.entry("a.txt").unwrap().size, 2);

        let mut archive =
            ZipArchive::with_options(ArchiveOptions::new().with_duplicates(DuplicateNamePolicy::Allow));
        archive.add_bytes("a.txt", b"1".to_vec()).unwrap();
        archive.add_bytes("a.txt", b"2".to_vec()).unwrap();
        let bytes = archive.to_bytes().unwrap();
        assert_eq!(ZipArchive::from_bytes(bytes).unwrap().len(), 2);
    }

    #[test]
    fn test_remove_and_count() {
        let mut archive = ZipArchive::new();
        for i in 0..5 {
            archive
                .add_bytes(&format!("file{}.txt", i), format!("content {}", i))
                .unwrap();
        }
        archive.remove_entry("file2.txt").unwrap();
        assert!(matches!(
            archive.remove_entry("file2.txt"),
            Err(OxiZipError::EntryNotFound { .. })
        ));

        let mut reopened = ZipArchive::from_bytes(archive.to_bytes().unwrap()).unwrap();
        assert_eq!(reopened.len(), 4);
        assert!(reopened.entry("file2.txt").is_none());
        assert_eq!(reopened.read_entry("file4.txt", None).unwrap(), b"content 4");
    }

    #[test]
    fn test_update_entry_options_reencrypts() {
        let mut archive = ZipArchive::new();
        archive
            .add_bytes_with(
                "secret.txt",
                b"the secret".to_vec(),
                &EntryOptions::new().password("old").modified(stamp()),
            )
            .unwrap();
        let mut reopened = ZipArchive::from_bytes(archive.to_bytes().unwrap()).unwrap();

        let aes = EntryOptions::new()
            .encryption(Encryption::Aes(AesStrength::Aes256))
            .password("new");
        assert!(
            reopened
                .update_entry_options("secret.txt", &aes, Some(&"wrong".into()))
                .unwrap_err()
                .is_password_error()
        );
        reopened
            .update_entry_options("secret.txt", &aes, Some(&"old".into()))
            .unwrap();
        assert_eq!(reopened.entry("secret.txt").unwrap().modified, stamp());

        let mut again = ZipArchive::from_bytes(reopened.to_bytes().unwrap()).unwrap();
        let entry = again.entry("secret.txt").unwrap().clone();
        assert_eq!(entry.encryption, Encryption::Aes(AesStrength::Aes256));
        assert_eq!(entry.modified, stamp());
        assert_eq!(
            again.read_entry("secret.txt", Some(&"new".into())).unwrap(),
            b"the secret"
        );
    }

    #[test]
    fn test_unchanged_entries_copy_without_password() {
        let mut archive = ZipArchive::new();
        archive
            .add_bytes_with("locked.bin", vec![1u8; 500], &EntryOptions::new().password("pw"))
            .unwrap();
        let mut reopened = ZipArchive::from_bytes(archive.to_bytes().unwrap()).unwrap();
        reopened.add_bytes("open.txt", b"open".to_vec()).unwrap();

        let mut again = ZipArchive::from_bytes(reopened.to_bytes().unwrap()).unwrap();
        assert_eq!(
            again.read_entry("locked.bin", Some(&"pw".into())).unwrap(),
            vec![1u8; 500]
        );
    }

    #[test]
    fn test_add_directory_tree() {
        let src = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("sub/deeper")).unwrap();
        fs::write(src.path().join("b.txt"), b"b").unwrap();
        fs::write(src.path().join("a.txt"), b"a").unwrap();
        fs::write(src.path().join("sub/deeper/c.txt"), b"c").unwrap();

        let mut archive = ZipArchive::new();
        let added = archive.add_directory(src.path(), "root").unwrap();
        assert_eq!(added, 5);
        let names: Vec<_> = archive.entries().map(|e| e.name.clone()).collect();
        assert_eq!(
            names,
            [
                "root/a.txt",
                "root/b.txt",
                "root/sub/",
                "root/sub/deeper/",
                "root/sub/deeper/c.txt"
            ]
        );

        let mut reopened = ZipArchive::from_bytes(archive.to_bytes().unwrap()).unwrap();
        assert!(reopened.entry("root/sub/").unwrap().is_dir);
        assert_eq!(reopened.read_entry("root/sub/deeper/c.txt", None).unwrap(), b"c");
    }

    #[test]
    fn test_encoding_error_at_add_time() {
        let mut archive = ZipArchive::with_options(ArchiveOptions::new().with_default_entry(
            EntryOptions::new().encoding(text::EncodingPolicy::Fixed(text::TextEncoding::Cp437)),
        ));
        assert!(matches!(
            archive.add_bytes("Привет.txt", b"x".to_vec()),
            Err(OxiZipError::Encoding { .. })
        ));
        assert!(archive.is_empty());
        assert_eq!(archive.state(), ArchiveState::Empty);
    }

    #[test]
    fn test_comment_round_trip() {
        let mut archive = ZipArchive::new();
        archive.set_comment("Änderungen").unwrap();
        assert!(archive.set_comment("Привет").is_err());
        let reopened = ZipArchive::from_bytes(archive.to_bytes().unwrap()).unwrap();
        assert_eq!(reopened.comment(), "Änderungen");
    }

    #[test]
    fn test_progress_events() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&events);
        let sink = move |event: &ArchiveEvent<'_>| {
            let label = match event {
                ArchiveEvent::SaveStarted { entries } => format!("start {}", entries),
                ArchiveEvent::EntrySaved { name, .. } => format!("entry {}", name),
                ArchiveEvent::SaveCompleted { entries, .. } => format!("done {}", entries),
                _ => String::from("other"),
            };
            if let Ok(mut events) = seen.lock() {
                events.push(label);
            }
        };

        let mut archive = ZipArchive::new();
        archive.add_bytes("a", b"1".to_vec()).unwrap();
        archive.add_bytes("b", b"2".to_vec()).unwrap();
        archive
            .write_to_with(Vec::new(), &SaveOptions::new().with_progress(Arc::new(sink)))
            .unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            ["start 2", "entry a", "entry b", "done 2"]
        );
    }

    #[test]
    fn test_files_stream_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("big.log");
        let content: Vec<u8> = (0..200_000u32).flat_map(|i| (i % 251).to_le_bytes()).collect();
        fs::write(&source, &content).unwrap();

        let mut archive = ZipArchive::new();
        archive
            .add_file_with(&source, "big.log", &EntryOptions::new().password("pw"))
            .unwrap();
        let mut reopened = ZipArchive::from_bytes(archive.to_bytes().unwrap()).unwrap();

        let entry = reopened.entry("big.log").unwrap();
        assert_eq!(entry.size, content.len() as u64);
        #[cfg(not(feature = "parallel"))]
        assert!(entry.has_data_descriptor());
        let password = Password::from("pw");
        assert_eq!(reopened.read_entry("big.log", Some(&password)).unwrap(), content);
    }

    #[test]
    fn test_cancelled_save_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never.zip");
        let token = CancellationToken::new();
        token.cancel();

        let mut archive = ZipArchive::new();
        archive
            .add_bytes_with(
                "data.bin",
                vec![0u8; 1000],
                &EntryOptions::new().compression(CompressionLevel::Best),
            )
            .unwrap();
        let err = archive
            .save_as_with(&path, &SaveOptions::new().with_cancel(token))
            .unwrap_err();
        assert!(matches!(err, OxiZipError::Cancelled));
        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
        assert_eq!(archive.state(), ArchiveState::Populated);
    }
}
