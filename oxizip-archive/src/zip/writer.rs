//! ZIP writer.
//!
//! [`ZipWriter`] writes entries one after another and the central directory
//! on [`finish`](ZipWriter::finish). Entries are either streamed through
//! [`start_entry`](ZipWriter::start_entry) and [`Write`], or handed over as
//! complete buffers with [`add_bytes`](ZipWriter::add_bytes).
//!
//! Streamed entries need their CRC and sizes recorded after the payload.
//! On a seekable sink the local header is rewritten in place; on a
//! forward-only sink ([`ZipWriter::streaming`]) bit 3 is set and a data
//! descriptor follows the payload. Traditional encryption always takes the
//! data descriptor route, since its check byte has to be written before the
//! CRC is known.

use super::aes::AesVendorVersion;
use super::compression::{self, CompressionLevel, CompressionMethod, Compressor};
use super::encryption::{self, CheckByte, EncryptingWriter, Encryption};
use super::entry::{self, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE};
use super::extra::AesField;
use super::header::{
    self, CentralDirectoryHeader, DataDescriptor, FLAG_DATA_DESCRIPTOR, FLAG_ENCRYPTED,
    FLAG_UNICODE, LocalFileHeader, VERSION_MADE_BY, ZIP64_MARKER_32,
};
use super::options::EntryOptions;
use super::reader::{AES_METHOD, ZipReader};
use super::text::{self, EncodedText, TextEncoding};
use oxizip_core::datetime::DosDateTime;
use oxizip_core::error::{OxiZipError, Result};
use std::collections::HashSet;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Normalize an entry name: backslashes become slashes and leading slashes
/// are dropped.
pub fn normalize_name(name: &str) -> Result<String> {
    let normalized = name.replace('\\', "/");
    let trimmed = normalized.trim_start_matches('/');
    if trimmed.is_empty() {
        return Err(OxiZipError::invalid_name(name));
    }
    Ok(trimmed.to_string())
}

/// A forward-only sink. Only position queries are supported as seeks.
#[derive(Debug)]
pub struct StreamingSink<W: Write> {
    inner: W,
    position: u64,
}

impl<W: Write> StreamingSink<W> {
    /// Wrap a writer.
    pub fn new(inner: W) -> Self {
        Self { inner, position: 0 }
    }

    /// Unwrap.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for StreamingSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> Seek for StreamingSink<W> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Current(0) => Ok(self.position),
            SeekFrom::Start(p) if p == self.position => Ok(self.position),
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "streaming sink cannot seek",
            )),
        }
    }
}

/// A fully encoded entry, ready to be written.
///
/// Producing one is pure computation, so many can be prepared in parallel
/// and written in order afterwards.
#[derive(Debug, Clone)]
pub struct PreparedEntry {
    /// Normalized name.
    pub name: String,
    /// Uncompressed size.
    pub size: u64,
    local: LocalFileHeader,
    central: CentralDirectoryHeader,
    payload: Vec<u8>,
}

struct Encoded {
    text: EncodedText,
    flags: u16,
    modified: DosDateTime,
}

fn encode_common(name: &str, options: &EntryOptions) -> Result<Encoded> {
    let text = text::encode_entry_text(name, &options.comment, &options.encoding)?;
    let mut flags = 0;
    if text.unicode {
        flags |= FLAG_UNICODE;
    }
    if options.encryption.is_encrypted() {
        flags |= FLAG_ENCRYPTED;
    }
    Ok(Encoded {
        text,
        flags,
        modified: options.modified.unwrap_or_else(DosDateTime::now),
    })
}

/// Stored method id and extra field for the given encryption.
fn method_and_extra(method: CompressionMethod, encryption: Encryption) -> (u16, Vec<u8>) {
    match encryption {
        Encryption::Aes(strength) => (
            AES_METHOD,
            AesField {
                version: AesVendorVersion::Ae1,
                strength,
                method: method.to_u16(),
            }
            .to_bytes(),
        ),
        _ => (method.to_u16(), Vec::new()),
    }
}

/// Compress and encrypt a complete buffer into a [`PreparedEntry`].
pub fn prepare_entry(name: &str, data: &[u8], options: &EntryOptions) -> Result<PreparedEntry> {
    let name = normalize_name(name)?;
    let encoded = encode_common(&name, options)?;
    let compressed = compression::compress(data, options.compression)?;

    let payload = if options.encryption.is_encrypted() {
        let password = options
            .active_password()
            .ok_or_else(|| OxiZipError::password_required(&name))?;
        encryption::encrypt_payload(
            &compressed.data,
            password,
            options.encryption,
            CheckByte::Crc(compressed.crc32),
        )?
    } else {
        compressed.data
    };

    let size = data.len() as u64;
    let zip64 = options.large_file
        || size >= ZIP64_MARKER_32 as u64
        || payload.len() as u64 >= ZIP64_MARKER_32 as u64;
    let (method, extra) = method_and_extra(compressed.method, options.encryption);
    let version_needed =
        entry::version_needed(false, compressed.method, options.encryption, zip64);

    let local = LocalFileHeader {
        version_needed,
        flags: encoded.flags,
        method,
        modified: encoded.modified,
        crc32: compressed.crc32,
        compressed_size: payload.len() as u64,
        uncompressed_size: size,
        name: encoded.text.name.clone(),
        extra: extra.clone(),
        zip64,
    };
    let central = CentralDirectoryHeader {
        version_made_by: VERSION_MADE_BY,
        version_needed,
        flags: encoded.flags,
        method,
        modified: encoded.modified,
        crc32: compressed.crc32,
        compressed_size: payload.len() as u64,
        uncompressed_size: size,
        name: encoded.text.name,
        extra,
        comment: encoded.text.comment,
        disk_start: 0,
        internal_attr: 0,
        external_attr: entry::file_attributes(options.unix_mode.unwrap_or(DEFAULT_FILE_MODE)),
        local_header_offset: 0,
    };

    Ok(PreparedEntry {
        name,
        size,
        local,
        central,
        payload,
    })
}

/// Build a directory entry. Directories are never compressed or encrypted.
pub fn prepare_directory(name: &str, options: &EntryOptions) -> Result<PreparedEntry> {
    let mut name = normalize_name(name)?;
    if !name.ends_with('/') {
        name.push('/');
    }
    let options = options
        .clone()
        .compression(CompressionLevel::Store)
        .encryption(Encryption::None);
    let encoded = encode_common(&name, &options)?;
    let version_needed =
        entry::version_needed(true, CompressionMethod::Stored, Encryption::None, false);

    let local = LocalFileHeader {
        version_needed,
        flags: encoded.flags,
        method: 0,
        modified: encoded.modified,
        crc32: 0,
        compressed_size: 0,
        uncompressed_size: 0,
        name: encoded.text.name.clone(),
        extra: Vec::new(),
        zip64: false,
    };
    let central = CentralDirectoryHeader {
        version_made_by: VERSION_MADE_BY,
        version_needed,
        flags: encoded.flags,
        method: 0,
        modified: encoded.modified,
        crc32: 0,
        compressed_size: 0,
        uncompressed_size: 0,
        name: encoded.text.name,
        extra: Vec::new(),
        comment: encoded.text.comment,
        disk_start: 0,
        internal_attr: 0,
        external_attr: entry::dir_attributes(options.unix_mode.unwrap_or(DEFAULT_DIR_MODE)),
        local_header_offset: 0,
    };

    Ok(PreparedEntry {
        name,
        size: 0,
        local,
        central,
        payload: Vec::new(),
    })
}

type Pipeline = Compressor<EncryptingWriter<Vec<u8>>>;

struct OpenEntry {
    name: String,
    header_offset: u64,
    local: LocalFileHeader,
    central: CentralDirectoryHeader,
    pipeline: Pipeline,
    written: u64,
}

/// Writer producing a ZIP archive on `W`.
pub struct ZipWriter<W: Write + Seek> {
    sink: W,
    streaming: bool,
    headers: Vec<CentralDirectoryHeader>,
    names: HashSet<String>,
    allow_duplicates: bool,
    comment: Vec<u8>,
    current: Option<OpenEntry>,
}

impl<W: Write + Seek> ZipWriter<W> {
    /// Write to a seekable sink. Local headers are patched after each
    /// streamed payload.
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            streaming: false,
            headers: Vec::new(),
            names: HashSet::new(),
            allow_duplicates: false,
            comment: Vec::new(),
            current: None,
        }
    }

    /// Permit several entries with the same name.
    pub fn allow_duplicate_names(&mut self, allow: bool) {
        self.allow_duplicates = allow;
    }

    /// Set the archive comment, encoded with `encoding`.
    pub fn set_comment(&mut self, comment: &str, encoding: TextEncoding) -> Result<()> {
        let bytes = encoding.encode_lossless(comment).ok_or_else(|| {
            OxiZipError::encoding(format!("archive comment is not representable in {}", encoding))
        })?;
        if bytes.len() > u16::MAX as usize {
            return Err(OxiZipError::unsupported("archive comment longer than 65535 bytes"));
        }
        self.comment = bytes;
        Ok(())
    }

    /// Set the archive comment from raw bytes.
    pub fn set_raw_comment(&mut self, comment: Vec<u8>) {
        self.comment = comment;
    }

    /// Number of entries written or in progress.
    pub fn len(&self) -> usize {
        self.headers.len() + usize::from(self.current.is_some())
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current output position.
    pub fn position(&mut self) -> Result<u64> {
        Ok(self.sink.stream_position()?)
    }

    fn claim_name(&mut self, name: &str) -> Result<()> {
        if !self.names.insert(name.to_string()) && !self.allow_duplicates {
            return Err(OxiZipError::name_collision(name));
        }
        Ok(())
    }

    /// Begin a streamed entry. Data written afterwards forms its content.
    /// An entry still open is finished first.
    pub fn start_entry(&mut self, name: &str, options: &EntryOptions) -> Result<()> {
        self.finish_entry()?;

        let name = normalize_name(name)?;
        let encoded = encode_common(&name, options)?;
        if options.encryption.is_encrypted() && options.active_password().is_none() {
            return Err(OxiZipError::password_required(&name));
        }

        let mut flags = encoded.flags;
        let traditional = options.encryption == Encryption::Traditional;
        if self.streaming || traditional {
            flags |= FLAG_DATA_DESCRIPTOR;
        }

        let method = options.compression.method();
        let (stored_method, extra) = method_and_extra(method, options.encryption);
        let version_needed =
            entry::version_needed(false, method, options.encryption, options.large_file);

        let encrypting = EncryptingWriter::new(
            Vec::new(),
            options.encryption,
            options.active_password(),
            CheckByte::ModTime(encoded.modified.time),
        )?;
        self.claim_name(&name)?;

        let local = LocalFileHeader {
            version_needed,
            flags,
            method: stored_method,
            modified: encoded.modified,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            name: encoded.text.name.clone(),
            extra: extra.clone(),
            zip64: options.large_file,
        };
        let header_offset = self.position()?;
        local.write(&mut self.sink)?;

        let central = CentralDirectoryHeader {
            version_made_by: VERSION_MADE_BY,
            version_needed,
            flags,
            method: stored_method,
            modified: encoded.modified,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            name: encoded.text.name,
            extra,
            comment: encoded.text.comment,
            disk_start: 0,
            internal_attr: 0,
            external_attr: entry::file_attributes(options.unix_mode.unwrap_or(DEFAULT_FILE_MODE)),
            local_header_offset: header_offset,
        };

        log::debug!("started entry '{}' at offset {}", name, header_offset);
        self.current = Some(OpenEntry {
            name,
            header_offset,
            local,
            central,
            pipeline: Compressor::new(encrypting, options.compression),
            written: 0,
        });
        Ok(())
    }

    fn drain(&mut self) -> io::Result<()> {
        if let Some(open) = self.current.as_mut() {
            let buffer = open.pipeline.get_mut().get_mut();
            if !buffer.is_empty() {
                self.sink.write_all(buffer)?;
                open.written += buffer.len() as u64;
                buffer.clear();
            }
        }
        Ok(())
    }

    /// Complete the open entry, if any.
    pub fn finish_entry(&mut self) -> Result<()> {
        self.drain()?;
        let Some(open) = self.current.take() else {
            return Ok(());
        };
        let OpenEntry {
            name,
            header_offset,
            mut local,
            mut central,
            pipeline,
            mut written,
        } = open;

        let (encrypting, summary) = pipeline.finish()?;
        let tail = encrypting.finish()?;
        self.sink.write_all(&tail)?;
        written += tail.len() as u64;

        if !local.zip64
            && (written >= ZIP64_MARKER_32 as u64
                || summary.uncompressed_size >= ZIP64_MARKER_32 as u64)
        {
            return Err(OxiZipError::unsupported(format!(
                "'{}' exceeds 4 GiB; mark it as a large file",
                name
            )));
        }

        central.crc32 = summary.crc32;
        central.compressed_size = written;
        central.uncompressed_size = summary.uncompressed_size;

        if local.has_data_descriptor() {
            DataDescriptor {
                crc32: summary.crc32,
                compressed_size: written,
                uncompressed_size: summary.uncompressed_size,
            }
            .write(&mut self.sink, local.zip64)?;
        } else {
            local.crc32 = summary.crc32;
            local.compressed_size = written;
            local.uncompressed_size = summary.uncompressed_size;
            let end = self.position()?;
            self.sink.seek(SeekFrom::Start(header_offset))?;
            local.write(&mut self.sink)?;
            self.sink.seek(SeekFrom::Start(end))?;
        }

        log::debug!(
            "finished entry '{}': {} -> {} bytes",
            name,
            summary.uncompressed_size,
            written
        );
        self.headers.push(central);
        Ok(())
    }

    /// Write a directory entry.
    pub fn add_directory(&mut self, name: &str, options: &EntryOptions) -> Result<()> {
        let prepared = prepare_directory(name, options)?;
        self.write_prepared(prepared)
    }

    /// Compress, encrypt and write a complete entry.
    pub fn add_bytes(&mut self, name: &str, data: &[u8], options: &EntryOptions) -> Result<()> {
        let prepared = prepare_entry(name, data, options)?;
        self.write_prepared(prepared)
    }

    /// Write an entry produced by [`prepare_entry`] or [`prepare_directory`].
    pub fn write_prepared(&mut self, prepared: PreparedEntry) -> Result<()> {
        self.finish_entry()?;
        self.claim_name(&prepared.name)?;

        let PreparedEntry {
            name,
            local,
            mut central,
            payload,
            ..
        } = prepared;
        central.local_header_offset = self.position()?;
        local.write(&mut self.sink)?;
        self.sink.write_all(&payload)?;

        log::debug!(
            "wrote entry '{}' ({} bytes stored) at offset {}",
            name,
            payload.len(),
            central.local_header_offset
        );
        self.headers.push(central);
        Ok(())
    }

    /// Copy entry `index` of `source` without decrypting or recompressing.
    pub fn raw_copy<R: Read + Seek>(&mut self, source: &mut ZipReader<R>, index: usize) -> Result<()> {
        self.finish_entry()?;
        let name = source
            .entries()
            .get(index)
            .map(|e| e.name.clone())
            .ok_or_else(|| OxiZipError::entry_not_found(format!("#{}", index)))?;
        self.claim_name(&name)?;

        let mut central = source.central_header(index)?.clone();
        let payload = source.raw_payload(index)?;
        let local = central.local_header();

        central.local_header_offset = self.position()?;
        local.write(&mut self.sink)?;
        self.sink.write_all(&payload)?;
        if local.has_data_descriptor() {
            DataDescriptor {
                crc32: central.crc32,
                compressed_size: central.compressed_size,
                uncompressed_size: central.uncompressed_size,
            }
            .write(&mut self.sink, local.uses_zip64())?;
        }

        log::debug!("copied entry '{}' unchanged", name);
        self.headers.push(central);
        Ok(())
    }

    /// Finish the open entry, write the central directory and return the
    /// sink.
    pub fn finish(mut self) -> Result<W> {
        self.finish_entry()?;
        let cd_offset = self.position()?;
        header::write_central_directory(&self.headers, &self.comment, &mut self.sink, cd_offset)?;
        self.sink.flush()?;
        log::debug!(
            "wrote central directory with {} entries at offset {}",
            self.headers.len(),
            cd_offset
        );
        Ok(self.sink)
    }
}

impl<W: Write> ZipWriter<StreamingSink<W>> {
    /// Write to a forward-only sink. Every streamed entry carries a data
    /// descriptor.
    pub fn streaming(sink: W) -> Self {
        let mut writer = ZipWriter::new(StreamingSink::new(sink));
        writer.streaming = true;
        writer
    }
}

impl<W: Write + Seek> Write for ZipWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Some(open) = self.current.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "no entry has been started",
            ));
        };
        let n = open.pipeline.write(buf)?;
        self.drain()?;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(open) = self.current.as_mut() {
            open.pipeline.flush()?;
        }
        self.drain()?;
        self.sink.flush()
    }
}
