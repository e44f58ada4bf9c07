//! Random-access ZIP reader.

use super::aes::AesVendorVersion;
use super::compression::{self, CompressionMethod};
use super::encryption::{self, CheckByte, Encryption, Password};
use super::entry::ZipEntry;
use super::extra::{self, AES_ID, AesField, UNICODE_PATH_ID};
use super::header::{
    self, CentralDirectoryHeader, DataDescriptor, FLAG_ENCRYPTED, LocalFileHeader,
};
use super::text::{self, TextEncoding};
use oxizip_core::cancel::CancellationToken;
use oxizip_core::error::{OxiZipError, Result};
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Method id of WinZip AES entries.
pub const AES_METHOD: u16 = 99;

#[derive(Debug, Clone)]
struct Location {
    header: CentralDirectoryHeader,
    data_offset: u64,
    aes_version: Option<AesVendorVersion>,
}

/// Reader over the central directory of an archive.
///
/// Entry metadata is parsed once on construction; payloads are read on
/// demand.
#[derive(Debug)]
pub struct ZipReader<R: Read + Seek> {
    reader: R,
    entries: Vec<ZipEntry>,
    locations: Vec<Location>,
    comment: String,
    raw_comment: Vec<u8>,
}

impl<R: Read + Seek> ZipReader<R> {
    /// Open an archive, reading names without the Unicode flag as CP437.
    pub fn new(reader: R) -> Result<Self> {
        Self::with_fallback(reader, TextEncoding::Cp437)
    }

    /// Open an archive with the given fallback encoding for names and
    /// comments without the Unicode flag.
    pub fn with_fallback(mut reader: R, fallback: TextEncoding) -> Result<Self> {
        let directory = header::read_central_directory(&mut reader)?;

        let mut entries = Vec::with_capacity(directory.headers.len());
        let mut locations = Vec::with_capacity(directory.headers.len());
        for header in directory.headers {
            if header.local_header_offset >= directory.offset {
                return Err(OxiZipError::corrupt(format!(
                    "local header offset {} lies inside the central directory",
                    header.local_header_offset
                )));
            }
            let data_offset =
                LocalFileHeader::payload_offset(&mut reader, header.local_header_offset)?;
            let (entry, aes_version) = entry_from_header(&header, fallback)?;
            log::debug!("read entry '{}' at offset {}", entry.name, entry.header_offset);
            entries.push(entry);
            locations.push(Location {
                header,
                data_offset,
                aes_version,
            });
        }

        let comment = fallback.decode(&directory.comment);
        Ok(Self {
            reader,
            entries,
            locations,
            comment,
            raw_comment: directory.comment,
        })
    }

    /// All entries in central directory order.
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the archive has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the first entry called `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    /// First entry called `name`.
    pub fn entry_by_name(&self, name: &str) -> Option<&ZipEntry> {
        self.index_of(name).map(|i| &self.entries[i])
    }

    /// Archive comment.
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Archive comment as stored.
    pub fn raw_comment(&self) -> &[u8] {
        &self.raw_comment
    }

    /// Central directory record of entry `index`.
    pub(crate) fn central_header(&self, index: usize) -> Result<&CentralDirectoryHeader> {
        self.locations
            .get(index)
            .map(|l| &l.header)
            .ok_or_else(|| OxiZipError::entry_not_found(format!("#{}", index)))
    }

    fn entry_at(&self, index: usize) -> Result<&ZipEntry> {
        self.entries
            .get(index)
            .ok_or_else(|| OxiZipError::entry_not_found(format!("#{}", index)))
    }

    /// The stored payload of entry `index`, still compressed and encrypted.
    pub fn raw_payload(&mut self, index: usize) -> Result<Vec<u8>> {
        let size = self.entry_at(index)?.compressed_size;
        let offset = self.locations[index].data_offset;
        self.reader.seek(SeekFrom::Start(offset))?;
        let mut data = Vec::new();
        (&mut self.reader).take(size).read_to_end(&mut data)?;
        if data.len() as u64 != size {
            return Err(OxiZipError::corrupt(format!(
                "payload of '{}' is truncated",
                self.entries[index].name
            )));
        }
        Ok(data)
    }

    /// Check the data descriptor following entry `index` against the central
    /// directory. Entries without bit 3 pass trivially.
    pub fn check_descriptor(&mut self, index: usize) -> Result<()> {
        let entry = self.entry_at(index)?;
        if !entry.has_data_descriptor() {
            return Ok(());
        }
        let name = entry.name.clone();
        let header = &self.locations[index].header;
        let (offset, expected) = (
            header.local_header_offset,
            DataDescriptor {
                crc32: header.crc32,
                compressed_size: header.compressed_size,
                uncompressed_size: header.uncompressed_size,
            },
        );
        let payload_end = self.locations[index].data_offset + expected.compressed_size;

        // The local Zip64 field decides the width of the sizes
        self.reader.seek(SeekFrom::Start(offset))?;
        let zip64 = LocalFileHeader::read(&mut self.reader)?.zip64;
        self.reader.seek(SeekFrom::Start(payload_end))?;
        let found = DataDescriptor::read(&mut self.reader, zip64)?;
        if found != expected {
            return Err(OxiZipError::corrupt(format!(
                "data descriptor of '{}' disagrees with the central directory",
                name
            )));
        }
        Ok(())
    }

    /// Decrypt and decompress entry `index` into memory.
    pub fn read_entry(&mut self, index: usize, password: Option<&Password>) -> Result<Vec<u8>> {
        let capacity = self.entry_at(index)?.size.min(1 << 30) as usize;
        let mut out = Vec::with_capacity(capacity);
        self.copy_entry_to(index, password, &mut out, None)?;
        Ok(out)
    }

    /// Decrypt and decompress entry `index` into `sink`, checking the CRC.
    ///
    /// Data reaches `sink` before the CRC is known to match; callers that
    /// write files must discard the output on error.
    pub fn copy_entry_to<W: Write>(
        &mut self,
        index: usize,
        password: Option<&Password>,
        sink: &mut W,
        cancel: Option<&CancellationToken>,
    ) -> Result<u64> {
        let entry = self.entry_at(index)?.clone();
        self.check_descriptor(index)?;
        let payload = self.raw_payload(index)?;
        let location = &self.locations[index];

        let data = if entry.is_encrypted() {
            let password = password.ok_or_else(|| OxiZipError::password_required(&entry.name))?;
            let check = if entry.has_data_descriptor() {
                CheckByte::ModTime(location.header.modified.time)
            } else {
                CheckByte::Crc(entry.crc32)
            };
            encryption::decrypt_payload(&payload, password, entry.encryption, check, &entry.name)?
        } else {
            payload
        };

        let (count, crc) = compression::decompress_into(&data, entry.method, entry.size, sink, cancel)
            .map_err(|err| match err {
                OxiZipError::Decompression { .. } if entry.is_encrypted() => {
                    log::debug!("'{}' does not inflate after decryption", entry.name);
                    OxiZipError::bad_password(&entry.name)
                }
                other => other,
            })?;

        let skip_crc = location.aes_version == Some(AesVendorVersion::Ae2);
        if !skip_crc && crc != entry.crc32 {
            return Err(if entry.is_encrypted() {
                OxiZipError::bad_password(&entry.name)
            } else {
                OxiZipError::corrupt(format!(
                    "CRC mismatch in '{}': stored {:08x}, computed {:08x}",
                    entry.name, entry.crc32, crc
                ))
            });
        }
        Ok(count)
    }

    /// Decode entry `index` without keeping the data.
    pub fn test_entry(&mut self, index: usize, password: Option<&Password>) -> Result<()> {
        self.copy_entry_to(index, password, &mut io::sink(), None)?;
        Ok(())
    }

    /// Unwrap.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

fn entry_from_header(
    header: &CentralDirectoryHeader,
    fallback: TextEncoding,
) -> Result<(ZipEntry, Option<AesVendorVersion>)> {
    let (name, text_encoding) = text::decode_name(&header.name, header.flags, &header.extra, fallback);
    if name.is_empty() {
        return Err(OxiZipError::corrupt("entry with an empty name"));
    }
    let comment = if text_encoding.is_utf8() && header.flags & header::FLAG_UNICODE == 0 {
        // Name came from a Unicode Path field; the comment bytes are still legacy
        fallback.decode(&header.comment)
    } else {
        text::decode_text(&header.comment, header.flags, fallback)
    };

    let (method, encryption, aes_version) = if header.method == AES_METHOD {
        let body = extra::find(&header.extra, AES_ID).ok_or_else(|| {
            OxiZipError::corrupt(format!("AES entry '{}' has no AES extra field", name))
        })?;
        let field = AesField::parse(body)?;
        (
            CompressionMethod::from_u16(field.method),
            Encryption::Aes(field.strength),
            Some(field.version),
        )
    } else if header.flags & FLAG_ENCRYPTED != 0 {
        (
            CompressionMethod::from_u16(header.method),
            Encryption::Traditional,
            None,
        )
    } else {
        (CompressionMethod::from_u16(header.method), Encryption::None, None)
    };

    let entry = ZipEntry {
        is_dir: name.ends_with('/'),
        name,
        size: header.uncompressed_size,
        compressed_size: header.compressed_size,
        crc32: header.crc32,
        modified: header.modified,
        method,
        flags: header.flags,
        encryption,
        text_encoding,
        comment,
        external_attr: header.external_attr,
        header_offset: header.local_header_offset,
        extra: extra::without(&header.extra, &[AES_ID, UNICODE_PATH_ID]),
    };
    Ok((entry, aes_version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::options::EntryOptions;
    use crate::zip::writer::ZipWriter;
    use std::io::{Cursor, Write};

    fn sample() -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .add_bytes("hello.txt", b"Hello, World!", &EntryOptions::new())
            .unwrap();
        writer
            .add_bytes(
                "secret.txt",
                b"classified classified classified",
                &EntryOptions::new().password("pw"),
            )
            .unwrap();
        writer.add_directory("docs/", &EntryOptions::new()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_list_and_read() {
        let mut reader = ZipReader::new(Cursor::new(sample())).unwrap();
        assert_eq!(reader.len(), 3);
        assert_eq!(reader.entries()[2].name, "docs/");
        assert!(reader.entries()[2].is_dir);

        let index = reader.index_of("hello.txt").unwrap();
        assert_eq!(reader.read_entry(index, None).unwrap(), b"Hello, World!");
    }

    #[test]
    fn test_password_handling() {
        let mut reader = ZipReader::new(Cursor::new(sample())).unwrap();
        let index = reader.index_of("secret.txt").unwrap();
        assert!(reader.entries()[index].is_encrypted());

        let err = reader.read_entry(index, None).unwrap_err();
        assert!(matches!(err, OxiZipError::PasswordRequired { .. }));

        let data = reader.read_entry(index, Some(&"pw".into())).unwrap();
        assert_eq!(data, b"classified classified classified");

        let err = reader.read_entry(index, Some(&"wrong".into())).unwrap_err();
        assert!(err.is_password_error());
    }

    #[test]
    fn test_crc_mismatch_on_plain_entry_is_corruption() {
        let mut bytes = sample();
        let mut reader = ZipReader::new(Cursor::new(bytes.clone())).unwrap();
        let offset = reader.locations[0].data_offset as usize;
        let stored = reader.raw_payload(0).unwrap();
        assert_eq!(stored, b"Hello, World!");

        // Flip one payload byte of the stored entry
        bytes[offset] ^= 0x20;
        let mut reader = ZipReader::new(Cursor::new(bytes)).unwrap();
        let err = reader.read_entry(0, None).unwrap_err();
        assert!(matches!(err, OxiZipError::CorruptArchive { .. }));
    }

    #[test]
    fn test_descriptor_must_match_directory() {
        let mut writer = ZipWriter::streaming(Vec::new());
        writer.start_entry("log.txt", &EntryOptions::new()).unwrap();
        writer.write_all(b"line one\nline two\n").unwrap();
        let mut bytes = writer.finish().unwrap().into_inner();

        let mut reader = ZipReader::new(Cursor::new(bytes.clone())).unwrap();
        assert!(reader.entries()[0].has_data_descriptor());
        reader.check_descriptor(0).unwrap();
        assert_eq!(reader.read_entry(0, None).unwrap(), b"line one\nline two\n");

        // Damage the descriptor's CRC, which follows its signature
        let at = reader.locations[0].data_offset as usize + reader.raw_payload(0).unwrap().len();
        assert_eq!(bytes[at..at + 4], 0x0807_4b50u32.to_le_bytes());
        bytes[at + 4] ^= 0xff;

        let mut reader = ZipReader::new(Cursor::new(bytes)).unwrap();
        let err = reader.read_entry(0, None).unwrap_err();
        assert!(matches!(err, OxiZipError::CorruptArchive { .. }));
        assert!(reader.test_entry(0, None).is_err());
    }

    #[test]
    fn test_missing_local_header() {
        let mut bytes = sample();
        bytes[0] = b'X';
        let err = ZipReader::new(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, OxiZipError::CorruptArchive { .. }));
    }

    #[test]
    fn test_not_a_zip() {
        let err = ZipReader::new(Cursor::new(b"definitely not a zip file".to_vec())).unwrap_err();
        assert!(matches!(err, OxiZipError::CorruptArchive { .. }));
    }
}
