//! ZIP header structures.
//!
//! Byte-exact, little-endian encoders and decoders for the local file header,
//! data descriptor, central directory record, end of central directory record
//! and the Zip64 end record and locator. Sizes and offsets are carried as
//! `u64`; the 32-bit sentinels and the Zip64 extra field are produced on write
//! and resolved on read, so callers never see `0xFFFFFFFF`.

use super::extra::{self, ZIP64_ID, Zip64Field};
use oxizip_core::datetime::DosDateTime;
use oxizip_core::error::{OxiZipError, Result};
use std::io::{Read, Seek, SeekFrom, Write};

/// ZIP local file header signature.
pub const LOCAL_FILE_HEADER_SIG: u32 = 0x04034B50;

/// ZIP central directory header signature.
pub const CENTRAL_DIR_HEADER_SIG: u32 = 0x02014B50;

/// ZIP end of central directory signature.
pub const END_OF_CENTRAL_DIR_SIG: u32 = 0x06054B50;

/// ZIP64 end of central directory signature.
pub const ZIP64_END_OF_CENTRAL_DIR_SIG: u32 = 0x06064B50;

/// ZIP64 end of central directory locator signature.
pub const ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG: u32 = 0x07064B50;

/// Data descriptor signature (optional, PK\x07\x08).
pub const DATA_DESCRIPTOR_SIG: u32 = 0x08074B50;

/// Marker value for Zip64 (0xFFFFFFFF for 32-bit fields).
pub const ZIP64_MARKER_32: u32 = 0xFFFF_FFFF;

/// Marker value for Zip64 (0xFFFF for 16-bit fields).
pub const ZIP64_MARKER_16: u16 = 0xFFFF;

/// Flag bit: entry is encrypted.
pub const FLAG_ENCRYPTED: u16 = 0x0001;

/// Flag bit: CRC and sizes follow the payload in a data descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

/// Flag bit: name and comment are UTF-8 (language encoding flag).
pub const FLAG_UNICODE: u16 = 0x0800;

/// Version made by: Unix host, APPNOTE 6.3.
pub const VERSION_MADE_BY: u16 = 0x033F;

/// Fixed part of a local file header.
pub const LOCAL_HEADER_LEN: u64 = 30;

/// Fixed part of a central directory record.
pub const CENTRAL_HEADER_LEN: u64 = 46;

/// Fixed part of the end of central directory record.
pub const EOCD_LEN: u64 = 22;

const ZIP64_EOCD_LEN: u64 = 56;
const ZIP64_LOCATOR_LEN: u64 = 20;

fn le16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn le32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn le64(buf: &[u8], at: usize) -> u64 {
    u64::from_le_bytes([
        buf[at],
        buf[at + 1],
        buf[at + 2],
        buf[at + 3],
        buf[at + 4],
        buf[at + 5],
        buf[at + 6],
        buf[at + 7],
    ])
}

fn clamp32(value: u64) -> u32 {
    if value >= ZIP64_MARKER_32 as u64 {
        ZIP64_MARKER_32
    } else {
        value as u32
    }
}

fn check_signature(found: u32, expected: u32, what: &str) -> Result<()> {
    if found != expected {
        return Err(OxiZipError::corrupt(format!(
            "bad {} signature {:#010x}",
            what, found
        )));
    }
    Ok(())
}

fn read_vec<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn u16_len(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len).map_err(|_| {
        OxiZipError::unsupported(format!("{} longer than 65535 bytes", what))
    })
}

/// ZIP local file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileHeader {
    /// Minimum version needed to extract.
    pub version_needed: u16,
    /// General purpose bit flag.
    pub flags: u16,
    /// Compression method as stored (99 for AES).
    pub method: u16,
    /// Last modification time.
    pub modified: DosDateTime,
    /// CRC-32 of uncompressed data.
    pub crc32: u32,
    /// Compressed size.
    pub compressed_size: u64,
    /// Uncompressed size.
    pub uncompressed_size: u64,
    /// Raw name bytes.
    pub name: Vec<u8>,
    /// Extra fields other than Zip64.
    pub extra: Vec<u8>,
    /// Emit a Zip64 extra field carrying both sizes.
    pub zip64: bool,
}

impl LocalFileHeader {
    /// Whether a Zip64 extra field will be written.
    pub fn uses_zip64(&self) -> bool {
        self.zip64
            || self.compressed_size >= ZIP64_MARKER_32 as u64
            || self.uncompressed_size >= ZIP64_MARKER_32 as u64
    }

    /// Whether a data descriptor follows the payload.
    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    fn zip64_extra(&self) -> Vec<u8> {
        if !self.uses_zip64() {
            return Vec::new();
        }
        Zip64Field {
            uncompressed_size: Some(self.uncompressed_size),
            compressed_size: Some(self.compressed_size),
            header_offset: None,
        }
        .to_bytes()
    }

    /// Length of the encoded header.
    pub fn encoded_len(&self) -> u64 {
        let zip64_len = if self.uses_zip64() { 20 } else { 0 };
        LOCAL_HEADER_LEN + self.name.len() as u64 + self.extra.len() as u64 + zip64_len
    }

    /// Encode the header.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let zip64_extra = self.zip64_extra();
        let name_len = u16_len(self.name.len(), "entry name")?;
        let extra_len = u16_len(self.extra.len() + zip64_extra.len(), "extra field")?;
        let (compressed_32, uncompressed_32) = if self.uses_zip64() {
            (ZIP64_MARKER_32, ZIP64_MARKER_32)
        } else {
            (self.compressed_size as u32, self.uncompressed_size as u32)
        };

        let mut out = Vec::with_capacity(self.encoded_len() as usize);
        // Signature
        out.extend_from_slice(&LOCAL_FILE_HEADER_SIG.to_le_bytes());
        // Version needed
        out.extend_from_slice(&self.version_needed.to_le_bytes());
        // Flags
        out.extend_from_slice(&self.flags.to_le_bytes());
        // Compression method
        out.extend_from_slice(&self.method.to_le_bytes());
        // Modification time
        out.extend_from_slice(&self.modified.time.to_le_bytes());
        // Modification date
        out.extend_from_slice(&self.modified.date.to_le_bytes());
        // CRC-32
        out.extend_from_slice(&self.crc32.to_le_bytes());
        // Compressed size
        out.extend_from_slice(&compressed_32.to_le_bytes());
        // Uncompressed size
        out.extend_from_slice(&uncompressed_32.to_le_bytes());
        // Filename length
        out.extend_from_slice(&name_len.to_le_bytes());
        // Extra field length
        out.extend_from_slice(&extra_len.to_le_bytes());
        // Filename
        out.extend_from_slice(&self.name);
        // Zip64 extra field (if needed)
        out.extend_from_slice(&zip64_extra);
        // Other extra fields
        out.extend_from_slice(&self.extra);
        Ok(out)
    }

    /// Write the header.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes()?)?;
        Ok(())
    }

    /// Read a local file header.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; LOCAL_HEADER_LEN as usize];
        reader.read_exact(&mut buf)?;
        check_signature(le32(&buf, 0), LOCAL_FILE_HEADER_SIG, "local file header")?;

        let version_needed = le16(&buf, 4);
        let flags = le16(&buf, 6);
        let method = le16(&buf, 8);
        let modified = DosDateTime::from_parts(le16(&buf, 12), le16(&buf, 10));
        let crc32 = le32(&buf, 14);
        let compressed_32 = le32(&buf, 18);
        let uncompressed_32 = le32(&buf, 22);
        let name_len = le16(&buf, 26) as usize;
        let extra_len = le16(&buf, 28) as usize;

        let name = read_vec(reader, name_len)?;
        let raw_extra = read_vec(reader, extra_len)?;

        let zip64_body = extra::find(&raw_extra, ZIP64_ID);
        let mut compressed_size = compressed_32 as u64;
        let mut uncompressed_size = uncompressed_32 as u64;
        if uncompressed_32 == ZIP64_MARKER_32 || compressed_32 == ZIP64_MARKER_32 {
            let body = zip64_body.ok_or_else(|| {
                OxiZipError::corrupt("local header size sentinel without Zip64 extra field")
            })?;
            let field = Zip64Field::parse(
                body,
                uncompressed_32 == ZIP64_MARKER_32,
                compressed_32 == ZIP64_MARKER_32,
                false,
            )?;
            uncompressed_size = field.uncompressed_size.unwrap_or(uncompressed_size);
            compressed_size = field.compressed_size.unwrap_or(compressed_size);
        }

        Ok(Self {
            version_needed,
            flags,
            method,
            modified,
            crc32,
            compressed_size,
            uncompressed_size,
            name,
            extra: extra::without(&raw_extra, &[ZIP64_ID]),
            zip64: zip64_body.is_some(),
        })
    }

    /// Read only the name and extra field lengths of the header at `offset`
    /// and return the offset of the payload.
    pub fn payload_offset<R: Read + Seek>(reader: &mut R, offset: u64) -> Result<u64> {
        reader.seek(SeekFrom::Start(offset))?;
        let mut buf = [0u8; LOCAL_HEADER_LEN as usize];
        reader.read_exact(&mut buf).map_err(|_| {
            OxiZipError::corrupt(format!("local header at offset {} is missing", offset))
        })?;
        check_signature(le32(&buf, 0), LOCAL_FILE_HEADER_SIG, "local file header")?;
        let name_len = le16(&buf, 26) as u64;
        let extra_len = le16(&buf, 28) as u64;
        Ok(offset + LOCAL_HEADER_LEN + name_len + extra_len)
    }
}

/// ZIP data descriptor, written after the payload when bit 3 is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDescriptor {
    /// CRC-32 of uncompressed data.
    pub crc32: u32,
    /// Compressed size.
    pub compressed_size: u64,
    /// Uncompressed size.
    pub uncompressed_size: u64,
}

impl DataDescriptor {
    /// Encoded length, signature included.
    pub fn encoded_len(zip64: bool) -> u64 {
        if zip64 { 24 } else { 16 }
    }

    /// Write the descriptor. The optional signature is always written.
    pub fn write<W: Write>(&self, writer: &mut W, zip64: bool) -> Result<()> {
        // Signature
        writer.write_all(&DATA_DESCRIPTOR_SIG.to_le_bytes())?;
        // CRC-32
        writer.write_all(&self.crc32.to_le_bytes())?;
        if zip64 {
            writer.write_all(&self.compressed_size.to_le_bytes())?;
            writer.write_all(&self.uncompressed_size.to_le_bytes())?;
        } else {
            if self.compressed_size >= ZIP64_MARKER_32 as u64
                || self.uncompressed_size >= ZIP64_MARKER_32 as u64
            {
                return Err(OxiZipError::unsupported(
                    "entry larger than 4 GiB needs a Zip64 data descriptor",
                ));
            }
            writer.write_all(&(self.compressed_size as u32).to_le_bytes())?;
            writer.write_all(&(self.uncompressed_size as u32).to_le_bytes())?;
        }
        Ok(())
    }

    /// Read a data descriptor, with or without its signature.
    pub fn read<R: Read>(reader: &mut R, zip64: bool) -> Result<Self> {
        let mut word = [0u8; 4];
        reader.read_exact(&mut word)?;
        let first = u32::from_le_bytes(word);

        let crc32 = if first == DATA_DESCRIPTOR_SIG {
            reader.read_exact(&mut word)?;
            u32::from_le_bytes(word)
        } else {
            first
        };

        let (compressed_size, uncompressed_size) = if zip64 {
            let mut buf = [0u8; 16];
            reader.read_exact(&mut buf)?;
            (le64(&buf, 0), le64(&buf, 8))
        } else {
            let mut buf = [0u8; 8];
            reader.read_exact(&mut buf)?;
            (le32(&buf, 0) as u64, le32(&buf, 4) as u64)
        };

        Ok(Self {
            crc32,
            compressed_size,
            uncompressed_size,
        })
    }
}

/// ZIP central directory record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirectoryHeader {
    /// Version made by.
    pub version_made_by: u16,
    /// Version needed to extract.
    pub version_needed: u16,
    /// General purpose bit flag.
    pub flags: u16,
    /// Compression method as stored (99 for AES).
    pub method: u16,
    /// Last modification time.
    pub modified: DosDateTime,
    /// CRC-32 of uncompressed data.
    pub crc32: u32,
    /// Compressed size.
    pub compressed_size: u64,
    /// Uncompressed size.
    pub uncompressed_size: u64,
    /// Raw name bytes.
    pub name: Vec<u8>,
    /// Extra fields other than Zip64.
    pub extra: Vec<u8>,
    /// Raw comment bytes.
    pub comment: Vec<u8>,
    /// Disk number start.
    pub disk_start: u16,
    /// Internal file attributes.
    pub internal_attr: u16,
    /// External file attributes.
    pub external_attr: u32,
    /// Offset of the local header.
    pub local_header_offset: u64,
}

impl CentralDirectoryHeader {
    /// Whether any field overflows its 32-bit slot.
    pub fn needs_zip64(&self) -> bool {
        self.compressed_size >= ZIP64_MARKER_32 as u64
            || self.uncompressed_size >= ZIP64_MARKER_32 as u64
            || self.local_header_offset >= ZIP64_MARKER_32 as u64
    }

    fn zip64_field(&self) -> Zip64Field {
        let over = |v: u64| (v >= ZIP64_MARKER_32 as u64).then_some(v);
        Zip64Field {
            uncompressed_size: over(self.uncompressed_size),
            compressed_size: over(self.compressed_size),
            header_offset: over(self.local_header_offset),
        }
    }

    /// Encoded length of this record.
    pub fn encoded_len(&self) -> u64 {
        let field = self.zip64_field();
        let zip64_len = if field.is_empty() {
            0
        } else {
            field.to_bytes().len()
        };
        CENTRAL_HEADER_LEN
            + self.name.len() as u64
            + self.extra.len() as u64
            + zip64_len as u64
            + self.comment.len() as u64
    }

    /// Write the central directory record.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let field = self.zip64_field();
        let zip64_extra = if field.is_empty() {
            Vec::new()
        } else {
            field.to_bytes()
        };
        let name_len = u16_len(self.name.len(), "entry name")?;
        let extra_len = u16_len(self.extra.len() + zip64_extra.len(), "extra field")?;
        let comment_len = u16_len(self.comment.len(), "entry comment")?;
        let version_needed = if self.needs_zip64() {
            self.version_needed.max(45)
        } else {
            self.version_needed
        };

        let mut out = Vec::with_capacity(self.encoded_len() as usize);
        // Signature
        out.extend_from_slice(&CENTRAL_DIR_HEADER_SIG.to_le_bytes());
        // Version made by
        out.extend_from_slice(&self.version_made_by.to_le_bytes());
        // Version needed
        out.extend_from_slice(&version_needed.to_le_bytes());
        // Flags
        out.extend_from_slice(&self.flags.to_le_bytes());
        // Compression method
        out.extend_from_slice(&self.method.to_le_bytes());
        // Modification time
        out.extend_from_slice(&self.modified.time.to_le_bytes());
        // Modification date
        out.extend_from_slice(&self.modified.date.to_le_bytes());
        // CRC-32
        out.extend_from_slice(&self.crc32.to_le_bytes());
        // Compressed size
        out.extend_from_slice(&clamp32(self.compressed_size).to_le_bytes());
        // Uncompressed size
        out.extend_from_slice(&clamp32(self.uncompressed_size).to_le_bytes());
        // Filename length
        out.extend_from_slice(&name_len.to_le_bytes());
        // Extra field length
        out.extend_from_slice(&extra_len.to_le_bytes());
        // Comment length
        out.extend_from_slice(&comment_len.to_le_bytes());
        // Disk number start
        out.extend_from_slice(&self.disk_start.to_le_bytes());
        // Internal file attributes
        out.extend_from_slice(&self.internal_attr.to_le_bytes());
        // External file attributes
        out.extend_from_slice(&self.external_attr.to_le_bytes());
        // Relative offset of local header
        out.extend_from_slice(&clamp32(self.local_header_offset).to_le_bytes());
        // Filename
        out.extend_from_slice(&self.name);
        // Zip64 extra field (if needed)
        out.extend_from_slice(&zip64_extra);
        // Other extra fields
        out.extend_from_slice(&self.extra);
        // Comment
        out.extend_from_slice(&self.comment);

        writer.write_all(&out)?;
        Ok(())
    }

    /// Read a central directory record.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; CENTRAL_HEADER_LEN as usize];
        reader.read_exact(&mut buf)?;
        check_signature(le32(&buf, 0), CENTRAL_DIR_HEADER_SIG, "central directory")?;

        let version_made_by = le16(&buf, 4);
        let version_needed = le16(&buf, 6);
        let flags = le16(&buf, 8);
        let method = le16(&buf, 10);
        let modified = DosDateTime::from_parts(le16(&buf, 14), le16(&buf, 12));
        let crc32 = le32(&buf, 16);
        let compressed_32 = le32(&buf, 20);
        let uncompressed_32 = le32(&buf, 24);
        let name_len = le16(&buf, 28) as usize;
        let extra_len = le16(&buf, 30) as usize;
        let comment_len = le16(&buf, 32) as usize;
        let disk_start = le16(&buf, 34);
        let internal_attr = le16(&buf, 36);
        let external_attr = le32(&buf, 38);
        let offset_32 = le32(&buf, 42);

        let name = read_vec(reader, name_len)?;
        let raw_extra = read_vec(reader, extra_len)?;
        let comment = read_vec(reader, comment_len)?;

        let want_uncompressed = uncompressed_32 == ZIP64_MARKER_32;
        let want_compressed = compressed_32 == ZIP64_MARKER_32;
        let want_offset = offset_32 == ZIP64_MARKER_32;

        let field = if want_uncompressed || want_compressed || want_offset {
            let body = extra::find(&raw_extra, ZIP64_ID).ok_or_else(|| {
                OxiZipError::corrupt("central directory sentinel without Zip64 extra field")
            })?;
            Zip64Field::parse(body, want_uncompressed, want_compressed, want_offset)?
        } else {
            Zip64Field::default()
        };

        Ok(Self {
            version_made_by,
            version_needed,
            flags,
            method,
            modified,
            crc32,
            compressed_size: field.compressed_size.unwrap_or(compressed_32 as u64),
            uncompressed_size: field.uncompressed_size.unwrap_or(uncompressed_32 as u64),
            name,
            extra: extra::without(&raw_extra, &[ZIP64_ID]),
            comment,
            disk_start,
            internal_attr,
            external_attr,
            local_header_offset: field.header_offset.unwrap_or(offset_32 as u64),
        })
    }

    /// Local header matching this record.
    pub fn local_header(&self) -> LocalFileHeader {
        LocalFileHeader {
            version_needed: self.version_needed,
            flags: self.flags,
            method: self.method,
            modified: self.modified,
            crc32: self.crc32,
            compressed_size: self.compressed_size,
            uncompressed_size: self.uncompressed_size,
            name: self.name.clone(),
            extra: self.extra.clone(),
            zip64: self.compressed_size >= ZIP64_MARKER_32 as u64
                || self.uncompressed_size >= ZIP64_MARKER_32 as u64,
        }
    }
}

/// End of central directory, merged with the Zip64 end record when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    /// Number of central directory records.
    pub entries: u64,
    /// Size of the central directory in bytes.
    pub cd_size: u64,
    /// Offset of the first central directory record.
    pub cd_offset: u64,
    /// Raw archive comment.
    pub comment: Vec<u8>,
}

impl EndOfCentralDirectory {
    /// Whether the Zip64 end record and locator are required.
    pub fn needs_zip64(&self) -> bool {
        self.entries >= ZIP64_MARKER_16 as u64
            || self.cd_size >= ZIP64_MARKER_32 as u64
            || self.cd_offset >= ZIP64_MARKER_32 as u64
    }

    /// Write the Zip64 end record and locator (when `zip64`) followed by the
    /// classic end record.
    pub fn write<W: Write>(&self, writer: &mut W, zip64: bool) -> Result<()> {
        let comment_len = u16_len(self.comment.len(), "archive comment")?;

        if zip64 {
            let zip64_eocd_offset = self.cd_offset + self.cd_size;

            // Signature
            writer.write_all(&ZIP64_END_OF_CENTRAL_DIR_SIG.to_le_bytes())?;
            // Size of the remaining record
            writer.write_all(&(ZIP64_EOCD_LEN - 12).to_le_bytes())?;
            // Version made by
            writer.write_all(&VERSION_MADE_BY.to_le_bytes())?;
            // Version needed to extract
            writer.write_all(&45u16.to_le_bytes())?;
            // Number of this disk
            writer.write_all(&0u32.to_le_bytes())?;
            // Disk where central directory starts
            writer.write_all(&0u32.to_le_bytes())?;
            // Number of central directory records on this disk
            writer.write_all(&self.entries.to_le_bytes())?;
            // Total number of central directory records
            writer.write_all(&self.entries.to_le_bytes())?;
            // Size of central directory
            writer.write_all(&self.cd_size.to_le_bytes())?;
            // Offset of start of central directory
            writer.write_all(&self.cd_offset.to_le_bytes())?;

            // Locator signature
            writer.write_all(&ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG.to_le_bytes())?;
            // Disk with the Zip64 end record
            writer.write_all(&0u32.to_le_bytes())?;
            // Offset of the Zip64 end record
            writer.write_all(&zip64_eocd_offset.to_le_bytes())?;
            // Total number of disks
            writer.write_all(&1u32.to_le_bytes())?;
        }

        let entries_16 = if zip64 || self.entries >= ZIP64_MARKER_16 as u64 {
            ZIP64_MARKER_16
        } else {
            self.entries as u16
        };
        let (cd_size_32, cd_offset_32) = if zip64 {
            (ZIP64_MARKER_32, ZIP64_MARKER_32)
        } else {
            (clamp32(self.cd_size), clamp32(self.cd_offset))
        };

        // Signature
        writer.write_all(&END_OF_CENTRAL_DIR_SIG.to_le_bytes())?;
        // Disk number
        writer.write_all(&0u16.to_le_bytes())?;
        // Disk with central directory
        writer.write_all(&0u16.to_le_bytes())?;
        // Number of entries on this disk
        writer.write_all(&entries_16.to_le_bytes())?;
        // Total number of entries
        writer.write_all(&entries_16.to_le_bytes())?;
        // Size of central directory
        writer.write_all(&cd_size_32.to_le_bytes())?;
        // Offset of central directory
        writer.write_all(&cd_offset_32.to_le_bytes())?;
        // Comment length
        writer.write_all(&comment_len.to_le_bytes())?;
        // Comment
        writer.write_all(&self.comment)?;
        Ok(())
    }

    /// Locate and parse the end records. Returns the record and the offset
    /// where the central directory is expected to end.
    pub fn find<R: Read + Seek>(reader: &mut R) -> Result<(Self, u64)> {
        let file_size = reader.seek(SeekFrom::End(0))?;
        if file_size < EOCD_LEN {
            return Err(OxiZipError::corrupt("file too small to be a ZIP archive"));
        }

        // The record is followed only by a comment of at most 65535 bytes
        let search_start = file_size.saturating_sub(65535 + EOCD_LEN);
        reader.seek(SeekFrom::Start(search_start))?;
        let tail = read_vec(reader, (file_size - search_start) as usize)?;

        let sig = END_OF_CENTRAL_DIR_SIG.to_le_bytes();
        let eocd_rel = (0..=tail.len() - EOCD_LEN as usize)
            .rev()
            .find(|&i| {
                tail[i..i + 4] == sig
                    && i + EOCD_LEN as usize + le16(&tail, i + 20) as usize == tail.len()
            })
            .ok_or_else(|| OxiZipError::corrupt("end of central directory not found"))?;
        let eocd_pos = search_start + eocd_rel as u64;
        let record = &tail[eocd_rel..];

        let disk = le16(record, 4);
        let cd_disk = le16(record, 6);
        if disk != 0 || cd_disk != 0 {
            return Err(OxiZipError::unsupported("multi-disk archives"));
        }

        let mut eocd = Self {
            entries: le16(record, 10) as u64,
            cd_size: le32(record, 12) as u64,
            cd_offset: le32(record, 16) as u64,
            comment: record[EOCD_LEN as usize..].to_vec(),
        };
        let mut cd_end = eocd_pos;

        if eocd_pos >= ZIP64_LOCATOR_LEN {
            reader.seek(SeekFrom::Start(eocd_pos - ZIP64_LOCATOR_LEN))?;
            let mut locator = [0u8; ZIP64_LOCATOR_LEN as usize];
            reader.read_exact(&mut locator)?;

            if le32(&locator, 0) == ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG {
                let zip64_offset = le64(&locator, 8);
                reader.seek(SeekFrom::Start(zip64_offset))?;
                let mut record = [0u8; ZIP64_EOCD_LEN as usize];
                reader.read_exact(&mut record)?;
                check_signature(
                    le32(&record, 0),
                    ZIP64_END_OF_CENTRAL_DIR_SIG,
                    "Zip64 end of central directory",
                )?;

                eocd.entries = le64(&record, 32);
                eocd.cd_size = le64(&record, 40);
                eocd.cd_offset = le64(&record, 48);
                cd_end = zip64_offset;
            }
        }

        Ok((eocd, cd_end))
    }
}

/// Parsed central directory.
#[derive(Debug, Clone)]
pub struct CentralDirectory {
    /// Records in directory order.
    pub headers: Vec<CentralDirectoryHeader>,
    /// Raw archive comment.
    pub comment: Vec<u8>,
    /// Offset of the first record.
    pub offset: u64,
}

/// Write all central directory records followed by the end records.
///
/// `cd_offset` is the position of the writer when the first record is
/// written. Returns the number of bytes written.
pub fn write_central_directory<W: Write>(
    headers: &[CentralDirectoryHeader],
    comment: &[u8],
    writer: &mut W,
    cd_offset: u64,
) -> Result<u64> {
    let mut cd_size = 0u64;
    for header in headers {
        header.write(writer)?;
        cd_size += header.encoded_len();
    }

    let eocd = EndOfCentralDirectory {
        entries: headers.len() as u64,
        cd_size,
        cd_offset,
        comment: comment.to_vec(),
    };
    let zip64 = eocd.needs_zip64() || headers.iter().any(|h| h.needs_zip64());
    eocd.write(writer, zip64)?;

    let trailer = if zip64 {
        ZIP64_EOCD_LEN + ZIP64_LOCATOR_LEN
    } else {
        0
    } + EOCD_LEN
        + comment.len() as u64;
    Ok(cd_size + trailer)
}

/// Locate the end records and parse every central directory record.
///
/// The directory must hold exactly the advertised number of records and end
/// exactly where the end record says it does.
pub fn read_central_directory<R: Read + Seek>(reader: &mut R) -> Result<CentralDirectory> {
    let (eocd, cd_end) = EndOfCentralDirectory::find(reader)?;

    if eocd.cd_offset.checked_add(eocd.cd_size) != Some(cd_end) {
        return Err(OxiZipError::corrupt(format!(
            "central directory at {} with size {} does not end at {}",
            eocd.cd_offset, eocd.cd_size, cd_end
        )));
    }

    reader.seek(SeekFrom::Start(eocd.cd_offset))?;
    let mut limited = reader.by_ref().take(eocd.cd_size);
    // Each record needs at least 46 bytes
    let capacity = eocd.entries.min(eocd.cd_size / CENTRAL_HEADER_LEN) as usize;
    let mut headers = Vec::with_capacity(capacity);
    for _ in 0..eocd.entries {
        headers.push(CentralDirectoryHeader::read(&mut limited)?);
    }

    if limited.limit() != 0 {
        return Err(OxiZipError::corrupt(format!(
            "{} stray bytes after the last central directory record",
            limited.limit()
        )));
    }

    Ok(CentralDirectory {
        headers,
        comment: eocd.comment,
        offset: eocd.cd_offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_central(name: &str, offset: u64) -> CentralDirectoryHeader {
        CentralDirectoryHeader {
            version_made_by: VERSION_MADE_BY,
            version_needed: 20,
            flags: 0,
            method: 8,
            modified: DosDateTime::from_fields(2022, 3, 4, 5, 6, 8).unwrap(),
            crc32: 0x1234_5678,
            compressed_size: 10,
            uncompressed_size: 20,
            name: name.as_bytes().to_vec(),
            extra: Vec::new(),
            comment: b"note".to_vec(),
            disk_start: 0,
            internal_attr: 0,
            external_attr: 0o100644 << 16,
            local_header_offset: offset,
        }
    }

    #[test]
    fn test_local_header_layout() {
        let header = LocalFileHeader {
            version_needed: 20,
            flags: FLAG_UNICODE,
            method: 8,
            modified: DosDateTime::default(),
            crc32: 0xCAFEBABE,
            compressed_size: 7,
            uncompressed_size: 9,
            name: b"a.txt".to_vec(),
            extra: Vec::new(),
            zip64: false,
        };
        let bytes = header.to_bytes().unwrap();
        assert_eq!(bytes.len() as u64, header.encoded_len());
        assert_eq!(&bytes[0..4], b"PK\x03\x04");
        assert_eq!(le16(&bytes, 6), FLAG_UNICODE);
        assert_eq!(le32(&bytes, 14), 0xCAFEBABE);
        assert_eq!(&bytes[30..], b"a.txt");

        let parsed = LocalFileHeader::read(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_local_header_forced_zip64() {
        let header = LocalFileHeader {
            version_needed: 45,
            flags: 0,
            method: 0,
            modified: DosDateTime::default(),
            crc32: 0,
            compressed_size: 3,
            uncompressed_size: 3,
            name: b"big.bin".to_vec(),
            extra: Vec::new(),
            zip64: true,
        };
        let bytes = header.to_bytes().unwrap();
        assert_eq!(le32(&bytes, 18), ZIP64_MARKER_32);
        assert_eq!(le32(&bytes, 22), ZIP64_MARKER_32);
        assert_eq!(bytes.len() as u64, header.encoded_len());

        let parsed = LocalFileHeader::read(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(parsed.compressed_size, 3);
        assert!(parsed.zip64);
    }

    #[test]
    fn test_bad_local_signature() {
        let bytes = [0u8; 30];
        let err = LocalFileHeader::read(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, OxiZipError::CorruptArchive { .. }));
    }

    #[test]
    fn test_truncated_local_header() {
        let bytes = b"PK\x03\x04\x14\x00";
        let err = LocalFileHeader::read(&mut Cursor::new(&bytes[..])).unwrap_err();
        assert!(matches!(err, OxiZipError::CorruptArchive { .. }));
    }

    #[test]
    fn test_data_descriptor_with_and_without_signature() {
        let descriptor = DataDescriptor {
            crc32: 0xAABBCCDD,
            compressed_size: 100,
            uncompressed_size: 250,
        };
        let mut out = Vec::new();
        descriptor.write(&mut out, false).unwrap();
        assert_eq!(out.len() as u64, DataDescriptor::encoded_len(false));
        assert_eq!(
            DataDescriptor::read(&mut Cursor::new(&out), false).unwrap(),
            descriptor
        );

        // Signature is optional on read
        let bare = &out[4..];
        assert_eq!(
            DataDescriptor::read(&mut Cursor::new(bare), false).unwrap(),
            descriptor
        );

        let mut out = Vec::new();
        descriptor.write(&mut out, true).unwrap();
        assert_eq!(out.len(), 24);
        assert_eq!(
            DataDescriptor::read(&mut Cursor::new(&out), true).unwrap(),
            descriptor
        );
    }

    #[test]
    fn test_central_directory_roundtrip() {
        let headers = vec![sample_central("one.txt", 0), sample_central("two.txt", 57)];
        let mut out = vec![0u8; 100];
        let written = write_central_directory(&headers, b"archive", &mut out, 100).unwrap();
        assert_eq!(out.len() as u64, 100 + written);

        let cd = read_central_directory(&mut Cursor::new(&out)).unwrap();
        assert_eq!(cd.headers, headers);
        assert_eq!(cd.comment, b"archive");
        assert_eq!(cd.offset, 100);
    }

    #[test]
    fn test_zip64_central_directory() {
        let mut big = sample_central("huge.bin", 6_000_000_000);
        big.uncompressed_size = 5_000_000_000;
        let headers = vec![sample_central("small.txt", 0), big];

        let mut out = Vec::new();
        write_central_directory(&headers, b"", &mut out, 0).unwrap();
        // Zip64 end record present
        assert!(
            out.windows(4)
                .any(|w| w == ZIP64_END_OF_CENTRAL_DIR_SIG.to_le_bytes())
        );

        let cd = read_central_directory(&mut Cursor::new(&out)).unwrap();
        assert_eq!(cd.headers[1].uncompressed_size, 5_000_000_000);
        assert_eq!(cd.headers[1].local_header_offset, 6_000_000_000);
        assert_eq!(cd.headers[1].compressed_size, 10);
        assert!(cd.headers[1].version_needed >= 45);
    }

    #[test]
    fn test_comment_containing_signature() {
        let headers = vec![sample_central("x", 0)];
        let mut comment = b"tricky ".to_vec();
        comment.extend_from_slice(&END_OF_CENTRAL_DIR_SIG.to_le_bytes());
        let mut out = Vec::new();
        write_central_directory(&headers, &comment, &mut out, 0).unwrap();

        let cd = read_central_directory(&mut Cursor::new(&out)).unwrap();
        assert_eq!(cd.comment, comment);
    }

    #[test]
    fn test_directory_count_mismatch() {
        let headers = vec![sample_central("a", 0), sample_central("b", 0)];
        let mut out = Vec::new();
        write_central_directory(&headers, b"", &mut out, 0).unwrap();

        // Claim three entries in the end record
        let eocd = out.len() - EOCD_LEN as usize;
        out[eocd + 8] = 3;
        out[eocd + 10] = 3;
        let err = read_central_directory(&mut Cursor::new(&out)).unwrap_err();
        assert!(matches!(err, OxiZipError::CorruptArchive { .. }));
    }

    #[test]
    fn test_directory_end_mismatch() {
        let headers = vec![sample_central("a", 0)];
        let mut out = Vec::new();
        write_central_directory(&headers, b"", &mut out, 0).unwrap();

        let eocd = out.len() - EOCD_LEN as usize;
        out[eocd + 12] += 1;
        let err = read_central_directory(&mut Cursor::new(&out)).unwrap_err();
        assert!(matches!(err, OxiZipError::CorruptArchive { .. }));
    }

    #[test]
    fn test_missing_end_record() {
        let err = read_central_directory(&mut Cursor::new(vec![0u8; 64])).unwrap_err();
        assert!(matches!(err, OxiZipError::CorruptArchive { .. }));
    }
}
