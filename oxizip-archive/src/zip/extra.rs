//! Extra field records.
//!
//! An extra field block is a sequence of `(id: u16, len: u16, data)` records.
//! The archive layer understands three of them: Zip64 extended information
//! (0x0001), WinZip AES (0x9901) and the Info-ZIP Unicode Path (0x7075).
//! Everything else is carried through untouched.

use super::aes::{AesStrength, AesVendorVersion};
use oxizip_core::error::{OxiZipError, Result};

/// Zip64 extended information.
pub const ZIP64_ID: u16 = 0x0001;

/// WinZip AES encryption.
pub const AES_ID: u16 = 0x9901;

/// Info-ZIP Unicode Path.
pub const UNICODE_PATH_ID: u16 = 0x7075;

/// Iterator over the records of an extra field block.
///
/// Iteration stops at the first record whose declared length runs past the
/// end of the block.
#[derive(Debug, Clone)]
pub struct ExtraFields<'a> {
    data: &'a [u8],
}

impl<'a> Iterator for ExtraFields<'a> {
    type Item = (u16, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.len() < 4 {
            return None;
        }
        let id = u16::from_le_bytes([self.data[0], self.data[1]]);
        let len = u16::from_le_bytes([self.data[2], self.data[3]]) as usize;
        if 4 + len > self.data.len() {
            log::warn!("truncated extra field record {:#06x}", id);
            self.data = &[];
            return None;
        }
        let body = &self.data[4..4 + len];
        self.data = &self.data[4 + len..];
        Some((id, body))
    }
}

/// Iterate the records of `extra`.
pub fn fields(extra: &[u8]) -> ExtraFields<'_> {
    ExtraFields { data: extra }
}

/// Body of the first record with the given id.
pub fn find(extra: &[u8], id: u16) -> Option<&[u8]> {
    fields(extra).find(|(field_id, _)| *field_id == id).map(|(_, body)| body)
}

/// Copy of `extra` without records whose id is in `ids`.
pub fn without(extra: &[u8], ids: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(extra.len());
    for (id, body) in fields(extra) {
        if !ids.contains(&id) {
            push_record(&mut out, id, body);
        }
    }
    out
}

/// Append one record.
pub fn push_record(out: &mut Vec<u8>, id: u16, body: &[u8]) {
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&(body.len() as u16).to_le_bytes());
    out.extend_from_slice(body);
}

/// Zip64 extended information.
///
/// Only the values whose 32-bit header field holds the sentinel are present,
/// always in the order uncompressed size, compressed size, local header
/// offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Zip64Field {
    /// Uncompressed size.
    pub uncompressed_size: Option<u64>,
    /// Compressed size.
    pub compressed_size: Option<u64>,
    /// Local header offset (central directory only).
    pub header_offset: Option<u64>,
}

impl Zip64Field {
    /// Parse the values the header asked for.
    pub fn parse(
        body: &[u8],
        want_uncompressed: bool,
        want_compressed: bool,
        want_offset: bool,
    ) -> Result<Self> {
        let mut pos = 0;
        let mut take = |wanted: bool, what: &str| -> Result<Option<u64>> {
            if !wanted {
                return Ok(None);
            }
            let bytes = body.get(pos..pos + 8).ok_or_else(|| {
                OxiZipError::corrupt(format!("Zip64 extra field is missing the {}", what))
            })?;
            pos += 8;
            Ok(Some(u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ])))
        };

        let uncompressed_size = take(want_uncompressed, "uncompressed size")?;
        let compressed_size = take(want_compressed, "compressed size")?;
        let header_offset = take(want_offset, "local header offset")?;

        Ok(Self {
            uncompressed_size,
            compressed_size,
            header_offset,
        })
    }

    /// Whether any value is present.
    pub fn is_empty(&self) -> bool {
        self.uncompressed_size.is_none()
            && self.compressed_size.is_none()
            && self.header_offset.is_none()
    }

    /// Serialize as a complete record, header included.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(24);
        for value in [
            self.uncompressed_size,
            self.compressed_size,
            self.header_offset,
        ]
        .into_iter()
        .flatten()
        {
            body.extend_from_slice(&value.to_le_bytes());
        }
        let mut out = Vec::with_capacity(body.len() + 4);
        push_record(&mut out, ZIP64_ID, &body);
        out
    }
}

/// WinZip AES extra field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AesField {
    /// AE-1 or AE-2.
    pub version: AesVendorVersion,
    /// Key size.
    pub strength: AesStrength,
    /// Compression method applied before encryption.
    pub method: u16,
}

impl AesField {
    /// Parse the record body.
    pub fn parse(body: &[u8]) -> Result<Self> {
        if body.len() < 7 {
            return Err(OxiZipError::corrupt("AES extra field too short"));
        }
        let version = match u16::from_le_bytes([body[0], body[1]]) {
            1 => AesVendorVersion::Ae1,
            2 => AesVendorVersion::Ae2,
            other => {
                return Err(OxiZipError::unsupported(format!(
                    "AES vendor version {}",
                    other
                )));
            }
        };
        if &body[2..4] != b"AE" {
            return Err(OxiZipError::corrupt("AES extra field has a bad vendor id"));
        }
        let strength = AesStrength::from_u8(body[4]).ok_or_else(|| {
            OxiZipError::unsupported(format!("AES strength {}", body[4]))
        })?;
        let method = u16::from_le_bytes([body[5], body[6]]);
        Ok(Self {
            version,
            strength,
            method,
        })
    }

    /// Serialize as a complete record, header included.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(7);
        // Vendor version
        body.extend_from_slice(&(self.version as u16).to_le_bytes());
        // Vendor id
        body.extend_from_slice(b"AE");
        // Strength
        body.push(self.strength as u8);
        // Actual compression method
        body.extend_from_slice(&self.method.to_le_bytes());

        let mut out = Vec::with_capacity(11);
        push_record(&mut out, AES_ID, &body);
        out
    }
}

/// Info-ZIP Unicode Path extra field (version 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnicodePathField {
    /// CRC-32 of the raw header name this field belongs to.
    pub name_crc32: u32,
    /// UTF-8 name.
    pub name: String,
}

impl UnicodePathField {
    /// Parse the record body, `None` if it is malformed.
    pub fn parse(body: &[u8]) -> Option<Self> {
        if body.len() < 5 || body[0] != 1 {
            return None;
        }
        let name_crc32 = u32::from_le_bytes([body[1], body[2], body[3], body[4]]);
        let name = std::str::from_utf8(&body[5..]).ok()?.to_string();
        Some(Self { name_crc32, name })
    }

    /// Serialize as a complete record, header included.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(5 + self.name.len());
        body.push(1);
        body.extend_from_slice(&self.name_crc32.to_le_bytes());
        body.extend_from_slice(self.name.as_bytes());
        let mut out = Vec::with_capacity(body.len() + 4);
        push_record(&mut out, UNICODE_PATH_ID, &body);
        out
    }
}
