//! File name and comment text encoding.
//!
//! Writing is policy driven: an [`EncodingPolicy`] decides which encoding
//! renders a name and whether general purpose bit 11 (the Unicode flag) is
//! set. Reading is flag driven: a set flag means UTF-8 no matter what the
//! reader would otherwise assume, a clear flag means the caller's fallback
//! encoding (IBM437 unless configured otherwise).

use super::cp437;
use super::extra::{self, UnicodePathField};
use super::header::FLAG_UNICODE;
use encoding_rs::Encoding;
use oxizip_core::crc::Crc32;
use oxizip_core::error::{OxiZipError, Result};
use std::fmt;

/// A character encoding usable for entry names and comments.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextEncoding {
    /// IBM code page 437, the traditional ZIP default.
    #[default]
    Cp437,
    /// Any encoding known to `encoding_rs`.
    Codepage(&'static Encoding),
}

impl TextEncoding {
    /// UTF-8.
    pub const UTF8: Self = Self::Codepage(encoding_rs::UTF_8);

    /// Look up an encoding by label, e.g. `"cp437"`, `"utf-8"`, `"shift_jis"`.
    pub fn for_label(label: &str) -> Option<Self> {
        let trimmed = label.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "cp437" | "ibm437" | "437" | "ibm-437" | "dos" => Some(Self::Cp437),
            _ => Encoding::for_label(trimmed.as_bytes()).map(Self::Codepage),
        }
    }

    /// Canonical name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cp437 => "IBM437",
            Self::Codepage(enc) => enc.name(),
        }
    }

    /// Whether this is UTF-8.
    pub fn is_utf8(&self) -> bool {
        matches!(self, Self::Codepage(enc) if *enc == encoding_rs::UTF_8)
    }

    /// Decode bytes, replacing malformed sequences.
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Self::Cp437 => cp437::decode(bytes),
            Self::Codepage(enc) => enc.decode_without_bom_handling(bytes).0.into_owned(),
        }
    }

    /// Encode `text`, returning `None` unless decoding the result gives back
    /// exactly `text`.
    pub fn encode_lossless(&self, text: &str) -> Option<Vec<u8>> {
        match self {
            Self::Cp437 => cp437::encode(text),
            Self::Codepage(enc) => {
                let (bytes, used, had_errors) = enc.encode(text);
                // UTF-16 and "replacement" encode to UTF-8 instead of themselves
                if had_errors || used != *enc {
                    return None;
                }
                let (decoded, malformed) = enc.decode_without_bom_handling(&bytes);
                if malformed || decoded != text {
                    return None;
                }
                Some(bytes.into_owned())
            }
        }
    }
}

impl fmt::Debug for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TextEncoding({})", self.name())
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How names and comments of new entries are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodingPolicy {
    /// One encoding for everything; the Unicode flag is never set.
    Fixed(TextEncoding),
    /// `default` when the text survives it unchanged, `alternate` otherwise.
    AsNecessary {
        /// First choice.
        default: TextEncoding,
        /// Used when `default` cannot represent the text.
        alternate: TextEncoding,
    },
    /// Always the given encoding.
    ///
    /// The Unicode flag is set only when that encoding is UTF-8. Any other
    /// encoding is written with the flag clear, so readers must be told the
    /// code page.
    Always(TextEncoding),
}

impl Default for EncodingPolicy {
    fn default() -> Self {
        Self::as_necessary(TextEncoding::Cp437)
    }
}

impl EncodingPolicy {
    /// As-necessary with a UTF-8 alternate.
    pub fn as_necessary(default: TextEncoding) -> Self {
        Self::AsNecessary {
            default,
            alternate: TextEncoding::UTF8,
        }
    }

    /// Always UTF-8 with the Unicode flag.
    pub fn always_utf8() -> Self {
        Self::Always(TextEncoding::UTF8)
    }
}

/// Encoded name and comment of one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedText {
    /// Name bytes as stored in the headers.
    pub name: Vec<u8>,
    /// Comment bytes as stored in the central directory.
    pub comment: Vec<u8>,
    /// Whether general purpose bit 11 must be set.
    pub unicode: bool,
    /// Encoding that produced the bytes.
    pub encoding: TextEncoding,
}

/// Encode a name under `policy`. Shorthand for [`encode_entry_text`] with
/// no comment.
pub fn encode_name(name: &str, policy: &EncodingPolicy) -> Result<EncodedText> {
    encode_entry_text(name, "", policy)
}

/// Encode an entry's name and comment together.
///
/// Both share one encoding because a single flag bit describes both. Under
/// [`EncodingPolicy::AsNecessary`] the default is used only if it can carry
/// the name and the comment. [`EncodedText::unicode`] is true only for UTF-8
/// output from the alternate or `Always` encoding; `Always` with a legacy code
/// page leaves it false.
pub fn encode_entry_text(name: &str, comment: &str, policy: &EncodingPolicy) -> Result<EncodedText> {
    match *policy {
        EncodingPolicy::Fixed(encoding) => {
            let (name, comment) = encode_pair(encoding, name, comment)?;
            Ok(EncodedText {
                name,
                comment,
                unicode: false,
                encoding,
            })
        }
        EncodingPolicy::AsNecessary { default, alternate } => {
            if let Some(name_bytes) = default.encode_lossless(name) {
                if let Some(comment_bytes) = default.encode_lossless(comment) {
                    return Ok(EncodedText {
                        name: name_bytes,
                        comment: comment_bytes,
                        unicode: false,
                        encoding: default,
                    });
                }
            }
            let (name, comment) = encode_pair(alternate, name, comment)?;
            Ok(EncodedText {
                name,
                comment,
                unicode: alternate.is_utf8(),
                encoding: alternate,
            })
        }
        EncodingPolicy::Always(encoding) => {
            let (name, comment) = encode_pair(encoding, name, comment)?;
            Ok(EncodedText {
                name,
                comment,
                unicode: encoding.is_utf8(),
                encoding,
            })
        }
    }
}

fn encode_pair(encoding: TextEncoding, name: &str, comment: &str) -> Result<(Vec<u8>, Vec<u8>)> {
    let name_bytes = encoding.encode_lossless(name).ok_or_else(|| {
        OxiZipError::encoding(format!("name '{}' is not representable in {}", name, encoding))
    })?;
    let comment_bytes = encoding.encode_lossless(comment).ok_or_else(|| {
        OxiZipError::encoding(format!(
            "comment of '{}' is not representable in {}",
            name, encoding
        ))
    })?;
    Ok((name_bytes, comment_bytes))
}

/// Decode raw header text. A set Unicode flag forces UTF-8.
pub fn decode_text(bytes: &[u8], flags: u16, fallback: TextEncoding) -> String {
    if flags & FLAG_UNICODE != 0 {
        String::from_utf8_lossy(bytes).into_owned()
    } else {
        fallback.decode(bytes)
    }
}

/// Decode an entry name, returning the text and the encoding it was read
/// with.
///
/// With the Unicode flag clear, an Info-ZIP Unicode Path extra field whose
/// CRC matches the raw name takes precedence over the fallback encoding.
pub fn decode_name(
    bytes: &[u8],
    flags: u16,
    extra_field: &[u8],
    fallback: TextEncoding,
) -> (String, TextEncoding) {
    if flags & FLAG_UNICODE != 0 {
        return (String::from_utf8_lossy(bytes).into_owned(), TextEncoding::UTF8);
    }

    if let Some(data) = extra::find(extra_field, extra::UNICODE_PATH_ID) {
        match UnicodePathField::parse(data) {
            Some(field) if field.name_crc32 == Crc32::compute(bytes) => {
                return (field.name, TextEncoding::UTF8);
            }
            Some(_) => log::debug!("ignoring stale Unicode Path field"),
            None => log::warn!("skipping unreadable Unicode Path field"),
        }
    }

    (fallback.decode(bytes), fallback)
}
