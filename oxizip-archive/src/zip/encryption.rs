//! Per-entry encryption.
//!
//! [`Encryption`] selects the algorithm, [`Password`] carries the secret in a
//! buffer that is wiped on drop, and [`EncryptingWriter`] sits between the
//! compressor and the output for streamed entries. Buffered entries go
//! through [`encrypt_payload`] and [`decrypt_payload`].

use super::aes::{self, AesStrength, AesWriter};
use super::crypto::{self, ZipCrypto, ZipCryptoWriter};
use oxizip_core::error::{OxiZipError, Result};
use std::fmt;
use std::io::{self, Write};
use zeroize::Zeroizing;

/// Encryption algorithm of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Encryption {
    /// Stored in the clear.
    #[default]
    None,
    /// Traditional PKWARE encryption (ZipCrypto).
    Traditional,
    /// WinZip AES.
    Aes(AesStrength),
}

impl Encryption {
    /// Whether the entry is encrypted.
    pub fn is_encrypted(self) -> bool {
        !matches!(self, Self::None)
    }

    /// Bytes the algorithm adds to the compressed payload.
    pub fn overhead(self) -> u64 {
        match self {
            Self::None => 0,
            Self::Traditional => crypto::HEADER_LEN as u64,
            Self::Aes(strength) => strength.overhead(),
        }
    }
}

impl fmt::Display for Encryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Traditional => f.write_str("zipcrypto"),
            Self::Aes(strength) => write!(f, "aes-{}", strength.bits()),
        }
    }
}

/// A password, wiped from memory when dropped.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(Zeroizing<Vec<u8>>);

impl Password {
    /// Raw password bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

impl From<&str> for Password {
    fn from(value: &str) -> Self {
        Self(Zeroizing::new(value.as_bytes().to_vec()))
    }
}

impl From<String> for Password {
    fn from(value: String) -> Self {
        Self(Zeroizing::new(value.into_bytes()))
    }
}

impl From<&[u8]> for Password {
    fn from(value: &[u8]) -> Self {
        Self(Zeroizing::new(value.to_vec()))
    }
}

/// Source of the ZipCrypto check byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckByte {
    /// High byte of the entry CRC.
    Crc(u32),
    /// High byte of the DOS time word, used with data descriptors.
    ModTime(u16),
}

impl CheckByte {
    /// The byte itself.
    pub fn value(self) -> u8 {
        match self {
            Self::Crc(crc) => (crc >> 24) as u8,
            Self::ModTime(time) => (time >> 8) as u8,
        }
    }
}

/// Encrypt a complete compressed payload.
pub fn encrypt_payload(
    data: &[u8],
    password: &Password,
    encryption: Encryption,
    check: CheckByte,
) -> Result<Vec<u8>> {
    match encryption {
        Encryption::None => Ok(data.to_vec()),
        Encryption::Traditional => {
            let mut cipher = ZipCrypto::new(password.as_bytes());
            let mut out = Vec::with_capacity(crypto::HEADER_LEN + data.len());
            out.extend_from_slice(&cipher.header(check.value())?);
            let start = out.len();
            out.extend_from_slice(data);
            cipher.encrypt_in_place(&mut out[start..]);
            Ok(out)
        }
        Encryption::Aes(strength) => aes::encrypt(data, password.as_bytes(), strength),
    }
}

/// Decrypt a complete payload of entry `name`.
///
/// A failed password check is [`OxiZipError::BadPassword`].
pub fn decrypt_payload(
    data: &[u8],
    password: &Password,
    encryption: Encryption,
    check: CheckByte,
    name: &str,
) -> Result<Vec<u8>> {
    match encryption {
        Encryption::None => Ok(data.to_vec()),
        Encryption::Traditional => {
            let header: &[u8; crypto::HEADER_LEN] = data
                .get(..crypto::HEADER_LEN)
                .and_then(|h| h.try_into().ok())
                .ok_or_else(|| {
                    OxiZipError::corrupt(format!(
                        "encrypted payload of '{}' is shorter than its header",
                        name
                    ))
                })?;
            let mut cipher = ZipCrypto::new(password.as_bytes());
            if !cipher.verify_header(header, check.value()) {
                return Err(OxiZipError::bad_password(name));
            }
            let mut plain = data[crypto::HEADER_LEN..].to_vec();
            cipher.decrypt_in_place(&mut plain);
            Ok(plain)
        }
        Encryption::Aes(strength) => aes::decrypt(data, password.as_bytes(), strength, name),
    }
}

/// Streaming encryption stage.
pub enum EncryptingWriter<W: Write> {
    /// Pass-through.
    Plain(W),
    /// ZipCrypto.
    Traditional(ZipCryptoWriter<W>),
    /// WinZip AES.
    Aes(AesWriter<W>),
}

impl<W: Write> EncryptingWriter<W> {
    /// Start encrypting into `inner`. The encryption header is written
    /// immediately.
    pub fn new(
        inner: W,
        encryption: Encryption,
        password: Option<&Password>,
        check: CheckByte,
    ) -> Result<Self> {
        let secret = || {
            password.ok_or_else(|| {
                OxiZipError::invalid_state("encryption selected without a password")
            })
        };
        Ok(match encryption {
            Encryption::None => Self::Plain(inner),
            Encryption::Traditional => Self::Traditional(ZipCryptoWriter::new(
                inner,
                secret()?.as_bytes(),
                check.value(),
            )?),
            Encryption::Aes(strength) => {
                Self::Aes(AesWriter::new(inner, secret()?.as_bytes(), strength)?)
            }
        })
    }

    /// Mutable access to the wrapped writer.
    pub fn get_mut(&mut self) -> &mut W {
        match self {
            Self::Plain(w) => w,
            Self::Traditional(w) => w.get_mut(),
            Self::Aes(w) => w.get_mut(),
        }
    }

    /// Write any trailer and unwrap.
    pub fn finish(self) -> Result<W> {
        match self {
            Self::Plain(w) => Ok(w),
            Self::Traditional(w) => Ok(w.into_inner()),
            Self::Aes(w) => w.finish(),
        }
    }
}

impl<W: Write> Write for EncryptingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(w) => w.write(buf),
            Self::Traditional(w) => w.write(buf),
            Self::Aes(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(w) => w.flush(),
            Self::Traditional(w) => w.flush(),
            Self::Aes(w) => w.flush(),
        }
    }
}
