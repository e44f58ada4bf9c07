//! Traditional PKWARE encryption (ZipCrypto).
//!
//! A byte-oriented stream cipher keyed by three 32-bit registers that are
//! stirred with CRC-32 steps. Every encrypted payload starts with a 12-byte
//! header: eleven random bytes and one check byte that lets a reader reject
//! most wrong passwords before touching the data. The check byte is the high
//! byte of the entry CRC, or the high byte of the DOS time word when the entry
//! uses a data descriptor.
//!
//! The cipher is weak; prefer AES for anything that matters.

use oxizip_core::error::Result;
use std::io::{self, Write};

/// CRC-32 table for the key schedule (polynomial 0xEDB88320, reflected).
const KEY_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0usize;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xEDB88320
            } else {
                crc >> 1
            };
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

const INITIAL_KEYS: (u32, u32, u32) = (0x12345678, 0x23456789, 0x34567890);

/// Size of the encryption header in bytes.
pub const HEADER_LEN: usize = 12;

#[inline]
fn crc_step(crc: u32, byte: u8) -> u32 {
    KEY_TABLE[((crc ^ byte as u32) & 0xFF) as usize] ^ (crc >> 8)
}

/// ZipCrypto cipher state.
#[derive(Clone)]
pub struct ZipCrypto {
    keys: (u32, u32, u32),
}

impl std::fmt::Debug for ZipCrypto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ZipCrypto { .. }")
    }
}

impl ZipCrypto {
    /// Initialize the key registers from a password.
    #[must_use]
    pub fn new(password: &[u8]) -> Self {
        let mut cipher = Self { keys: INITIAL_KEYS };
        for &byte in password {
            cipher.update_keys(byte);
        }
        cipher
    }

    #[inline]
    fn update_keys(&mut self, byte: u8) {
        let (k0, k1, k2) = &mut self.keys;
        *k0 = crc_step(*k0, byte);
        *k1 = k1
            .wrapping_add(*k0 & 0xFF)
            .wrapping_mul(134775813)
            .wrapping_add(1);
        *k2 = crc_step(*k2, (*k1 >> 24) as u8);
    }

    #[inline]
    fn keystream(&self) -> u8 {
        let temp = (self.keys.2 | 2) as u16;
        (temp.wrapping_mul(temp ^ 1) >> 8) as u8
    }

    /// Encrypt one byte.
    #[inline]
    pub fn encrypt_byte(&mut self, plain: u8) -> u8 {
        let out = plain ^ self.keystream();
        self.update_keys(plain);
        out
    }

    /// Decrypt one byte.
    #[inline]
    pub fn decrypt_byte(&mut self, cipher: u8) -> u8 {
        let plain = cipher ^ self.keystream();
        self.update_keys(plain);
        plain
    }

    /// Encrypt a buffer in place.
    pub fn encrypt_in_place(&mut self, buf: &mut [u8]) {
        for byte in buf.iter_mut() {
            *byte = self.encrypt_byte(*byte);
        }
    }

    /// Decrypt a buffer in place.
    pub fn decrypt_in_place(&mut self, buf: &mut [u8]) {
        for byte in buf.iter_mut() {
            *byte = self.decrypt_byte(*byte);
        }
    }

    /// Build an encrypted header from eleven random bytes and the check byte.
    pub fn header_from(&mut self, random: &[u8; 11], check: u8) -> [u8; HEADER_LEN] {
        let mut header = [0u8; HEADER_LEN];
        header[..11].copy_from_slice(random);
        header[11] = check;
        self.encrypt_in_place(&mut header);
        header
    }

    /// Build an encrypted header with fresh random bytes from the OS.
    pub fn header(&mut self, check: u8) -> Result<[u8; HEADER_LEN]> {
        let mut random = [0u8; 11];
        getrandom::fill(&mut random).map_err(|e| io::Error::other(e.to_string()))?;
        Ok(self.header_from(&random, check))
    }

    /// Decrypt a header and compare its check byte. The cipher is left
    /// positioned at the start of the payload either way.
    pub fn verify_header(&mut self, header: &[u8; HEADER_LEN], check: u8) -> bool {
        let mut plain = *header;
        self.decrypt_in_place(&mut plain);
        plain[11] == check
    }
}

/// Writer that emits the encryption header and then encrypts everything
/// written through it.
pub struct ZipCryptoWriter<W: Write> {
    inner: W,
    cipher: ZipCrypto,
    scratch: Vec<u8>,
}

impl<W: Write> ZipCryptoWriter<W> {
    /// Write the header to `inner` and return the encrypting writer.
    pub fn new(mut inner: W, password: &[u8], check: u8) -> Result<Self> {
        let mut cipher = ZipCrypto::new(password);
        inner.write_all(&cipher.header(check)?)?;
        Ok(Self {
            inner,
            cipher,
            scratch: Vec::new(),
        })
    }

    /// Mutable access to the wrapped writer.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Unwrap.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for ZipCryptoWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.scratch.clear();
        self.scratch.extend_from_slice(buf);
        self.cipher.encrypt_in_place(&mut self.scratch);
        self.inner.write_all(&self.scratch)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_sets_keys() {
        assert_eq!(ZipCrypto::new(b"").keys, INITIAL_KEYS);
        assert_eq!(ZipCrypto::new(b"test").keys, ZipCrypto::new(b"test").keys);
        assert_ne!(ZipCrypto::new(b"test").keys, ZipCrypto::new(b"tset").keys);
    }

    #[test]
    fn test_roundtrip() {
        let original: Vec<u8> = (0..5000).map(|i| (i * 7 % 256) as u8).collect();
        let mut data = original.clone();
        ZipCrypto::new(b"secret").encrypt_in_place(&mut data);
        assert_ne!(data, original);
        ZipCrypto::new(b"secret").decrypt_in_place(&mut data);
        assert_eq!(data, original);
    }

    #[test]
    fn test_header_check_byte() {
        let crc: u32 = 0xDEADBEEF;
        let check = (crc >> 24) as u8;
        let header = ZipCrypto::new(b"pw").header_from(&[0x11; 11], check);

        assert!(ZipCrypto::new(b"pw").verify_header(&header, check));
        assert!(!ZipCrypto::new(b"pw").verify_header(&header, check ^ 1));
    }

    #[test]
    fn test_mtime_check_byte() {
        let time: u16 = 0x5678;
        let header = ZipCrypto::new(b"pw").header(0x56).unwrap();
        assert!(ZipCrypto::new(b"pw").verify_header(&header, (time >> 8) as u8));
    }

    #[test]
    fn test_random_headers_differ() {
        let a = ZipCrypto::new(b"pw").header(0).unwrap();
        let b = ZipCrypto::new(b"pw").header(0).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_writer_output_decrypts() {
        let plaintext = b"Data to encrypt via writer";
        let mut writer = ZipCryptoWriter::new(Vec::new(), b"secret", 0x12).unwrap();
        writer.write_all(plaintext).unwrap();
        let output = writer.into_inner();
        assert_eq!(output.len(), HEADER_LEN + plaintext.len());

        let mut cipher = ZipCrypto::new(b"secret");
        let header: [u8; HEADER_LEN] = output[..HEADER_LEN].try_into().unwrap();
        assert!(cipher.verify_header(&header, 0x12));
        let mut body = output[HEADER_LEN..].to_vec();
        cipher.decrypt_in_place(&mut body);
        assert_eq!(body, plaintext);
    }
}
