//! WinZip AES encryption (AE-1 / AE-2).
//!
//! Payload layout: `salt | password verifier (2) | ciphertext | auth code (10)`.
//! Keys come from PBKDF2-HMAC-SHA1 with 1000 iterations; the derived block
//! is the encryption key, then the HMAC key, then the two verifier bytes.
//! Encryption is AES in CTR mode with a little-endian counter starting at 1,
//! and the auth code is the first 10 bytes of HMAC-SHA1 over the ciphertext.

use aes::cipher::{BlockEncrypt, KeyInit};
use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use oxizip_core::error::{OxiZipError, Result};
use sha1::Sha1;
use std::io::{self, Write};
use zeroize::{Zeroize, Zeroizing};

/// Length of the password verification value.
pub const VERIFIER_LEN: usize = 2;

/// Length of the HMAC-SHA1-80 authentication code.
pub const AUTH_CODE_LEN: usize = 10;

const ITERATIONS: u32 = 1000;
const BLOCK_LEN: usize = 16;

type HmacSha1 = Hmac<Sha1>;

/// AES key size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum AesStrength {
    /// 128-bit key.
    Aes128 = 1,
    /// 192-bit key.
    Aes192 = 2,
    /// 256-bit key.
    #[default]
    Aes256 = 3,
}

impl AesStrength {
    /// Parse the strength byte of the extra field.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Aes128),
            2 => Some(Self::Aes192),
            3 => Some(Self::Aes256),
            _ => None,
        }
    }

    /// Salt length in bytes.
    pub fn salt_len(self) -> usize {
        match self {
            Self::Aes128 => 8,
            Self::Aes192 => 12,
            Self::Aes256 => 16,
        }
    }

    /// Key length in bytes.
    pub fn key_len(self) -> usize {
        match self {
            Self::Aes128 => 16,
            Self::Aes192 => 24,
            Self::Aes256 => 32,
        }
    }

    /// Key size in bits.
    pub fn bits(self) -> u16 {
        self.key_len() as u16 * 8
    }

    /// Bytes added to the payload: salt, verifier and auth code.
    pub fn overhead(self) -> u64 {
        (self.salt_len() + VERIFIER_LEN + AUTH_CODE_LEN) as u64
    }
}

/// AE-x vendor version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AesVendorVersion {
    /// CRC is stored and checked.
    Ae1 = 1,
    /// CRC is zero and ignored; the auth code protects the data.
    Ae2 = 2,
}

enum BlockCipher {
    Aes128(aes::Aes128),
    Aes192(aes::Aes192),
    Aes256(aes::Aes256),
}

impl BlockCipher {
    fn new(strength: AesStrength, key: &[u8]) -> Result<Self> {
        let invalid = |_| OxiZipError::corrupt("AES key has the wrong length");
        Ok(match strength {
            AesStrength::Aes128 => Self::Aes128(aes::Aes128::new_from_slice(key).map_err(invalid)?),
            AesStrength::Aes192 => Self::Aes192(aes::Aes192::new_from_slice(key).map_err(invalid)?),
            AesStrength::Aes256 => Self::Aes256(aes::Aes256::new_from_slice(key).map_err(invalid)?),
        })
    }

    fn encrypt_block(&self, block: &mut aes::Block) {
        match self {
            Self::Aes128(c) => c.encrypt_block(block),
            Self::Aes192(c) => c.encrypt_block(block),
            Self::Aes256(c) => c.encrypt_block(block),
        }
    }
}

/// AES-CTR keystream with the WinZip counter layout.
struct CtrKeystream {
    cipher: BlockCipher,
    counter: u128,
    block: [u8; BLOCK_LEN],
    used: usize,
}

impl CtrKeystream {
    fn new(cipher: BlockCipher) -> Self {
        Self {
            cipher,
            counter: 0,
            block: [0; BLOCK_LEN],
            used: BLOCK_LEN,
        }
    }

    fn apply(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            if self.used == BLOCK_LEN {
                self.counter = self.counter.wrapping_add(1);
                let mut block = aes::Block::clone_from_slice(&self.counter.to_le_bytes());
                self.cipher.encrypt_block(&mut block);
                self.block.copy_from_slice(&block);
                self.used = 0;
            }
            *byte ^= self.block[self.used];
            self.used += 1;
        }
    }
}

impl Drop for CtrKeystream {
    fn drop(&mut self) {
        self.block.zeroize();
    }
}

struct DerivedKeys {
    cipher: CtrKeystream,
    hmac: HmacSha1,
    verifier: [u8; VERIFIER_LEN],
}

fn derive(password: &[u8], salt: &[u8], strength: AesStrength) -> Result<DerivedKeys> {
    let key_len = strength.key_len();
    let mut derived = Zeroizing::new(vec![0u8; 2 * key_len + VERIFIER_LEN]);
    pbkdf2::pbkdf2::<HmacSha1>(password, salt, ITERATIONS, &mut derived)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

    let cipher = BlockCipher::new(strength, &derived[..key_len])?;
    let hmac = <HmacSha1 as Mac>::new_from_slice(&derived[key_len..2 * key_len])
        .map_err(|_| OxiZipError::corrupt("HMAC key has the wrong length"))?;
    let mut verifier = [0u8; VERIFIER_LEN];
    verifier.copy_from_slice(&derived[2 * key_len..]);

    Ok(DerivedKeys {
        cipher: CtrKeystream::new(cipher),
        hmac,
        verifier,
    })
}

fn random_salt(strength: AesStrength) -> Result<Vec<u8>> {
    let mut salt = vec![0u8; strength.salt_len()];
    getrandom::fill(&mut salt).map_err(|e| io::Error::other(e.to_string()))?;
    Ok(salt)
}

/// Writer that emits the salt and verifier, encrypts everything written
/// through it and appends the auth code on [`finish`](Self::finish).
pub struct AesWriter<W: Write> {
    inner: W,
    cipher: CtrKeystream,
    hmac: HmacSha1,
    buffer: Zeroizing<Vec<u8>>,
}

impl<W: Write> AesWriter<W> {
    /// Derive keys from a fresh salt and write the salt and verifier.
    pub fn new(mut inner: W, password: &[u8], strength: AesStrength) -> Result<Self> {
        let salt = random_salt(strength)?;
        let keys = derive(password, &salt, strength)?;
        inner.write_all(&salt)?;
        inner.write_all(&keys.verifier)?;
        Ok(Self {
            inner,
            cipher: keys.cipher,
            hmac: keys.hmac,
            buffer: Zeroizing::new(Vec::new()),
        })
    }

    /// Mutable access to the wrapped writer.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Write the auth code and unwrap.
    pub fn finish(mut self) -> Result<W> {
        let code = self.hmac.finalize().into_bytes();
        self.inner.write_all(&code[..AUTH_CODE_LEN])?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for AesWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.clear();
        self.buffer.extend_from_slice(buf);
        self.cipher.apply(&mut self.buffer);
        self.hmac.update(&self.buffer);
        self.inner.write_all(&self.buffer)?;
        self.buffer.zeroize();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Encrypt a complete payload.
pub fn encrypt(data: &[u8], password: &[u8], strength: AesStrength) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() + strength.overhead() as usize);
    let mut writer = AesWriter::new(&mut out, password, strength)?;
    writer.write_all(data)?;
    writer.finish()?;
    Ok(out)
}

/// Decrypt a complete payload.
///
/// A wrong verifier or auth code is reported as a bad password for `entry`.
pub fn decrypt(data: &[u8], password: &[u8], strength: AesStrength, entry: &str) -> Result<Vec<u8>> {
    let salt_len = strength.salt_len();
    if (data.len() as u64) < strength.overhead() {
        return Err(OxiZipError::corrupt(format!(
            "AES payload of '{}' is shorter than its header",
            entry
        )));
    }

    let salt = &data[..salt_len];
    let stored_verifier = &data[salt_len..salt_len + VERIFIER_LEN];
    let body = &data[salt_len + VERIFIER_LEN..data.len() - AUTH_CODE_LEN];
    let stored_code = &data[data.len() - AUTH_CODE_LEN..];

    let mut keys = derive(password, salt, strength)?;
    if !constant_time_eq(&keys.verifier, stored_verifier) {
        return Err(OxiZipError::bad_password(entry));
    }

    keys.hmac.update(body);
    let code = keys.hmac.finalize().into_bytes();
    if !constant_time_eq(&code[..AUTH_CODE_LEN], stored_code) {
        log::debug!("AES auth code mismatch for '{}'", entry);
        return Err(OxiZipError::bad_password(entry));
    }

    let mut plain = body.to_vec();
    keys.cipher.apply(&mut plain);
    Ok(plain)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSWORD: &[u8] = b"some super secret password";

    #[test]
    fn test_roundtrip_all_strengths() {
        let plaintext = b"Lorem ipsum dolor sit amet, consectetur\n";
        for strength in [AesStrength::Aes128, AesStrength::Aes192, AesStrength::Aes256] {
            let sealed = encrypt(plaintext, PASSWORD, strength).unwrap();
            assert_eq!(sealed.len() as u64, plaintext.len() as u64 + strength.overhead());
            assert_ne!(&sealed[strength.salt_len() + 2..][..plaintext.len()], plaintext);
            let opened = decrypt(&sealed, PASSWORD, strength, "x").unwrap();
            assert_eq!(opened, plaintext);
        }
    }

    #[test]
    fn test_empty_payload() {
        let sealed = encrypt(b"", PASSWORD, AesStrength::Aes256).unwrap();
        assert_eq!(sealed.len(), 16 + 2 + 10);
        assert!(decrypt(&sealed, PASSWORD, AesStrength::Aes256, "x").unwrap().is_empty());
    }

    #[test]
    fn test_wrong_password() {
        let sealed = encrypt(b"secret data", PASSWORD, AesStrength::Aes128).unwrap();
        let err = decrypt(&sealed, b"nope", AesStrength::Aes128, "x").unwrap_err();
        assert!(matches!(err, OxiZipError::BadPassword { .. }));
    }

    #[test]
    fn test_tampered_ciphertext() {
        let mut sealed = encrypt(b"secret data", PASSWORD, AesStrength::Aes256).unwrap();
        sealed[20] ^= 0x01;
        let err = decrypt(&sealed, PASSWORD, AesStrength::Aes256, "x").unwrap_err();
        assert!(matches!(err, OxiZipError::BadPassword { .. }));
    }

    #[test]
    fn test_truncated_payload() {
        let err = decrypt(&[0u8; 10], PASSWORD, AesStrength::Aes256, "x").unwrap_err();
        assert!(matches!(err, OxiZipError::CorruptArchive { .. }));
    }

    #[test]
    fn test_keystream_spans_blocks() {
        // Chunked writes must match a single write
        let data: Vec<u8> = (0..100u8).collect();
        let mut whole = CtrKeystream::new(BlockCipher::new(AesStrength::Aes128, &[7; 16]).unwrap());
        let mut chunked =
            CtrKeystream::new(BlockCipher::new(AesStrength::Aes128, &[7; 16]).unwrap());
        let mut a = data.clone();
        whole.apply(&mut a);
        let mut b = data.clone();
        for chunk in b.chunks_mut(7) {
            chunked.apply(chunk);
        }
        assert_eq!(a, b);
    }

    #[test]
    fn test_strength_parameters() {
        assert_eq!(AesStrength::from_u8(2), Some(AesStrength::Aes192));
        assert_eq!(AesStrength::Aes192.salt_len(), 12);
        assert_eq!(AesStrength::Aes128.bits(), 128);
        assert!(AesStrength::from_u8(0).is_none());
    }
}
