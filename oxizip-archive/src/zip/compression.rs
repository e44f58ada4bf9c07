//! Store and deflate.
//!
//! Both directions track the CRC-32 of the uncompressed stream. Buffered
//! compression falls back to store when deflate does not shrink the data.

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use oxizip_core::cancel::CancellationToken;
use oxizip_core::crc::{Crc32, CrcReader, CrcWriter};
use oxizip_core::error::{OxiZipError, Result};
use std::io::{self, Read, Write};

/// Chunk size for streamed inflation and copying.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Compression method as stored in the headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionMethod {
    /// No compression (0).
    Stored,
    /// Deflate (8).
    Deflated,
    /// Anything else; can be listed and copied but not decoded.
    Unknown(u16),
}

impl CompressionMethod {
    /// Method id.
    pub fn to_u16(self) -> u16 {
        match self {
            Self::Stored => 0,
            Self::Deflated => 8,
            Self::Unknown(id) => id,
        }
    }

    /// Parse a method id.
    pub fn from_u16(id: u16) -> Self {
        match id {
            0 => Self::Stored,
            8 => Self::Deflated,
            other => Self::Unknown(other),
        }
    }

    /// Short display name.
    pub fn name(self) -> String {
        match self {
            Self::Stored => "Stored".to_string(),
            Self::Deflated => "Deflate".to_string(),
            Self::Unknown(id) => format!("Method {}", id),
        }
    }
}

/// Compression level for new entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionLevel {
    /// Store without compression.
    Store,
    /// Deflate level 1.
    Fast,
    /// Deflate level 6.
    #[default]
    Normal,
    /// Deflate level 9.
    Best,
}

impl CompressionLevel {
    /// Method produced by this level.
    pub fn method(self) -> CompressionMethod {
        match self {
            Self::Store => CompressionMethod::Stored,
            _ => CompressionMethod::Deflated,
        }
    }

    fn flate2(self) -> Compression {
        match self {
            Self::Store => Compression::none(),
            Self::Fast => Compression::fast(),
            Self::Normal => Compression::default(),
            Self::Best => Compression::best(),
        }
    }
}

/// Result of buffered compression.
#[derive(Debug, Clone)]
pub struct Compressed {
    /// Compressed bytes.
    pub data: Vec<u8>,
    /// Method actually used.
    pub method: CompressionMethod,
    /// CRC-32 of the input.
    pub crc32: u32,
}

/// Compress a complete buffer.
pub fn compress(raw: &[u8], level: CompressionLevel) -> Result<Compressed> {
    let crc32 = Crc32::compute(raw);
    if level == CompressionLevel::Store {
        return Ok(Compressed {
            data: raw.to_vec(),
            method: CompressionMethod::Stored,
            crc32,
        });
    }

    let mut encoder = DeflateEncoder::new(Vec::with_capacity(raw.len() / 2), level.flate2());
    encoder.write_all(raw)?;
    let data = encoder.finish()?;

    if data.len() >= raw.len() {
        log::debug!(
            "deflate did not shrink {} bytes, storing instead",
            raw.len()
        );
        return Ok(Compressed {
            data: raw.to_vec(),
            method: CompressionMethod::Stored,
            crc32,
        });
    }

    Ok(Compressed {
        data,
        method: CompressionMethod::Deflated,
        crc32,
    })
}

/// Decompress a complete buffer and check its length.
pub fn decompress(data: &[u8], method: CompressionMethod, expected_size: u64) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected_size.min(1 << 30) as usize);
    decompress_into(data, method, expected_size, &mut out, None)?;
    Ok(out)
}

/// Decompress into `sink` in [`CHUNK_SIZE`] pieces, polling `cancel` between
/// chunks. Returns the number of bytes written and their CRC-32.
pub fn decompress_into<W: Write>(
    data: &[u8],
    method: CompressionMethod,
    expected_size: u64,
    sink: &mut W,
    cancel: Option<&CancellationToken>,
) -> Result<(u64, u32)> {
    let source: Box<dyn Read + '_> = match method {
        CompressionMethod::Stored => {
            if data.len() as u64 != expected_size {
                return Err(OxiZipError::decompression(format!(
                    "stored entry has {} bytes, expected {}",
                    data.len(),
                    expected_size
                )));
            }
            Box::new(data)
        }
        CompressionMethod::Deflated => Box::new(DeflateDecoder::new(data)),
        CompressionMethod::Unknown(id) => {
            return Err(OxiZipError::unsupported(format!(
                "compression method {}",
                id
            )));
        }
    };

    let mut reader = CrcReader::new(source);
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        if let Some(token) = cancel {
            token.check()?;
        }
        let n = reader.read(&mut buf).map_err(|e| {
            OxiZipError::decompression(format!("corrupt deflate stream: {}", e))
        })?;
        if n == 0 {
            break;
        }
        if reader.count() > expected_size {
            return Err(OxiZipError::decompression(format!(
                "inflated data exceeds the expected {} bytes",
                expected_size
            )));
        }
        sink.write_all(&buf[..n])?;
    }
    if reader.count() != expected_size {
        return Err(OxiZipError::decompression(format!(
            "inflated {} bytes, expected {}",
            reader.count(),
            expected_size
        )));
    }
    Ok((reader.count(), reader.crc()))
}

enum Stage<W: Write> {
    Store(W),
    Deflate(DeflateEncoder<W>),
}

/// Summary of a streamed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
    /// CRC-32 of the uncompressed input.
    pub crc32: u32,
    /// Uncompressed byte count.
    pub uncompressed_size: u64,
}

/// Streaming compressor. Writes are uncompressed input.
pub struct Compressor<W: Write> {
    inner: CrcWriter<Stage<W>>,
}

impl<W: Write> Compressor<W> {
    /// Compress into `inner` at `level`.
    pub fn new(inner: W, level: CompressionLevel) -> Self {
        let stage = match level {
            CompressionLevel::Store => Stage::Store(inner),
            _ => Stage::Deflate(DeflateEncoder::new(inner, level.flate2())),
        };
        Self {
            inner: CrcWriter::new(stage),
        }
    }

    /// Method written to the headers.
    pub fn method(&self) -> CompressionMethod {
        match self.inner.get_ref() {
            Stage::Store(_) => CompressionMethod::Stored,
            Stage::Deflate(_) => CompressionMethod::Deflated,
        }
    }

    /// Uncompressed bytes written so far.
    pub fn count(&self) -> u64 {
        self.inner.count()
    }

    /// Mutable access to the wrapped writer.
    pub fn get_mut(&mut self) -> &mut W {
        match self.inner.get_mut() {
            Stage::Store(w) => w,
            Stage::Deflate(encoder) => encoder.get_mut(),
        }
    }

    /// Flush the compressed stream and unwrap.
    pub fn finish(self) -> Result<(W, StreamSummary)> {
        let (stage, crc32, uncompressed_size) = self.inner.into_parts();
        let inner = match stage {
            Stage::Store(w) => w,
            Stage::Deflate(encoder) => encoder.finish()?,
        };
        Ok((
            inner,
            StreamSummary {
                crc32,
                uncompressed_size,
            },
        ))
    }
}

impl<W: Write> Write for Stage<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Store(w) => w.write(buf),
            Self::Deflate(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Store(w) => w.flush(),
            Self::Deflate(encoder) => encoder.flush(),
        }
    }
}

impl<W: Write> Write for Compressor<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(len: usize) -> Vec<u8> {
        b"the quick brown fox jumps over the lazy dog. "
            .iter()
            .cycle()
            .take(len)
            .copied()
            .collect()
    }

    #[test]
    fn test_deflate_shrinks_text() {
        let raw = text(10_000);
        let packed = compress(&raw, CompressionLevel::Normal).unwrap();
        assert_eq!(packed.method, CompressionMethod::Deflated);
        assert!(packed.data.len() < raw.len() / 4);
        assert_eq!(packed.crc32, Crc32::compute(&raw));
        assert_eq!(decompress(&packed.data, packed.method, raw.len() as u64).unwrap(), raw);
    }

    #[test]
    fn test_incompressible_falls_back_to_store() {
        let raw = vec![0x5Au8];
        let packed = compress(&raw, CompressionLevel::Best).unwrap();
        assert_eq!(packed.method, CompressionMethod::Stored);
        assert_eq!(packed.data, raw);
    }

    #[test]
    fn test_empty_input() {
        let packed = compress(b"", CompressionLevel::Normal).unwrap();
        assert_eq!(packed.crc32, 0);
        assert!(decompress(&packed.data, packed.method, 0).unwrap().is_empty());
    }

    #[test]
    fn test_length_mismatch() {
        let raw = text(1000);
        let packed = compress(&raw, CompressionLevel::Fast).unwrap();
        let err = decompress(&packed.data, packed.method, 999).unwrap_err();
        assert!(matches!(err, OxiZipError::Decompression { .. }));
        let err = decompress(&packed.data, packed.method, 1001).unwrap_err();
        assert!(matches!(err, OxiZipError::Decompression { .. }));
    }

    #[test]
    fn test_corrupt_stream() {
        let err = decompress(&[0xFF, 0xFF, 0xFF, 0xFF], CompressionMethod::Deflated, 10)
            .unwrap_err();
        assert!(matches!(err, OxiZipError::Decompression { .. }));
    }

    #[test]
    fn test_unknown_method() {
        let err = decompress(b"abc", CompressionMethod::from_u16(12), 3).unwrap_err();
        assert!(matches!(err, OxiZipError::UnsupportedFeature { .. }));
    }

    #[test]
    fn test_streaming_compressor() {
        let raw = text(200_000);
        let mut compressor = Compressor::new(Vec::new(), CompressionLevel::Normal);
        for chunk in raw.chunks(4096) {
            compressor.write_all(chunk).unwrap();
        }
        let (data, summary) = compressor.finish().unwrap();
        assert_eq!(summary.uncompressed_size, raw.len() as u64);
        assert_eq!(summary.crc32, Crc32::compute(&raw));

        let mut out = Vec::new();
        let (count, crc) =
            decompress_into(&data, CompressionMethod::Deflated, raw.len() as u64, &mut out, None)
                .unwrap();
        assert_eq!(count, raw.len() as u64);
        assert_eq!(crc, summary.crc32);
        assert_eq!(out, raw);
    }

    #[test]
    fn test_cancelled_inflate() {
        let raw = text(1000);
        let packed = compress(&raw, CompressionLevel::Normal).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let err = decompress_into(&packed.data, packed.method, 1000, &mut Vec::new(), Some(&token))
            .unwrap_err();
        assert!(matches!(err, OxiZipError::Cancelled));
    }
}
