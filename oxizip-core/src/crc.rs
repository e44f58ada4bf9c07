//! CRC-32 (ISO 3309) as used by ZIP.
//!
//! [`Crc32`] is a thin incremental wrapper around `crc32fast`, which picks a
//! SIMD implementation at runtime when one is available. [`CrcWriter`] and
//! [`CrcReader`] compute the checksum of everything that passes through them,
//! which is how the archive layer tracks the CRC of the uncompressed stream
//! while it is being compressed or inflated.

use std::io::{self, Read, Write};

/// Incremental CRC-32 hasher.
#[derive(Debug, Clone, Default)]
pub struct Crc32 {
    hasher: crc32fast::Hasher,
}

impl Crc32 {
    /// Create a new CRC-32 hasher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to the initial state.
    pub fn reset(&mut self) {
        self.hasher.reset();
    }

    /// Feed more data.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Current CRC value without consuming the hasher.
    pub fn value(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// Consume the hasher and return the final CRC value.
    pub fn finalize(self) -> u32 {
        self.hasher.finalize()
    }

    /// Compute the CRC-32 of a complete buffer.
    pub fn compute(data: &[u8]) -> u32 {
        crc32fast::hash(data)
    }
}

/// A writer that computes the CRC-32 and byte count of everything written.
#[derive(Debug)]
pub struct CrcWriter<W> {
    inner: W,
    crc: Crc32,
    count: u64,
}

impl<W: Write> CrcWriter<W> {
    /// Wrap a writer.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            crc: Crc32::new(),
            count: 0,
        }
    }

    /// CRC of the bytes written so far.
    pub fn crc(&self) -> u32 {
        self.crc.value()
    }

    /// Number of bytes written so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Shared access to the wrapped writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Mutable access to the wrapped writer.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Unwrap, returning the inner writer, the CRC and the byte count.
    pub fn into_parts(self) -> (W, u32, u64) {
        (self.inner, self.crc.finalize(), self.count)
    }
}

impl<W: Write> Write for CrcWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.crc.update(&buf[..written]);
        self.count += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// A reader that computes the CRC-32 and byte count of everything read.
#[derive(Debug)]
pub struct CrcReader<R> {
    inner: R,
    crc: Crc32,
    count: u64,
}

impl<R: Read> CrcReader<R> {
    /// Wrap a reader.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            crc: Crc32::new(),
            count: 0,
        }
    }

    /// CRC of the bytes read so far.
    pub fn crc(&self) -> u32 {
        self.crc.value()
    }

    /// Number of bytes read so far.
    pub fn count(&self) -> u64 {
        self.count
    }
}

impl<R: Read> Read for CrcReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.crc.update(&buf[..n]);
        self.count += n as u64;
        Ok(n)
    }
}
