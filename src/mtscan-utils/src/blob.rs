//! Cursor over an immutable byte buffer with big-endian primitive reads
//! and in-place decompression of nested zlib/zstd streams.

use std::io::{self, Read};

use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

/// A malformed input blob.
///
/// Carries enough positional context to locate the offending bytes in
/// the original buffer.
#[derive(Clone, Debug, Error)]
#[error("{label}: {detail} (blob size {size}, offset {offset}, {remaining} remaining)")]
pub struct SerializationError {
    pub size: usize,
    pub offset: usize,
    pub remaining: usize,
    pub label: &'static str,
    pub detail: String,
}

/// Reader over a borrowed byte buffer with a moving cursor.
///
/// All primitive reads are big-endian. Every operation fails with a
/// [`SerializationError`] instead of reading past the end of the buffer.
pub struct BlobReader<'a> {
    blob: &'a [u8],
    offset: usize,
}

impl<'a> BlobReader<'a> {
    pub fn new(blob: &'a [u8]) -> Self {
        Self { blob, offset: 0 }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.blob.len()
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.blob.len() - self.offset
    }

    #[inline]
    pub fn eof(&self) -> bool {
        self.remaining() == 0
    }

    /// The not-yet-consumed tail of the buffer.
    #[inline]
    pub fn remaining_bytes(&self) -> &'a [u8] {
        &self.blob[self.offset..]
    }

    /// Builds a [`SerializationError`] at the current cursor position.
    pub fn error(&self, label: &'static str, detail: impl Into<String>) -> SerializationError {
        SerializationError {
            size: self.size(),
            offset: self.offset,
            remaining: self.remaining(),
            label,
            detail: detail.into(),
        }
    }

    /// Fails unless at least `n` more bytes are available.
    pub fn size_check(&self, n: usize, label: &'static str) -> Result<(), SerializationError> {
        if self.remaining() < n {
            return Err(self.error(label, format!("need {n} bytes")));
        }
        Ok(())
    }

    pub fn skip(&mut self, n: usize, label: &'static str) -> Result<(), SerializationError> {
        self.size_check(n, label)?;
        self.offset += n;
        Ok(())
    }

    pub fn read_u8(&mut self, label: &'static str) -> Result<u8, SerializationError> {
        self.size_check(1, label)?;
        let v = self.blob[self.offset];
        self.offset += 1;
        Ok(v)
    }

    pub fn read_u16(&mut self, label: &'static str) -> Result<u16, SerializationError> {
        self.size_check(2, label)?;
        let v = BigEndian::read_u16(&self.blob[self.offset..]);
        self.offset += 2;
        Ok(v)
    }

    pub fn read_u32(&mut self, label: &'static str) -> Result<u32, SerializationError> {
        self.size_check(4, label)?;
        let v = BigEndian::read_u32(&self.blob[self.offset..]);
        self.offset += 4;
        Ok(v)
    }

    pub fn read_s32(&mut self, label: &'static str) -> Result<i32, SerializationError> {
        self.read_u32(label).map(|v| v as i32)
    }

    /// Reads exactly `n` bytes as an opaque string.
    ///
    /// Node and metadata names are ASCII in practice; anything else is
    /// preserved lossily rather than rejected.
    pub fn read_str(&mut self, n: usize, label: &'static str) -> Result<String, SerializationError> {
        self.size_check(n, label)?;
        let raw = &self.blob[self.offset..self.offset + n];
        self.offset += n;
        Ok(String::from_utf8_lossy(raw).into_owned())
    }

    /// Reads up to the next `\n`, which is consumed but not returned.
    ///
    /// Only printable ASCII is permitted before the newline.
    pub fn read_line(&mut self, label: &'static str) -> Result<String, SerializationError> {
        let start = self.offset;
        while self.offset < self.blob.len() {
            let b = self.blob[self.offset];
            if b == b'\n' {
                let line = String::from_utf8_lossy(&self.blob[start..self.offset]).into_owned();
                self.offset += 1;
                return Ok(line);
            }
            if !(0x20..=0x7e).contains(&b) {
                return Err(self.error(label, "garbage data during read_line()"));
            }
            self.offset += 1;
        }
        Err(self.error(label, "end of blob without \\n during read_line()"))
    }

    /// Inflates one zlib stream starting at the cursor.
    ///
    /// The compressed length is not known in advance; the streaming
    /// decoder stops at the end of the deflate stream and the cursor is
    /// advanced to the first byte after it.
    pub fn decompress_zlib(&mut self, label: &'static str) -> Result<Vec<u8>, SerializationError> {
        let mut decoder = flate2::read::ZlibDecoder::new(self.remaining_bytes());
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| self.error(label, format!("zlib: {e}")))?;

        let consumed = decoder.total_in() as usize;
        self.offset += consumed;
        Ok(out)
    }

    /// Same contract as [`Self::decompress_zlib`], for a zstd frame.
    pub fn decompress_zstd(&mut self, label: &'static str) -> Result<Vec<u8>, SerializationError> {
        let cursor = io::Cursor::new(self.remaining_bytes());
        let mut decoder = zstd::stream::read::Decoder::with_buffer(cursor)
            .map_err(|e| self.error(label, format!("zstd: {e}")))?
            .single_frame();

        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| self.error(label, format!("zstd: {e}")))?;

        let consumed = decoder.finish().position() as usize;
        self.offset += consumed;
        Ok(out)
    }
}
