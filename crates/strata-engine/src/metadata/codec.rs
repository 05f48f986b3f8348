//! Metadata encoding and decoding primitives

use strata_sdk::LoadError;
use thiserror::Error;

/// Errors that can occur while decoding metadata
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Unexpected end of input
    #[error("Unexpected end of metadata at offset {0}")]
    UnexpectedEnd(usize),

    /// Invalid UTF-8 string
    #[error("Invalid UTF-8 string at offset {0}")]
    InvalidUtf8(usize),

    /// Unknown discriminant byte
    #[error("Invalid tag {tag} at offset {offset}")]
    InvalidTag {
        /// The byte that was read
        tag: u8,
        /// Where it was read
        offset: usize,
    },

    /// Bytes left over after a complete blob
    #[error("Trailing bytes at offset {0}")]
    TrailingBytes(usize),

    /// Annotation values nested deeper than allowed
    #[error("Annotation value nesting too deep at offset {0}")]
    NestingTooDeep(usize),

    /// Invalid magic number
    #[error("Invalid magic number: expected STRT, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported version
    #[error("Unsupported image version: {0}")]
    UnsupportedVersion(u32),

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Checksum stored in the image
        expected: u32,
        /// Checksum of the payload
        actual: u32,
    },
}

impl DecodeError {
    /// Attach the name of what was being parsed
    pub fn in_context(self, context: &str) -> LoadError {
        LoadError::format(context, self.to_string())
    }
}

/// Errors that can occur while encoding metadata
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// A length or count does not fit its prefix
    #[error("{what} too long: {len} exceeds the limit of {max}")]
    TooLong {
        /// What was being written
        what: &'static str,
        /// Actual length or count
        len: usize,
        /// Largest value the prefix can hold
        max: usize,
    },
}

impl EncodeError {
    /// Attach the name of what was being encoded
    pub fn in_context(self, context: &str) -> LoadError {
        LoadError::format(context, self.to_string())
    }
}

/// Metadata writer
pub struct MetadataWriter {
    buffer: Vec<u8>,
}

impl MetadataWriter {
    /// Create a new writer
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Create a new writer with capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Current length of the output
    pub fn offset(&self) -> usize {
        self.buffer.len()
    }

    /// Consume the writer and return the bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Emit a raw byte
    pub fn emit_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Emit a 16-bit unsigned integer
    pub fn emit_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit unsigned integer
    pub fn emit_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit signed integer
    pub fn emit_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit `len` as a `u8` count prefix
    pub fn emit_len_u8(&mut self, len: usize, what: &'static str) -> Result<(), EncodeError> {
        let len = u8::try_from(len).map_err(|_| EncodeError::TooLong {
            what,
            len,
            max: u8::MAX as usize,
        })?;
        self.emit_u8(len);
        Ok(())
    }

    /// Emit `len` as a `u16` count prefix
    pub fn emit_len_u16(&mut self, len: usize, what: &'static str) -> Result<(), EncodeError> {
        let len = u16::try_from(len).map_err(|_| EncodeError::TooLong {
            what,
            len,
            max: u16::MAX as usize,
        })?;
        self.emit_u16(len);
        Ok(())
    }

    /// Emit a `u16` length-prefixed string
    pub fn emit_str(&mut self, value: &str) -> Result<(), EncodeError> {
        self.emit_len_u16(value.len(), "string")?;
        self.buffer.extend_from_slice(value.as_bytes());
        Ok(())
    }

    /// Emit an optional string as a presence byte followed by the string
    pub fn emit_opt_str(&mut self, value: Option<&str>) -> Result<(), EncodeError> {
        match value {
            Some(value) => {
                self.emit_u8(1);
                self.emit_str(value)
            }
            None => {
                self.emit_u8(0);
                Ok(())
            }
        }
    }

    /// Emit a `u32` length-prefixed byte blob
    pub fn emit_blob(&mut self, bytes: &[u8]) -> Result<(), EncodeError> {
        let len = u32::try_from(bytes.len()).map_err(|_| EncodeError::TooLong {
            what: "blob",
            len: bytes.len(),
            max: u32::MAX as usize,
        })?;
        self.emit_u32(len);
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Emit raw bytes without a prefix
    pub fn emit_raw(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }
}

impl Default for MetadataWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Metadata reader
pub struct MetadataReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> MetadataReader<'a> {
    /// Create a new reader
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Current position in the buffer
    pub fn position(&self) -> usize {
        self.position
    }

    /// Remaining bytes
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Take `len` raw bytes
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::UnexpectedEnd(self.position));
        }
        let bytes = &self.buffer[self.position..self.position + len];
        self.position += len;
        Ok(bytes)
    }

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Read a 16-bit unsigned integer
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Read a 32-bit unsigned integer
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a 64-bit signed integer
    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        let bytes = self.read_bytes(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(i64::from_le_bytes(raw))
    }

    /// Read a length-prefixed string
    pub fn read_str(&mut self) -> Result<String, DecodeError> {
        let start = self.position;
        let len = self.read_u16()? as usize;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8(start))
    }

    /// Read an optional string written by [`MetadataWriter::emit_opt_str`]
    pub fn read_opt_str(&mut self) -> Result<Option<String>, DecodeError> {
        let offset = self.position;
        match self.read_u8()? {
            0 => Ok(None),
            1 => Ok(Some(self.read_str()?)),
            tag => Err(DecodeError::InvalidTag { tag, offset }),
        }
    }

    /// Read a `u32` length-prefixed blob
    pub fn read_blob(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.read_u32()? as usize;
        Ok(self.read_bytes(len)?.to_vec())
    }

    /// Fail unless the whole buffer was consumed
    pub fn expect_end(&self) -> Result<(), DecodeError> {
        if self.remaining() == 0 {
            Ok(())
        } else {
            Err(DecodeError::TrailingBytes(self.position))
        }
    }
}
