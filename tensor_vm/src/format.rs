// Copyright 2026 the Tensor VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Encoding/decoding primitives for the tensor VM executable format.
//!
//! The wire format is deliberately plain: all integers are fixed-width
//! little-endian `u64`/`i64`, strings are `u64`-length-prefixed raw bytes,
//! and vectors are a `u64` count followed by that many elements. There is no
//! alignment padding between items or sections.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// A decode error for tensor VM binary artifacts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// Input ended before a read could complete.
    TruncatedStream,
    /// A string was not valid UTF-8.
    InvalidUtf8,
    /// The header magic did not match [`crate::executable::BYTECODE_MAGIC`].
    BadMagic,
    /// The header version string did not byte-equal the runtime version.
    VersionMismatch {
        /// The version this decoder requires.
        expected: String,
        /// The version found in the stream.
        found: String,
    },
    /// A structural check failed inside a named section.
    MalformedSection {
        /// Section name (`"global"`, `"constant"`, `"primitive"`, `"code"`).
        section: &'static str,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TruncatedStream => write!(f, "unexpected end of input"),
            Self::InvalidUtf8 => write!(f, "invalid UTF-8"),
            Self::BadMagic => write!(f, "bad magic header"),
            Self::VersionMismatch { expected, found } => {
                write!(f, "version mismatch: expected {expected}, found {found}")
            }
            Self::MalformedSection { section } => {
                write!(f, "malformed {section} section")
            }
        }
    }
}

impl core::error::Error for DecodeError {}

/// A bounds-checked byte reader.
#[derive(Clone, Debug)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    /// Creates a reader over `bytes`.
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    /// Returns the current cursor offset.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns the number of bytes left in the stream.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .offset
            .checked_add(len)
            .ok_or(DecodeError::TruncatedStream)?;
        let slice = self
            .bytes
            .get(self.offset..end)
            .ok_or(DecodeError::TruncatedStream)?;
        self.offset = end;
        Ok(slice)
    }

    /// Reads a little-endian `u64`.
    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Reads a little-endian `i64`.
    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        Ok(self.read_u64()? as i64)
    }

    /// Reads a `u64` length prefix, rejecting prefixes larger than the
    /// remaining stream so a hostile length cannot trigger an eager
    /// allocation.
    pub fn read_len(&mut self) -> Result<usize, DecodeError> {
        let raw = self.read_u64()?;
        let len = usize::try_from(raw).map_err(|_| DecodeError::TruncatedStream)?;
        if len > self.remaining() {
            return Err(DecodeError::TruncatedStream);
        }
        Ok(len)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_len()?;
        let b = self.take(len)?;
        let s = core::str::from_utf8(b).map_err(|_| DecodeError::InvalidUtf8)?;
        Ok(String::from(s))
    }

    /// Reads a length-prefixed vector of strings.
    pub fn read_string_vec(&mut self) -> Result<Vec<String>, DecodeError> {
        // Each element is at least its own 8-byte length prefix, so the
        // count prefix alone bounds the allocation.
        let raw = self.read_u64()?;
        let count = usize::try_from(raw).map_err(|_| DecodeError::TruncatedStream)?;
        if count > self.remaining() / 8 {
            return Err(DecodeError::TruncatedStream);
        }
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.read_string()?);
        }
        Ok(out)
    }

    /// Reads `count` little-endian `i64` values.
    pub fn read_i64_vec(&mut self, count: usize) -> Result<Vec<i64>, DecodeError> {
        if count > self.remaining() / 8 {
            return Err(DecodeError::TruncatedStream);
        }
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.read_i64()?);
        }
        Ok(out)
    }
}

/// A byte writer over an owned buffer.
#[derive(Clone, Debug, Default)]
pub struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Returns a reference to the written bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the writer and returns the underlying byte buffer.
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }

    /// Appends raw bytes.
    pub fn write_bytes(&mut self, b: &[u8]) {
        self.bytes.extend_from_slice(b);
    }

    /// Appends a little-endian `u64`.
    pub fn write_u64(&mut self, v: u64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Appends a little-endian `i64`.
    pub fn write_i64(&mut self, v: i64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Appends a length-prefixed string.
    pub fn write_string(&mut self, s: &str) {
        self.write_u64(s.len() as u64);
        self.bytes.extend_from_slice(s.as_bytes());
    }

    /// Appends a length-prefixed vector of strings.
    pub fn write_string_vec(&mut self, v: &[String]) {
        self.write_u64(v.len() as u64);
        for s in v {
            self.write_string(s);
        }
    }
}
