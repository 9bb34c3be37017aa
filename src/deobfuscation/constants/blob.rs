//! The embedded constant data and decoded-string interning.
//!
//! ConfuserEx stores every hidden constant in one flat buffer that the getter decompresses at
//! module initialization. The host hands that buffer over already decompressed; this module only
//! reads typed values out of it.
//!
//! Layout of the entries this crate understands:
//!
//! | Kind | Bytes at `offset` |
//! |------|-------------------|
//! | String | `u32` LE length, then that many UTF-8 bytes |
//! | Number | raw LE bytes of the requested width |
//!
//! A string length that does not fit the buffer was stored rotated by four bits and is
//! rotated back before use.

use std::sync::Arc;

use dashmap::DashMap;

use crate::Result;

/// Decompressed constant data of one protected assembly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstantBlob {
    data: Vec<u8>,
}

impl ConstantBlob {
    /// Wraps the decompressed buffer
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        ConstantBlob { data }
    }

    /// Size of the buffer in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the buffer holds no data
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The raw buffer
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range does not fit the buffer.
    pub fn read_bytes(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let end = offset.checked_add(len).ok_or(out_of_bounds_error!())?;
        self.data.get(offset..end).ok_or(out_of_bounds_error!())
    }

    fn read_array<const N: usize>(&self, offset: usize) -> Result<[u8; N]> {
        let mut buffer = [0u8; N];
        buffer.copy_from_slice(self.read_bytes(offset, N)?);
        Ok(buffer)
    }

    /// Reads a little-endian `u32`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than 4 bytes remain at `offset`.
    pub fn read_u32_le(&self, offset: usize) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array(offset)?))
    }

    /// Reads a little-endian `int32`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than 4 bytes remain at `offset`.
    pub fn read_i32(&self, offset: usize) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array(offset)?))
    }

    /// Reads a little-endian `float32`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than 4 bytes remain at `offset`.
    pub fn read_f32(&self, offset: usize) -> Result<f32> {
        Ok(f32::from_le_bytes(self.read_array(offset)?))
    }

    /// Reads a little-endian `float64`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than 8 bytes remain at `offset`.
    pub fn read_f64(&self, offset: usize) -> Result<f64> {
        Ok(f64::from_le_bytes(self.read_array(offset)?))
    }

    /// Length prefix of the string entry at `offset`, with the rotation undone.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the prefix itself does not fit.
    pub fn string_length(&self, offset: usize) -> Result<usize> {
        let mut length = self.read_u32_le(offset)?;
        if length as usize > self.data.len() {
            length = length.rotate_left(4);
        }
        Ok(length as usize)
    }

    /// Reads the length-prefixed UTF-8 string entry at `offset`.
    ///
    /// Invalid UTF-8 sequences are replaced with `U+FFFD`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the prefix or the text runs past the buffer.
    pub fn read_string(&self, offset: usize) -> Result<String> {
        let length = self.string_length(offset)?;
        let start = offset.checked_add(4).ok_or(out_of_bounds_error!())?;
        let bytes = self.read_bytes(start, length)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

impl From<Vec<u8>> for ConstantBlob {
    fn from(data: Vec<u8>) -> Self {
        ConstantBlob::new(data)
    }
}

/// Deduplicates decoded strings.
///
/// The same literal is usually referenced from many call sites. Interning hands out one shared
/// allocation per distinct text; the map is concurrent, so rewrite workers can share one
/// interner.
#[derive(Debug, Default)]
pub struct StringInterner {
    strings: DashMap<Arc<str>, ()>,
}

impl StringInterner {
    /// Creates an empty interner
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shared copy of `text`, inserting it on first sight
    pub fn intern(&self, text: &str) -> Arc<str> {
        if let Some(existing) = self.strings.get(text) {
            return Arc::clone(existing.key());
        }

        // The entry lock decides between racing inserts; the loser gets the stored key
        let stored = self.strings.entry(Arc::from(text)).or_insert(());
        Arc::clone(stored.key())
    }

    /// Number of distinct strings
    #[must_use]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Returns true if nothing has been interned
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}
