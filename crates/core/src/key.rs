//! The `Key` type: an ordered sequence of bytes, unique within a database.
//!
//! Unlike a string-keyed store, keys here are opaque byte strings (the
//! embedded data model this subsystem swaps for is itself byte-oriented),
//! so the only contract enforced at this layer is a maximum length.

use thiserror::Error;

/// Default maximum key length in bytes.
pub const DEFAULT_MAX_KEY_BYTES: usize = 64 * 1024;

/// An ordered sequence of bytes, unique within a database (§3).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(Vec<u8>);

impl Key {
    /// Wraps `bytes` as a key, validating against the default length limit.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, KeyError> {
        Self::with_max_len(bytes, DEFAULT_MAX_KEY_BYTES)
    }

    /// Wraps `bytes` as a key, validating against an explicit length limit.
    pub fn with_max_len(bytes: impl Into<Vec<u8>>, max_len: usize) -> Result<Self, KeyError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(KeyError::Empty);
        }
        if bytes.len() > max_len {
            return Err(KeyError::TooLong { actual: bytes.len(), max: max_len });
        }
        Ok(Key(bytes))
    }

    /// Borrows the key's bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the key, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Key validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// Key is empty (length 0).
    #[error("key cannot be empty")]
    Empty,

    /// Key exceeds the configured maximum length.
    #[error("key too long: {actual} bytes exceeds maximum {max}")]
    TooLong {
        /// Actual key length in bytes.
        actual: usize,
        /// Maximum allowed length.
        max: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty() {
        assert_eq!(Key::new(Vec::<u8>::new()), Err(KeyError::Empty));
    }

    #[test]
    fn rejects_too_long() {
        let bytes = vec![0u8; DEFAULT_MAX_KEY_BYTES + 1];
        assert!(matches!(Key::new(bytes), Err(KeyError::TooLong { .. })));
    }

    #[test]
    fn accepts_arbitrary_bytes() {
        let k = Key::new(vec![0u8, 255, 1, 2]).unwrap();
        assert_eq!(k.as_bytes(), &[0u8, 255, 1, 2]);
    }
}
