//! Base error type shared across the workspace.
//!
//! Each crate layers its own `thiserror` enum on top of this one via
//! `#[from] CoreError`, following the same pattern used for the
//! subsystem-specific taxonomy in `coldtier-engine::error::SwapError`.

use std::io;
use thiserror::Error;

/// Result alias for the base error type.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Foundational errors any layer can hit.
#[derive(Debug, Error)]
pub enum CoreError {
    /// I/O error (file operations, disk engine handles, ...).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Data read back from disk didn't match the expected shape.
    #[error("data corruption: {0}")]
    Corruption(String),

    /// The caller asked for something the current state doesn't support.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts_via_from() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err: CoreError = io_err.into();
        assert!(matches!(err, CoreError::Io(_)));
    }
}
