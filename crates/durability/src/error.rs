//! Error type for the column-family store.

use thiserror::Error;

/// Errors the disk engine can report back through a [`crate::Rio`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying engine rejected the operation (I/O failure,
    /// corruption, closed handle, ...).
    #[error("disk engine error: {0}")]
    Engine(String),

    /// The operation would have required more memory than is available
    /// (surfaced so the swap pipeline can fold it into `SWAP_OOM_CHECK`).
    #[error("out of memory performing disk operation")]
    OutOfMemory,

    /// A range operation was given an empty or inverted [start, end) span.
    #[error("invalid range: start must be < end")]
    InvalidRange,
}
