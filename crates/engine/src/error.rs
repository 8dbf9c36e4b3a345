//! The swap subsystem's error taxonomy (§7, §10.1): one `thiserror`-derived
//! enum with a variant per kind, carrying the offending key/db where
//! relevant, with `#[from]` conversions from the storage/durability layers.

use coldtier_durability::StoreError;
use thiserror::Error;

/// Errors raised anywhere in the swap request pipeline.
#[derive(Debug, Error)]
pub enum SwapError {
    /// The object type isn't supported for swap, or per-type setup failed.
    #[error("swap setup failed for db {db} key {key:?}: {reason}")]
    Setup {
        /// The database the key belongs to.
        db: u32,
        /// The offending key.
        key: Vec<u8>,
        /// Human-readable cause.
        reason: String,
    },

    /// Decode failed, analyze failed, or the in-memory/on-disk types
    /// disagree.
    #[error("data error for db {db} key {key:?}: {reason}")]
    Data {
        /// The database the key belongs to.
        db: u32,
        /// The offending key.
        key: Vec<u8>,
        /// Human-readable cause.
        reason: String,
    },

    /// The disk engine returned an error, or an unexpected action/intent
    /// was requested.
    #[error("exec error for db {db} key {key:?}: {reason}")]
    Exec {
        /// The database the key belongs to.
        db: u32,
        /// The offending key.
        key: Vec<u8>,
        /// Human-readable cause.
        reason: String,
    },

    /// A meta-scan session error: unsupported inside a transaction, no
    /// such session, a session already in progress, or a cursor sequence
    /// mismatch.
    #[error("metascan error: {0}")]
    Metascan(String),

    /// A GET/PUT/DEL/ITERATE RIO failed, including out-of-memory during a
    /// RIO.
    #[error("rio error: {0}")]
    Rio(#[from] StoreError),
}

impl SwapError {
    /// The generic wire-facing message for a failed command continuation
    /// ("Swap failed (code=N)" in the original; here the variant's own
    /// `Display` already carries the detail, so this is a stable numeric
    /// code for clients that key off it).
    pub fn code(&self) -> u32 {
        match self {
            SwapError::Setup { .. } => 1,
            SwapError::Data { .. } => 2,
            SwapError::Exec { .. } => 3,
            SwapError::Metascan(_) => 4,
            SwapError::Rio(_) => 5,
        }
    }
}

/// Convenience alias used throughout the engine crate.
pub type Result<T> = std::result::Result<T, SwapError>;
