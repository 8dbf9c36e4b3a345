//! On-disk column-family store interface for the swap subsystem.
//!
//! The actual storage engine (an LSM with three column families) is an
//! external collaborator referenced only at its interface — building a new
//! storage engine is explicitly out of scope. This crate defines that
//! interface (`ColumnStore`, the `Rio` disk-operation descriptor) plus two
//! implementations: an in-memory reference store used by the whole test
//! suite, and an optional `rocksdb`-backed store (feature `rocksdb-backend`)
//! for production use, matching the original system's actual engine.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod mem_store;
pub mod rio;
pub mod store;

#[cfg(feature = "rocksdb-backend")]
pub mod rocksdb_store;

pub use error::StoreError;
pub use mem_store::MemStore;
pub use rio::{Rio, RioOp, RioResult};
pub use store::{ColumnFamily, ColumnStore};

#[cfg(feature = "rocksdb-backend")]
pub use rocksdb_store::RocksStore;
