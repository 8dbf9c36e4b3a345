//! `RIO` — a single disk operation descriptor, tagged GET/PUT/DEL/ITERATE.

use crate::error::StoreError;
use crate::store::{ColumnFamily, ColumnStore};

/// The operation a [`Rio`] performs.
#[derive(Debug, Clone)]
pub enum RioOp {
    /// Point read of one key.
    Get {
        /// The key to read.
        key: Vec<u8>,
    },
    /// Batched point read.
    MultiGet {
        /// The keys to read, in order.
        keys: Vec<Vec<u8>>,
    },
    /// Upsert.
    Put {
        /// The key to write.
        key: Vec<u8>,
        /// The value to write.
        value: Vec<u8>,
    },
    /// Point delete.
    Delete {
        /// The key to delete.
        key: Vec<u8>,
    },
    /// `[start, end)` delete.
    DeleteRange {
        /// Inclusive range start.
        start: Vec<u8>,
        /// Exclusive range end.
        end: Vec<u8>,
    },
    /// `[start, end)` read, in key order.
    Iterate {
        /// Inclusive range start.
        start: Vec<u8>,
        /// Exclusive range end.
        end: Vec<u8>,
    },
}

/// A single disk operation descriptor: column-family, op, and (after
/// `execute`) its result or error/not-found slot.
#[derive(Debug, Clone)]
pub struct Rio {
    /// Which column family this operation targets.
    pub cf: ColumnFamily,
    /// The operation to perform.
    pub op: RioOp,
}

impl Rio {
    /// Builds a GET request.
    pub fn get(cf: ColumnFamily, key: impl Into<Vec<u8>>) -> Self {
        Rio { cf, op: RioOp::Get { key: key.into() } }
    }

    /// Builds a MULTIGET request.
    pub fn multi_get(cf: ColumnFamily, keys: Vec<Vec<u8>>) -> Self {
        Rio { cf, op: RioOp::MultiGet { keys } }
    }

    /// Builds a PUT request.
    pub fn put(cf: ColumnFamily, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Rio { cf, op: RioOp::Put { key: key.into(), value: value.into() } }
    }

    /// Builds a DEL request.
    pub fn delete(cf: ColumnFamily, key: impl Into<Vec<u8>>) -> Self {
        Rio { cf, op: RioOp::Delete { key: key.into() } }
    }

    /// Builds a DELETE_RANGE request.
    pub fn delete_range(cf: ColumnFamily, start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        Rio { cf, op: RioOp::DeleteRange { start: start.into(), end: end.into() } }
    }

    /// Builds an ITERATE request.
    pub fn iterate(cf: ColumnFamily, start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        Rio { cf, op: RioOp::Iterate { start: start.into(), end: end.into() } }
    }

    /// Runs this descriptor against a concrete engine. Called from a
    /// worker thread; never from the main thread.
    pub fn execute(&self, store: &dyn ColumnStore) -> Result<RioResult, StoreError> {
        match &self.op {
            RioOp::Get { key } => store.get(self.cf, key).map(RioResult::Value),
            RioOp::MultiGet { keys } => store.multi_get(self.cf, keys).map(RioResult::Values),
            RioOp::Put { key, value } => store.put(self.cf, key, value).map(|_| RioResult::Ack),
            RioOp::Delete { key } => store.delete(self.cf, key).map(|_| RioResult::Ack),
            RioOp::DeleteRange { start, end } => {
                store.delete_range(self.cf, start, end).map(|_| RioResult::Ack)
            }
            RioOp::Iterate { start, end } => store.iterate(self.cf, start, end).map(RioResult::Rows),
        }
    }
}

/// The outcome of executing a [`Rio`].
#[derive(Debug, Clone)]
pub enum RioResult {
    /// Result of a GET: `None` means not-found.
    Value(Option<Vec<u8>>),
    /// Result of a MULTIGET, in request order.
    Values(Vec<Option<Vec<u8>>>),
    /// Result of an ITERATE, in key order.
    Rows(Vec<(Vec<u8>, Vec<u8>)>),
    /// Result of a PUT/DELETE/DELETE_RANGE.
    Ack,
}
