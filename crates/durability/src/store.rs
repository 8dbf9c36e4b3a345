//! The `ColumnStore` trait: the disk engine's interface boundary.

use crate::error::StoreError;

/// A batch of rows returned by a range or full-column scan.
pub type Rows = Vec<(Vec<u8>, Vec<u8>)>;

/// The three column families the persistence model is built on (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnFamily {
    /// Object bodies: data rows keyed by `dbid || key_len || key || version || subkey`.
    Data,
    /// Per-key descriptors: type, expire, version, type-specific extend bytes.
    Meta,
    /// Secondary ordering for sorted-set members.
    Score,
}

impl ColumnFamily {
    /// The on-disk column-family name. DATA keeps the underlying engine's
    /// default column family name for compatibility with tooling that
    /// assumes one exists.
    pub fn name(self) -> &'static str {
        match self {
            ColumnFamily::Data => "default",
            ColumnFamily::Meta => "meta",
            ColumnFamily::Score => "score",
        }
    }

    /// All column families, in a fixed order used by recovery to iterate
    /// deterministically.
    pub const ALL: [ColumnFamily; 3] = [ColumnFamily::Data, ColumnFamily::Meta, ColumnFamily::Score];
}

/// The disk engine's interface. Workers only ever touch the store through
/// this trait; nothing in the swap pipeline depends on a concrete engine.
pub trait ColumnStore: Send + Sync {
    /// Point read. `Ok(None)` means not-found, not an error.
    fn get(&self, cf: ColumnFamily, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Batched point read, preserving input order.
    fn multi_get(
        &self,
        cf: ColumnFamily,
        keys: &[Vec<u8>],
    ) -> Result<Vec<Option<Vec<u8>>>, StoreError> {
        keys.iter().map(|k| self.get(cf, k)).collect()
    }

    /// Upsert.
    fn put(&self, cf: ColumnFamily, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Point delete. A no-op if the key is absent.
    fn delete(&self, cf: ColumnFamily, key: &[u8]) -> Result<(), StoreError>;

    /// Deletes every key in `[start, end)`.
    fn delete_range(&self, cf: ColumnFamily, start: &[u8], end: &[u8]) -> Result<(), StoreError>;

    /// Returns every `(key, value)` pair in `[start, end)`, in key order.
    fn iterate(&self, cf: ColumnFamily, start: &[u8], end: &[u8]) -> Result<Rows, StoreError>;

    /// Returns every row in `cf`, in key order. Used by meta-scan recovery.
    fn scan_all(&self, cf: ColumnFamily) -> Result<Rows, StoreError>;
}
