//! Production `ColumnStore` backed by the `rocksdb` crate — the same LSM
//! family the original system persists to. Gated behind the
//! `rocksdb-backend` feature so the default build never needs a C++
//! toolchain.

use crate::error::StoreError;
use crate::store::{ColumnFamily, ColumnStore};
use rocksdb::{ColumnFamilyDescriptor, Options, DB};
use std::path::Path;

/// A real on-disk store with the DATA/META/SCORE column families.
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Opens (creating if absent) a RocksDB instance at `path` with the
    /// three column families the persistence model requires.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        let cfs = ColumnFamily::ALL
            .iter()
            .map(|cf| ColumnFamilyDescriptor::new(cf.name(), Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, cfs)
            .map_err(|e| StoreError::Engine(e.to_string()))?;
        Ok(RocksStore { db })
    }

    fn handle(&self, cf: ColumnFamily) -> &rocksdb::ColumnFamily {
        self.db
            .cf_handle(cf.name())
            .expect("column family created at open time")
    }
}

impl ColumnStore for RocksStore {
    fn get(&self, cf: ColumnFamily, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.db
            .get_cf(self.handle(cf), key)
            .map_err(|e| StoreError::Engine(e.to_string()))
    }

    fn put(&self, cf: ColumnFamily, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.db
            .put_cf(self.handle(cf), key, value)
            .map_err(|e| StoreError::Engine(e.to_string()))
    }

    fn delete(&self, cf: ColumnFamily, key: &[u8]) -> Result<(), StoreError> {
        self.db
            .delete_cf(self.handle(cf), key)
            .map_err(|e| StoreError::Engine(e.to_string()))
    }

    fn delete_range(&self, cf: ColumnFamily, start: &[u8], end: &[u8]) -> Result<(), StoreError> {
        if start >= end {
            return Err(StoreError::InvalidRange);
        }
        self.db
            .delete_range_cf(self.handle(cf), start, end)
            .map_err(|e| StoreError::Engine(e.to_string()))
    }

    fn iterate(
        &self,
        cf: ColumnFamily,
        start: &[u8],
        end: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        if start >= end {
            return Err(StoreError::InvalidRange);
        }
        let mode = rocksdb::IteratorMode::From(start, rocksdb::Direction::Forward);
        let mut out = Vec::new();
        for item in self.db.iterator_cf(self.handle(cf), mode) {
            let (k, v) = item.map_err(|e| StoreError::Engine(e.to_string()))?;
            if &*k >= end {
                break;
            }
            out.push((k.to_vec(), v.to_vec()));
        }
        Ok(out)
    }

    fn scan_all(&self, cf: ColumnFamily) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mut out = Vec::new();
        for item in self.db.iterator_cf(self.handle(cf), rocksdb::IteratorMode::Start) {
            let (k, v) = item.map_err(|e| StoreError::Engine(e.to_string()))?;
            out.push((k.to_vec(), v.to_vec()));
        }
        Ok(out)
    }
}
