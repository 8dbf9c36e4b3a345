//! In-memory reference [`ColumnStore`] used by the whole test suite and by
//! any deployment that doesn't need real persistence (e.g. a warm cache
//! tier in front of a real engine).

use crate::error::StoreError;
use crate::store::{ColumnFamily, ColumnStore};
use parking_lot::Mutex;
use std::collections::BTreeMap;

#[derive(Default)]
struct Cf {
    rows: BTreeMap<Vec<u8>, Vec<u8>>,
}

/// A `BTreeMap`-backed store. Cheap to construct, deterministic ordering,
/// no background compaction — exactly what property tests and seed
/// scenarios want.
pub struct MemStore {
    data: Mutex<Cf>,
    meta: Mutex<Cf>,
    score: Mutex<Cf>,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        MemStore {
            data: Mutex::new(Cf::default()),
            meta: Mutex::new(Cf::default()),
            score: Mutex::new(Cf::default()),
        }
    }

    fn cf(&self, cf: ColumnFamily) -> &Mutex<Cf> {
        match cf {
            ColumnFamily::Data => &self.data,
            ColumnFamily::Meta => &self.meta,
            ColumnFamily::Score => &self.score,
        }
    }
}

impl ColumnStore for MemStore {
    fn get(&self, cf: ColumnFamily, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.cf(cf).lock().rows.get(key).cloned())
    }

    fn put(&self, cf: ColumnFamily, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.cf(cf).lock().rows.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, cf: ColumnFamily, key: &[u8]) -> Result<(), StoreError> {
        self.cf(cf).lock().rows.remove(key);
        Ok(())
    }

    fn delete_range(&self, cf: ColumnFamily, start: &[u8], end: &[u8]) -> Result<(), StoreError> {
        if start >= end {
            return Err(StoreError::InvalidRange);
        }
        let mut guard = self.cf(cf).lock();
        let keys: Vec<Vec<u8>> = guard
            .rows
            .range(start.to_vec()..end.to_vec())
            .map(|(k, _)| k.clone())
            .collect();
        for k in keys {
            guard.rows.remove(&k);
        }
        Ok(())
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
        let guard = self.cf(cf).lock();
        Ok(guard
            .rows
            .range(start.to_vec()..end.to_vec())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn scan_all(&self, cf: ColumnFamily) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let guard = self.cf(cf).lock();
        Ok(guard.rows.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete_round_trip() {
        let s = MemStore::new();
        s.put(ColumnFamily::Meta, b"k1", b"v1").unwrap();
        assert_eq!(s.get(ColumnFamily::Meta, b"k1").unwrap(), Some(b"v1".to_vec()));
        s.delete(ColumnFamily::Meta, b"k1").unwrap();
        assert_eq!(s.get(ColumnFamily::Meta, b"k1").unwrap(), None);
    }

    #[test]
    fn range_delete_and_iterate() {
        let s = MemStore::new();
        for k in ["a", "b", "c", "d"] {
            s.put(ColumnFamily::Data, k.as_bytes(), b"x").unwrap();
        }
        let rows = s.iterate(ColumnFamily::Data, b"b", b"d").unwrap();
        assert_eq!(rows.len(), 2);
        s.delete_range(ColumnFamily::Data, b"b", b"d").unwrap();
        let remaining: Vec<_> = s.scan_all(ColumnFamily::Data).unwrap();
        assert_eq!(remaining.len(), 2);
    }
}
