//! Per-database in-memory keyspace state (§3): the hot value map, the
//! object-meta map, the dirty-subkeys tracker, the evict-asap candidate
//! list, and the db's [`ColdFilter`].

use std::collections::HashMap;

use coldtier_core::Key;

use crate::coldfilter::ColdFilter;
use crate::cuckoo::BitsPerTag;

/// Cap on the evict-asap candidate list per db (`EVICT_ASAP_KEYS_LIMIT`,
/// §4.6).
pub const EVICT_ASAP_KEYS_LIMIT: usize = 256;

/// Object type tag carried by [`ObjectMeta`] (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    /// Opaque byte string.
    String,
    /// Ordered sequence of elements, stored as disk segments.
    List,
    /// Field/value map.
    Hash,
    /// Unordered unique-member collection.
    Set,
    /// Member/score sorted collection.
    ZSet,
    /// Append-only log of entries.
    Stream,
}

/// Type-specific payload carried alongside an [`ObjectMeta`] (§3:
/// "type-specific payload (length for hash/set/zset; segment list for
/// list)").
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ObjectPayload {
    /// No extra payload (string, stream).
    #[default]
    None,
    /// Element count, for hash/set/zset.
    Len(u64),
    /// Disk segment identifiers, for list.
    Segments(Vec<u64>),
}

/// Descriptor attached to a key that has any portion on disk (§3, §4.3).
///
/// Invariant: the version of a stored subkey must match the current
/// `version` of its key's meta; subkey records whose version differs are
/// obsolete (ignored on read, collected on compaction).
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectMeta {
    /// The object's value type.
    pub object_type: ObjectType,
    /// Monotonically increasing version (§4.3).
    pub version: u64,
    /// Type-specific payload.
    pub payload: ObjectPayload,
}

/// Tracks which subkeys of a key are dirty (modified in memory but not
/// yet reflected on disk), while preserving the total dirty-subkey count
/// (`sublen`) even after individual subkeys are marked clean — the
/// sublen-tracking variant chosen in SPEC_FULL.md §9.
#[derive(Debug, Clone, Default)]
pub struct DirtySubkeys {
    dirty: std::collections::HashSet<Vec<u8>>,
    /// Total dirty-subkey count, preserved independently of `dirty`'s
    /// current membership so callers can observe "last dirty subkey was
    /// just cleaned" (sublen transitions to 0) distinctly from "this key
    /// never had dirty subkeys".
    sublen: u64,
}

impl DirtySubkeys {
    /// Marks `subkey` dirty, returning the new sublen.
    pub fn add(&mut self, subkey: &[u8]) -> u64 {
        if self.dirty.insert(subkey.to_vec()) {
            self.sublen += 1;
        }
        self.sublen
    }

    /// Marks `subkey` clean, returning the new sublen.
    pub fn remove(&mut self, subkey: &[u8]) -> u64 {
        if self.dirty.remove(subkey) {
            self.sublen = self.sublen.saturating_sub(1);
        }
        self.sublen
    }

    /// Whether `subkey` is currently dirty.
    pub fn contains(&self, subkey: &[u8]) -> bool {
        self.dirty.contains(subkey)
    }

    /// Current dirty-subkey count.
    pub fn sublen(&self) -> u64 {
        self.sublen
    }

    /// Whether there are no dirty subkeys left.
    pub fn is_empty(&self) -> bool {
        self.dirty.is_empty()
    }
}

/// A single database's in-memory swap state (§3).
pub struct Database {
    id: u32,
    hot: HashMap<Vec<u8>, Vec<u8>>,
    meta: HashMap<Vec<u8>, ObjectMeta>,
    dirty_subkeys: HashMap<Vec<u8>, DirtySubkeys>,
    evict_asap: Vec<Vec<u8>>,
    cold_filter: ColdFilter,
}

impl Database {
    /// Creates an empty database with the given id and cold-filter sizing.
    pub fn new(id: u32, bits_per_tag: BitsPerTag, estimated_cold_keys: usize, absent_capacity: usize) -> Self {
        Database {
            id,
            hot: HashMap::new(),
            meta: HashMap::new(),
            dirty_subkeys: HashMap::new(),
            evict_asap: Vec::new(),
            cold_filter: ColdFilter::new(bits_per_tag, estimated_cold_keys, absent_capacity),
        }
    }

    /// This database's numeric id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Whether `key` currently has a hot (in-memory) value.
    pub fn is_hot(&self, key: &Key) -> bool {
        self.hot.contains_key(key.as_bytes())
    }

    /// Reads the hot value for `key`, if present.
    pub fn get_hot(&self, key: &Key) -> Option<&[u8]> {
        self.hot.get(key.as_bytes()).map(Vec::as_slice)
    }

    /// Installs or overwrites the hot value for `key`.
    pub fn set_hot(&mut self, key: &Key, value: Vec<u8>) {
        self.hot.insert(key.as_bytes().to_vec(), value);
    }

    /// Removes the hot value for `key` (used when a key goes WARM/COLD).
    /// Returns the removed value, if any.
    pub fn clear_hot(&mut self, key: &Key) -> Option<Vec<u8>> {
        self.hot.remove(key.as_bytes())
    }

    /// Reads the object meta for `key`, if it has any on-disk portion.
    pub fn get_meta(&self, key: &Key) -> Option<&ObjectMeta> {
        self.meta.get(key.as_bytes())
    }

    /// Installs object meta for `key` (first swap-out, or meta-load from
    /// disk at recovery).
    pub fn set_meta(&mut self, key: &Key, meta: ObjectMeta) {
        self.meta.insert(key.as_bytes().to_vec(), meta);
    }

    /// Removes object meta for `key` (on full DEL).
    pub fn clear_meta(&mut self, key: &Key) -> Option<ObjectMeta> {
        self.meta.remove(key.as_bytes())
    }

    /// Returns a mutable handle to `key`'s dirty-subkey tracker, creating
    /// an empty one if this is the first dirty subkey recorded for it.
    pub fn dirty_subkeys_mut(&mut self, key: &Key) -> &mut DirtySubkeys {
        self.dirty_subkeys.entry(key.as_bytes().to_vec()).or_default()
    }

    /// Drops `key`'s dirty-subkey tracker entirely (all subkeys clean, or
    /// key fully deleted).
    pub fn clear_dirty_subkeys(&mut self, key: &Key) {
        self.dirty_subkeys.remove(key.as_bytes());
    }

    /// Appends `key` to the evict-asap candidate list, dropping the
    /// oldest candidate if the list is already at
    /// [`EVICT_ASAP_KEYS_LIMIT`].
    pub fn mark_evict_asap(&mut self, key: &Key) {
        if self.evict_asap.iter().any(|k| k == key.as_bytes()) {
            return;
        }
        if self.evict_asap.len() >= EVICT_ASAP_KEYS_LIMIT {
            self.evict_asap.remove(0);
        }
        self.evict_asap.push(key.as_bytes().to_vec());
    }

    /// Drains the evict-asap candidate list.
    pub fn take_evict_asap(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.evict_asap)
    }

    /// This database's cold filter.
    pub fn cold_filter(&self) -> &ColdFilter {
        &self.cold_filter
    }

    /// Mutable access to this database's cold filter.
    pub fn cold_filter_mut(&mut self) -> &mut ColdFilter {
        &mut self.cold_filter
    }
}
