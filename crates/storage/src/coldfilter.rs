//! Cold filter: the composite membership structure that decides whether
//! a key that isn't in the hot keyspace might still have data on disk
//! (§4.2).

use crate::cuckoo::{BitsPerTag, CuckooFilter};
use crate::lru::LruCache;

/// Which source decided `may_contain_key`'s answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiltReason {
    /// The cuckoo filter reports the key may be present.
    Cuckoo,
    /// The key (or subkey) is held in the absent cache.
    Absent,
}

/// Running counters backing `genSwapCuckooFilterInfoString` (§4.2, wired
/// into the `info()` surface of §10.2).
#[derive(Debug, Default, Clone, Copy)]
pub struct ColdFilterStats {
    /// Times the cuckoo filter was consulted and reported present.
    pub cuckoo_hits: u64,
    /// Times the cuckoo filter was consulted and reported absent.
    pub cuckoo_misses: u64,
    /// Times the absent cache reported a key/subkey as recently absent.
    pub absent_hits: u64,
    /// Times the absent cache was consulted and found nothing.
    pub absent_misses: u64,
    /// Times a disk GET confirmed the cuckoo filter's positive was wrong.
    pub false_positives: u64,
}

/// Per-database composite cold-key filter: a lazily constructed cuckoo
/// filter over confirmed-cold keys, plus an optional absent-key/absent-
/// subkey LRU. A `false` from `may_contain_key` is a hard guarantee the
/// key is not on disk, provided `add_key` is called on every successful
/// disk write (§4.2 invariant).
pub struct ColdFilter {
    bits_per_tag: BitsPerTag,
    estimated_keys: usize,
    cuckoo: Option<CuckooFilter>,
    cuckoo_disabled: bool,
    absent: Option<LruCache>,
    absent_subkeys: Option<LruCache>,
    stats: ColdFilterStats,
}

fn subkey_entry(key: &[u8], subkey: &[u8]) -> Vec<u8> {
    let mut entry = Vec::with_capacity(key.len() + subkey.len() + 1);
    entry.extend_from_slice(key);
    entry.push(0);
    entry.extend_from_slice(subkey);
    entry
}

impl ColdFilter {
    /// Creates a cold filter. `absent_capacity` of 0 disables the absent
    /// cache entirely (§8 scenario 4: "`absent_cache.enabled=false`").
    pub fn new(bits_per_tag: BitsPerTag, estimated_keys: usize, absent_capacity: usize) -> Self {
        ColdFilter {
            bits_per_tag,
            estimated_keys,
            cuckoo: None,
            cuckoo_disabled: false,
            absent: (absent_capacity > 0).then(|| LruCache::new(absent_capacity)),
            absent_subkeys: (absent_capacity > 0).then(|| LruCache::new(absent_capacity)),
            stats: ColdFilterStats::default(),
        }
    }

    fn cuckoo_mut(&mut self) -> Option<&mut CuckooFilter> {
        if self.cuckoo_disabled {
            return None;
        }
        if self.cuckoo.is_none() {
            self.cuckoo = Some(CuckooFilter::new(self.bits_per_tag, self.estimated_keys));
        }
        self.cuckoo.as_mut()
    }

    /// Records that `key` now has a confirmed on-disk row: adds it to the
    /// cuckoo filter and clears it from the absent cache. If the cuckoo
    /// filter cannot place the key even after growing, the whole filter is
    /// permanently disabled server-wide for this db (logged warning) —
    /// `mayContainKey` then conservatively answers `true` for every key.
    pub fn add_key(&mut self, key: &[u8]) {
        if let Some(a) = &mut self.absent {
            a.delete(key);
        }
        if let Some(cf) = self.cuckoo_mut() {
            if !cf.insert(key) {
                tracing::warn!(
                    key = %String::from_utf8_lossy(key),
                    "cuckoo filter insert failed permanently; disabling cold filter for this db"
                );
                self.cuckoo_disabled = true;
                self.cuckoo = None;
            }
        }
    }

    /// Removes `key` from the cuckoo filter only (§4.2: "deleteKey(k)
    /// removes from cuckoo only").
    pub fn delete_key(&mut self, key: &[u8]) {
        if let Some(cf) = &mut self.cuckoo {
            cf.delete(key);
        }
    }

    /// Called after a disk GET for `key` returned nothing: records the
    /// absence and, if the cuckoo filter was consulted for this key, counts
    /// a false positive.
    pub fn key_not_found(&mut self, key: &[u8]) {
        if let Some(cf) = &self.cuckoo {
            if cf.contains(key).unwrap_or(true) {
                self.stats.false_positives += 1;
            }
        }
        if let Some(a) = &mut self.absent {
            a.put(key);
        }
    }

    /// Subkey variant of [`Self::key_not_found`]: touches only the absent
    /// cache (§4.2: "Subkey variants mirror key variants but only touch the
    /// absent cache").
    pub fn subkey_not_found(&mut self, key: &[u8], subkey: &[u8]) {
        if let Some(a) = &mut self.absent_subkeys {
            a.put(&subkey_entry(key, subkey));
        }
    }

    /// Returns `true` if `key` may have on-disk data, along with the reason.
    /// If the cuckoo filter is disabled server-wide, this conservatively
    /// answers `true` with [`FiltReason::Cuckoo`]. A hit in the absent
    /// cache is a confirmed-missing record, so it answers `false`.
    pub fn may_contain_key(&mut self, key: &[u8]) -> (bool, FiltReason) {
        if self.cuckoo_disabled {
            return (true, FiltReason::Cuckoo);
        }
        if let Some(a) = &mut self.absent {
            if a.get(key) {
                self.stats.absent_hits += 1;
                return (false, FiltReason::Absent);
            }
            self.stats.absent_misses += 1;
        }
        match &self.cuckoo {
            Some(cf) => match cf.contains(key) {
                Some(true) | None => {
                    self.stats.cuckoo_hits += 1;
                    (true, FiltReason::Cuckoo)
                }
                Some(false) => {
                    self.stats.cuckoo_misses += 1;
                    (false, FiltReason::Cuckoo)
                }
            },
            // No cuckoo filter constructed yet means nothing has ever
            // been added: nothing can be cold.
            None => (false, FiltReason::Cuckoo),
        }
    }

    /// Subkey variant: only the absent-subkey cache is consulted, since the
    /// cuckoo filter only tracks whole keys.
    pub fn may_contain_subkey(&mut self, key: &[u8], subkey: &[u8]) -> bool {
        match &mut self.absent_subkeys {
            Some(a) => !a.get(&subkey_entry(key, subkey)),
            None => true,
        }
    }

    /// Snapshot of the running counters.
    pub fn stats(&self) -> ColdFilterStats {
        self.stats
    }

    /// Whether the cuckoo filter has been permanently disabled for this db.
    pub fn is_cuckoo_disabled(&self) -> bool {
        self.cuckoo_disabled
    }
}
