//! Persistence engine (§4.7): the per-db `persistingKeys` TODO/DOING
//! state machine, the lag-based in-progress limit, and the keep-data
//! decision driven by used-memory band.

use std::collections::HashMap;

use crate::config::PersistConfig;

/// Memory-usage fraction of maxmemory above which a scheduled flush drops
/// its in-memory copy instead of keeping it (§4.6: "≥80% of maxmemory ⇒
/// don't keep").
pub const KEEP_DATA_MEMORY_BAND: f64 = 0.80;

/// Whether a scheduled OUT should keep the in-memory copy, given current
/// memory pressure.
pub fn should_keep_data(used_memory: u64, maxmemory: u64) -> bool {
    if maxmemory == 0 {
        return true;
    }
    (used_memory as f64 / maxmemory as f64) < KEEP_DATA_MEMORY_BAND
}

/// Where a `persistingKey` entry currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistState {
    /// Waiting to be picked up by a scan.
    Todo,
    /// Submitted as a SWAP_OUT and awaiting completion.
    Doing,
}

#[derive(Debug, Clone)]
struct Entry {
    persist_version: u64,
    enqueued_at_ms: u64,
    state: PersistState,
}

/// Tracks keys awaiting flush to disk across every database (§3
/// `persistingKey entry`, §4.7).
#[derive(Default)]
pub struct PersistingKeys {
    next_version: u64,
    entries: HashMap<(u32, Vec<u8>), Entry>,
}

impl PersistingKeys {
    /// An empty tracker.
    pub fn new() -> Self {
        PersistingKeys { next_version: 1, entries: HashMap::new() }
    }

    /// Overwrite-or-insert `(db, key)` into the TODO list. On overwrite,
    /// only the version is refreshed — the earliest enqueue time is
    /// preserved (§4.7 `addKey`).
    pub fn add_key(&mut self, db: u32, key: &[u8], now_ms: u64) -> u64 {
        let version = self.next_version;
        self.next_version += 1;
        self.entries
            .entry((db, key.to_vec()))
            .and_modify(|e| e.persist_version = version)
            .or_insert(Entry { persist_version: version, enqueued_at_ms: now_ms, state: PersistState::Todo });
        version
    }

    /// Bounded scan over TODO entries: marks up to `limit` of them DOING,
    /// returning their `(db, key, persist_version)` for submission as
    /// evict requests (§4.7 `persistKeys`). Entries are scanned oldest
    /// enqueue time first, matching the FIFO invariant of §3.
    pub fn persist_keys(&mut self, limit: usize) -> Vec<(u32, Vec<u8>, u64)> {
        let mut todo: Vec<(u32, Vec<u8>)> = self
            .entries
            .iter()
            .filter(|(_, e)| e.state == PersistState::Todo)
            .map(|(k, _)| k.clone())
            .collect();
        todo.sort_by_key(|k| self.entries[k].enqueued_at_ms);
        todo.truncate(limit);

        let mut picked = Vec::with_capacity(todo.len());
        for (db, key) in todo {
            let entry = self.entries.get_mut(&(db, key.clone())).unwrap();
            entry.state = PersistState::Doing;
            picked.push((db, key, entry.persist_version));
        }
        picked
    }

    /// Reports that the SWAP_OUT for `(db, key)` at `persist_version`
    /// finished. If the entry is still at that version and the object is
    /// no longer dirty, it's removed; otherwise it rewinds DOING→TODO
    /// (§4.7 `requestFinished`).
    pub fn request_finished(&mut self, db: u32, key: &[u8], persist_version: u64, still_dirty: bool) {
        let map_key = (db, key.to_vec());
        let Some(entry) = self.entries.get_mut(&map_key) else { return };
        if entry.persist_version == persist_version && !still_dirty {
            self.entries.remove(&map_key);
        } else {
            entry.state = PersistState::Todo;
        }
    }

    /// `lag() = now - min(earliest mstime across all dbs)` (§4.7). Zero
    /// if nothing is pending.
    pub fn lag(&self, now_ms: u64) -> u64 {
        self.entries.values().map(|e| e.enqueued_at_ms).min().map(|earliest| now_ms.saturating_sub(earliest)).unwrap_or(0)
    }

    /// Number of entries currently tracked, regardless of state.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The in-progress limit for a persistence scan, scaling with how far the
/// current lag has overshot `lag_millis` (§4.6: "`inprogress_limit = 1 +
/// max(0, lag_ms - lag_threshold) / growth_rate`").
pub fn inprogress_limit(lag_ms: u64, cfg: &PersistConfig) -> usize {
    if cfg.inprogress_growth_rate <= 0.0 {
        return 1;
    }
    let overshoot = lag_ms.saturating_sub(cfg.lag_millis) as f64;
    1 + (overshoot / cfg.inprogress_growth_rate) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_persist_then_finish_removes_entry() {
        let mut pk = PersistingKeys::new();
        pk.add_key(0, b"a", 1000);
        let picked = pk.persist_keys(10);
        assert_eq!(picked.len(), 1);
        let (db, key, version) = picked[0].clone();
        pk.request_finished(db, &key, version, false);
        assert!(pk.is_empty());
    }

    #[test]
    fn still_dirty_rewinds_to_todo() {
        let mut pk = PersistingKeys::new();
        pk.add_key(0, b"a", 1000);
        let (db, key, version) = pk.persist_keys(10).remove(0);
        pk.request_finished(db, &key, version, true);
        assert_eq!(pk.len(), 1);
        // it's back in TODO, so a fresh scan picks it up again
        assert_eq!(pk.persist_keys(10).len(), 1);
    }

    #[test]
    fn newer_version_since_dispatch_rewinds_even_if_clean() {
        let mut pk = PersistingKeys::new();
        pk.add_key(0, b"a", 1000);
        let (db, key, stale_version) = pk.persist_keys(10).remove(0);
        pk.add_key(0, b"a", 1001); // a newer write landed while DOING
        pk.request_finished(db, &key, stale_version, false);
        assert_eq!(pk.len(), 1, "entry should survive since a newer version is pending");
    }

    #[test]
    fn overwrite_preserves_earliest_enqueue_time() {
        let mut pk = PersistingKeys::new();
        pk.add_key(0, b"a", 1000);
        pk.add_key(0, b"a", 5000);
        assert_eq!(pk.lag(6000), 5000);
    }

    #[test]
    fn persist_keys_scans_oldest_first() {
        let mut pk = PersistingKeys::new();
        pk.add_key(0, b"late", 2000);
        pk.add_key(0, b"early", 1000);
        let picked = pk.persist_keys(1);
        assert_eq!(picked[0].1, b"early");
    }

    #[test]
    fn inprogress_limit_grows_with_lag_overshoot() {
        let cfg = PersistConfig { enabled: true, lag_millis: 1000, inprogress_growth_rate: 100.0 };
        assert_eq!(inprogress_limit(500, &cfg), 1);
        assert_eq!(inprogress_limit(1500, &cfg), 1 + 5);
    }

    #[test]
    fn keep_data_flips_at_eighty_percent() {
        assert!(should_keep_data(79, 100));
        assert!(!should_keep_data(80, 100));
    }
}
