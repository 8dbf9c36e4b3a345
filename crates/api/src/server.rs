//! The swap server: owns the per-db keyspace state, the persistence
//! tracker, and the pipeline, and gives the CLI surface (§6) something
//! concrete to dispatch against.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use coldtier_concurrency::{LockManager, ServerLockGuard, TxId};
use coldtier_core::Key;
use coldtier_durability::ColumnStore;
use coldtier_engine::config::ConfigError;
use coldtier_engine::eviction::EvictionStats;
use coldtier_engine::persist::PersistingKeys;
use coldtier_engine::{recover, Intention, IntentionFlags, Pipeline, Result, SwapCommand, SwapConfig, SwapData, SwapError};
use coldtier_storage::{Database, ObjectMeta, ObjectType};

/// Outcome of one [`SwapServer::evict_key`] attempt (§4.6 `tryEvictKey`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictOutcome {
    /// The key was flushed to disk and its hot value freed.
    Freed,
    /// The key isn't hot; nothing to do.
    Absent,
    /// The key's type doesn't support eviction (List/Stream).
    Unsupported,
}

/// Outcome of one [`SwapServer::load_key`] attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The key was loaded from disk into memory.
    Loaded,
    /// The key was already hot.
    AlreadyHot,
    /// The key has no on-disk portion to load.
    Absent,
    /// The key's type doesn't support loading (List/Stream).
    Unsupported,
}

fn key_of(bytes: &[u8]) -> std::result::Result<Key, SwapError> {
    Key::new(bytes.to_vec())
        .map_err(|e| SwapError::Data { db: 0, key: bytes.to_vec(), reason: e.to_string() })
}

fn unsupported(object_type: ObjectType) -> bool {
    matches!(object_type, ObjectType::List | ObjectType::Stream)
}

/// Ties together one db's worth of in-memory swap state, the persistence
/// tracker, eviction accounting, and the pipeline they all drive through.
pub struct SwapServer {
    pipeline: Pipeline,
    locks: Arc<LockManager>,
    dbs: Mutex<HashMap<u32, Database>>,
    persisting: Mutex<PersistingKeys>,
    eviction_stats: Mutex<EvictionStats>,
    next_txid: AtomicU64,
    config: SwapConfig,
}

impl SwapServer {
    /// Validates `config` and builds a server over `store`.
    pub fn new(config: SwapConfig, store: Arc<dyn ColumnStore>) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let locks = Arc::new(LockManager::new());
        let pipeline = Pipeline::new(Arc::clone(&locks), store, coldtier_engine::pipeline::DEFAULT_WORKERS);
        Ok(SwapServer {
            pipeline,
            locks,
            dbs: Mutex::new(HashMap::new()),
            persisting: Mutex::new(PersistingKeys::new()),
            eviction_stats: Mutex::new(EvictionStats::default()),
            next_txid: AtomicU64::new(1),
            config,
        })
    }

    fn next_txid(&self) -> TxId {
        self.next_txid.fetch_add(1, Ordering::Relaxed)
    }

    fn with_db<R>(&self, db: u32, f: impl FnOnce(&mut Database) -> R) -> std::result::Result<R, ConfigError> {
        let mut dbs = self.dbs.lock();
        if let std::collections::hash_map::Entry::Vacant(e) = dbs.entry(db) {
            let bits = self.config.cuckoo_filter.bits_per_tag()?;
            let database = Database::new(
                db,
                bits,
                self.config.cuckoo_filter.estimated_keys,
                self.config.absent_cache.capacity,
            );
            e.insert(database);
        }
        Ok(f(dbs.get_mut(&db).expect("just inserted")))
    }

    /// Installs `value` as `key`'s hot value, creating the db if needed.
    /// Used by callers bootstrapping state before a key ever goes
    /// through the swap pipeline (the host keyspace's equivalent of a
    /// plain SET).
    pub fn put_hot(&self, db: u32, key: &[u8], value: Vec<u8>) -> std::result::Result<(), SwapError> {
        let k = key_of(key)?;
        self.with_db(db, |database| database.set_hot(&k, value))
            .map_err(|e| SwapError::Setup { db, key: key.to_vec(), reason: e.to_string() })
    }

    /// Force-evicts one key: flushes its hot value to disk and frees it
    /// (§4.6 `SWAP.EVICT`). The key's type is taken from its existing
    /// meta, defaulting to `String` for a key that has never been
    /// swapped out before — this subsystem doesn't own the host's value
    /// type registry (see DESIGN.md).
    pub fn evict_key(&self, db: u32, key: &[u8]) -> Result<EvictOutcome> {
        let k = key_of(key)?;
        let object_type = self
            .with_db(db, |database| database.get_meta(&k).map(|m| m.object_type))
            .map_err(|e| SwapError::Setup { db, key: key.to_vec(), reason: e.to_string() })?
            .unwrap_or(ObjectType::String);
        if unsupported(object_type) {
            return Ok(EvictOutcome::Unsupported);
        }

        let snapshot = self
            .with_db(db, |database| {
                if !database.is_hot(&k) {
                    return None;
                }
                let mut data = SwapData::new(db, key.to_vec());
                data.hot_value = database.get_hot(&k).map(<[u8]>::to_vec);
                data.meta = database.get_meta(&k).cloned();
                Some(data)
            })
            .map_err(|e| SwapError::Setup { db, key: key.to_vec(), reason: e.to_string() })?;

        let Some(data) = snapshot else {
            return Ok(EvictOutcome::Absent);
        };

        let txid = self.next_txid();
        let cmd = SwapCommand {
            db,
            txid,
            key: key.to_vec(),
            object_type,
            requested: Intention::Out,
            flags: IntentionFlags::default(),
            used_memory: 0,
            maxmemory: 0,
        };
        let out = self.pipeline.run(cmd, data)?;

        self.with_db(db, |database| {
            database.clear_hot(&k);
            database.clear_dirty_subkeys(&k);
            if let Some(meta) = out.meta {
                database.set_meta(&k, meta);
            }
            database.cold_filter_mut().add_key(key);
        })
        .map_err(|e| SwapError::Setup { db, key: key.to_vec(), reason: e.to_string() })?;

        self.eviction_stats.lock().succ_freed += 1;
        Ok(EvictOutcome::Freed)
    }

    /// Force-evicts every listed key (§6 `SWAP.EVICT key [key ...]`).
    pub fn evict_keys(&self, db: u32, keys: &[Vec<u8>]) -> Result<Vec<EvictOutcome>> {
        keys.iter().map(|k| self.evict_key(db, k)).collect()
    }

    /// Loads one key from disk into memory (§6 `SWAP.LOAD`).
    pub fn load_key(&self, db: u32, key: &[u8]) -> Result<LoadOutcome> {
        self.load_key_inner(db, key, IntentionFlags::default())
    }

    /// Loads one key from disk into memory and removes its on-disk rows
    /// and meta in the same swap (SWAP_IN | IN_DEL, §4.5 step 7, §8
    /// scenario 5) — e.g. a move/migrate path that wants the key warm on
    /// one side and gone from disk in a single lock hold.
    pub fn load_and_delete_key(&self, db: u32, key: &[u8]) -> Result<LoadOutcome> {
        self.load_key_inner(db, key, IntentionFlags { del: true, ..IntentionFlags::default() })
    }

    fn load_key_inner(&self, db: u32, key: &[u8], flags: IntentionFlags) -> Result<LoadOutcome> {
        let k = key_of(key)?;
        let snapshot = self
            .with_db(db, |database| {
                if database.is_hot(&k) {
                    return Err(LoadOutcome::AlreadyHot);
                }
                match database.get_meta(&k).cloned() {
                    Some(meta) if unsupported(meta.object_type) => Err(LoadOutcome::Unsupported),
                    Some(meta) => {
                        // A missing in-memory key consults the cold filter
                        // before a disk round trip is dispatched; a
                        // confirmed absence short-circuits to NOP (§4.5
                        // step 2).
                        let (may_contain, _) = database.cold_filter_mut().may_contain_key(key);
                        if !may_contain {
                            return Err(LoadOutcome::Absent);
                        }
                        let mut data = SwapData::new(db, key.to_vec());
                        let object_type = meta.object_type;
                        data.meta = Some(meta);
                        Ok((data, object_type))
                    }
                    None => Err(LoadOutcome::Absent),
                }
            })
            .map_err(|e| SwapError::Setup { db, key: key.to_vec(), reason: e.to_string() })?;

        let (data, object_type) = match snapshot {
            Ok(pair) => pair,
            Err(outcome) => return Ok(outcome),
        };

        let txid = self.next_txid();
        let cmd = SwapCommand {
            db,
            txid,
            key: key.to_vec(),
            object_type,
            requested: Intention::In,
            flags,
            used_memory: 0,
            maxmemory: 0,
        };
        let out = self.pipeline.run(cmd, data)?;

        self.with_db(db, |database| {
            if let Some(value) = out.hot_value {
                database.set_hot(&k, value);
            }
            if flags.del {
                database.clear_meta(&k);
                database.cold_filter_mut().delete_key(key);
            }
        })
        .map_err(|e| SwapError::Setup { db, key: key.to_vec(), reason: e.to_string() })?;

        Ok(LoadOutcome::Loaded)
    }

    /// Loads every listed key (§6 `SWAP.LOAD key [key ...]`).
    pub fn load_keys(&self, db: u32, keys: &[Vec<u8>]) -> Result<Vec<LoadOutcome>> {
        keys.iter().map(|k| self.load_key(db, k)).collect()
    }

    /// Scrubs `key`'s on-disk rows and meta entirely (§6 `SWAP.EXPIRED`,
    /// the cold-key TTL enforcement path). Returns whether anything was
    /// actually removed.
    pub fn expire_key(&self, db: u32, key: &[u8]) -> Result<bool> {
        let k = key_of(key)?;
        let meta = self
            .with_db(db, |database| database.get_meta(&k).cloned())
            .map_err(|e| SwapError::Setup { db, key: key.to_vec(), reason: e.to_string() })?;
        let Some(meta) = meta else { return Ok(false) };

        let mut data = SwapData::new(db, key.to_vec());
        let object_type = meta.object_type;
        data.meta = Some(meta);
        let txid = self.next_txid();
        let cmd = SwapCommand {
            db,
            txid,
            key: key.to_vec(),
            object_type,
            requested: Intention::Del,
            flags: IntentionFlags::default(),
            used_memory: 0,
            maxmemory: 0,
        };
        self.pipeline.run(cmd, data)?;

        self.with_db(db, |database| {
            database.clear_hot(&k);
            database.clear_meta(&k);
            database.clear_dirty_subkeys(&k);
            database.cold_filter_mut().delete_key(key);
        })
        .map_err(|e| SwapError::Setup { db, key: key.to_vec(), reason: e.to_string() })?;
        Ok(true)
    }

    /// Sweeps up to `limit` keys drawn from `db`'s evict-asap candidate
    /// list through [`Self::expire_key`] (§6 `SWAP.SCANEXPIRE`), an
    /// internal maintenance pass rather than a precise TTL scan (this
    /// subsystem doesn't itself track per-key expire times; see
    /// DESIGN.md).
    pub fn scan_expire(&self, db: u32, limit: usize) -> Result<usize> {
        let candidates = self
            .with_db(db, |database| {
                let mut drained = database.take_evict_asap();
                drained.truncate(limit);
                drained
            })
            .map_err(|e| SwapError::Setup { db, key: Vec::new(), reason: e.to_string() })?;

        let mut processed = 0;
        for key in &candidates {
            if self.expire_key(db, key)? {
                processed += 1;
            }
        }
        Ok(processed)
    }

    /// Acquires the server-level drain point used by `SWAP.MUTEXOP`
    /// (§4.8's `lockGlobalAndExec` synchronisation).
    pub fn mutexop(&self) -> ServerLockGuard<'_> {
        self.locks.lock_server_exclusive()
    }

    /// Renders the `# Section\r\nkey:value\r\n` blocks backing
    /// `SWAP.INFO` (§6, §10.2), aggregating cold-filter counters across
    /// every database known to the server.
    pub fn info_string(&self) -> String {
        let dbs = self.dbs.lock();
        let mut filt = coldtier_storage::ColdFilterStats::default();
        for database in dbs.values() {
            let s = database.cold_filter().stats();
            filt.cuckoo_hits += s.cuckoo_hits;
            filt.cuckoo_misses += s.cuckoo_misses;
            filt.absent_hits += s.absent_hits;
            filt.absent_misses += s.absent_misses;
            filt.false_positives += s.false_positives;
        }
        let persisting = self.persisting.lock();
        let eviction = self.eviction_stats.lock();

        format!(
            "# ColdFilter\r\ncuckoo_hits:{}\r\ncuckoo_misses:{}\r\nabsent_hits:{}\r\nabsent_misses:{}\r\nfalse_positives:{}\r\n\
             # Persistence\r\npersisting_keys:{}\r\npersisting_lag_ms:0\r\n\
             # Eviction\r\nsucc_freed:{}\r\nfail_absent:{}\r\nfail_unsupported:{}\r\n",
            filt.cuckoo_hits,
            filt.cuckoo_misses,
            filt.absent_hits,
            filt.absent_misses,
            filt.false_positives,
            persisting.len(),
            eviction.succ_freed,
            eviction.fail_absent,
            eviction.fail_unsupported,
        )
    }

    /// Direct pipeline access for request paths (e.g. the replication
    /// dispatcher) that already have their own [`SwapCommand`] built.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Runs startup recovery (§4.7): scans the on-disk META rows, rebuilds
    /// each key's meta against what its DATA/SCORE rows actually contain,
    /// and registers every surviving key cold in its db's filter. Meant to
    /// run once, before the server takes traffic. Returns the number of
    /// keys kept.
    pub fn recover(&self) -> Result<usize> {
        let report = recover(self.pipeline.store())?;
        for recovered in &report.kept {
            let k = key_of(&recovered.key)?;
            self.with_db(recovered.db, |database| {
                database.set_meta(
                    &k,
                    ObjectMeta {
                        object_type: recovered.meta.object_type,
                        version: recovered.meta.version,
                        payload: recovered.meta.payload.clone(),
                    },
                );
                database.cold_filter_mut().add_key(&recovered.key);
            })
            .map_err(|e| SwapError::Setup { db: recovered.db, key: recovered.key.clone(), reason: e.to_string() })?;
        }
        Ok(report.kept.len())
    }
}
