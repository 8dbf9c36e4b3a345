//! The swap request pipeline (§4.5): admit → proceed → analyze →
//! dispatch → execute → notify → finish, with the worker side of
//! dispatch/execute running on a fixed thread pool reached only through
//! channels (§5), matching the teacher's channel-based background
//! scheduler rather than sharing mutable keyspace state across threads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use coldtier_concurrency::{LockManager, TxId};
use coldtier_durability::ColumnStore;

use crate::error::{Result, SwapError};
use crate::request::{codec_for, DecodedFragment, Intention, IntentionFlags, SwapData};
use coldtier_storage::ObjectType;

/// Default worker thread pool size (§5: "default 4, cap 64").
pub const DEFAULT_WORKERS: usize = 4;
/// Upper bound on the worker thread pool size (§5).
pub const MAX_WORKERS: usize = 64;

/// Identifies a swap request to [`Pipeline::run`]: which key to lock and
/// what the caller is asking for.
pub struct SwapCommand {
    /// Database the key belongs to.
    pub db: u32,
    /// The calling client's rolling transaction id (§4.4 waiter ordering).
    pub txid: TxId,
    /// The key to lock and swap.
    pub key: Vec<u8>,
    /// The key's value type.
    pub object_type: ObjectType,
    /// What the caller is asking for; [`SwapCodec::analyze`] may resolve
    /// to something else.
    pub requested: Intention,
    /// Modifier flags for `requested`.
    pub flags: IntentionFlags,
    /// Current used memory, for an OUT's persist-band `KEEP_DATA` decision
    /// (§4.6). Callers outside the persistence engine pass 0.
    pub used_memory: u64,
    /// Configured maxmemory, paired with `used_memory`. 0 means no cap is
    /// configured, which `should_keep_data` treats as "always keep".
    pub maxmemory: u64,
}

struct Job {
    db: u32,
    version: u64,
    object_type: ObjectType,
    intention: Intention,
    flags: IntentionFlags,
    used_memory: u64,
    maxmemory: u64,
    data: SwapData,
    reply: mpsc::Sender<Result<WorkerOutcome>>,
}

/// What a worker thread produced for one request (§4.5 step 5: "encode
/// keys/data/range per intention ... perform the RIO ... decode returned
/// rows ... capture absent subkeys").
struct WorkerOutcome {
    data: SwapData,
    fragment: Option<DecodedFragment>,
    written_rows: Vec<(Vec<u8>, Vec<u8>)>,
}

fn cf_for(object_type: ObjectType) -> coldtier_durability::ColumnFamily {
    match object_type {
        ObjectType::ZSet => coldtier_durability::ColumnFamily::Score,
        _ => coldtier_durability::ColumnFamily::Data,
    }
}

/// The version a row is written under. Strings carry no object meta and
/// always use version 0 (§4.3); every other type uses the version drawn
/// for this swap, matching its `objectMeta.version`.
fn version_for(object_type: ObjectType, drawn_version: u64) -> u64 {
    match object_type {
        ObjectType::String => 0,
        _ => drawn_version,
    }
}

fn run_job(job: Job, store: &dyn ColumnStore) -> Result<WorkerOutcome> {
    let codec = codec_for(job.object_type);
    let cf = cf_for(job.object_type);
    match job.intention {
        Intention::In => {
            let rows = if let Some((start, end)) = codec.range_load(job.db, &job.data, job.version) {
                store.iterate(cf, &start, &end).map_err(SwapError::Rio)?
            } else {
                let keys = codec.encode_keys(job.db, &job.data, job.version)?;
                let values = store.multi_get(cf, &keys).map_err(SwapError::Rio)?;
                keys.into_iter().zip(values).filter_map(|(k, v)| v.map(|v| (k, v))).collect()
            };
            let fragment = codec.decode_result(&rows)?;
            // IN_DEL: once the rows are decoded into the fragment, the
            // disk copy is no longer needed (§4.5 step 7, §8 scenario 5).
            if job.flags.del {
                let ranges = codec.swap_del(&job.data, job.version)?;
                for (start, end) in &ranges {
                    store.delete_range(cf, start, end).map_err(SwapError::Rio)?;
                }
            }
            Ok(WorkerOutcome { data: job.data, fragment: Some(fragment), written_rows: Vec::new() })
        }
        Intention::Out => {
            let db_key = job.data.key.clone();
            let mut data = job.data;
            let keep_data = if job.flags.persist {
                crate::persist::should_keep_data(job.used_memory, job.maxmemory)
            } else {
                job.flags.keep_data
            };
            let out = codec.swap_out(&mut data, keep_data)?;
            let row_version = version_for(job.object_type, job.version);
            for (subkey, v) in &out.rows {
                let full_key = crate::codec::encode_data_key(job.db, &db_key, row_version, subkey);
                store.put(cf, &full_key, v).map_err(SwapError::Rio)?;
            }
            Ok(WorkerOutcome { data, fragment: None, written_rows: out.rows })
        }
        Intention::Del => {
            let ranges = codec.swap_del(&job.data, job.version)?;
            for (start, end) in &ranges {
                store.delete_range(cf, start, end).map_err(SwapError::Rio)?;
            }
            Ok(WorkerOutcome { data: job.data, fragment: None, written_rows: Vec::new() })
        }
        Intention::Nop => Ok(WorkerOutcome { data: job.data, fragment: None, written_rows: Vec::new() }),
    }
}

struct WorkerPool {
    sender: Option<mpsc::Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    fn new(n: usize, store: Arc<dyn ColumnStore>) -> Self {
        let n = n.clamp(1, MAX_WORKERS);
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(std::sync::Mutex::new(receiver));
        let mut handles = Vec::with_capacity(n);
        for _ in 0..n {
            let receiver = Arc::clone(&receiver);
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || loop {
                let job = {
                    let rx = receiver.lock().unwrap();
                    rx.recv()
                };
                match job {
                    Ok(job) => {
                        let reply = job.reply.clone();
                        let outcome = run_job(job, store.as_ref());
                        let _ = reply.send(outcome);
                    }
                    Err(_) => break,
                }
            }));
        }
        WorkerPool { sender: Some(sender), handles }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Drop the sender first to close the channel — a manual Drop impl
        // runs before its struct's fields are dropped automatically, so
        // without this, workers would block in `recv()` forever and the
        // join below would never return.
        self.sender.take();
        for h in self.handles.drain(..) {
            let _ = h.join();
        }
    }
}

/// The swap request pipeline bound to one column store and one lock
/// manager. Owns the worker thread pool; admits requests from any
/// calling thread, serializes per-key I/O through the lock manager, and
/// runs the actual encode/RIO/decode work on a worker thread.
pub struct Pipeline {
    locks: Arc<LockManager>,
    store: Arc<dyn ColumnStore>,
    workers: WorkerPool,
    version: AtomicU64,
}

impl Pipeline {
    /// Builds a pipeline with `n_workers` worker threads over `store`,
    /// sharing `locks` with the rest of the server.
    pub fn new(locks: Arc<LockManager>, store: Arc<dyn ColumnStore>, n_workers: usize) -> Self {
        let workers = WorkerPool::new(n_workers, Arc::clone(&store));
        Pipeline { locks, store, workers, version: AtomicU64::new(1) }
    }

    /// Draws the next monotonic object version (§4.3).
    pub fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::Relaxed)
    }

    /// Bumps the version counter past `at_least` (`shiftVersion()`, §4.3:
    /// called on a replication role change to preserve the
    /// monotonicity invariant across a promotion).
    pub fn shift_version(&self, at_least: u64) {
        self.version.fetch_max(at_least, Ordering::Relaxed);
    }

    /// Runs one request through admit → proceed → analyze → dispatch →
    /// execute → notify → finish (§4.5), returning the post-swap
    /// [`SwapData`] for the caller to install back into the keyspace.
    ///
    /// `cmd.key` identifies the lock to acquire; `cmd.txid` is the
    /// calling client's rolling transaction id, used for waiter ordering
    /// (§4.4).
    pub fn run(&self, cmd: SwapCommand, data: SwapData) -> Result<SwapData> {
        let SwapCommand { db, txid, key, object_type, requested, flags, used_memory, maxmemory } = cmd;

        tracing::debug!(db, key = %String::from_utf8_lossy(&key), ?requested, "admit");

        // Admit: acquire the per-key lock (§4.5 step 1).
        let _guard = self.locks.lock_key(txid, db, &key);

        // Proceed: the caller has already materialized `data` from
        // current in-memory state under the lock (§4.5 step 2).
        let codec = codec_for(object_type);

        // Analyze (§4.5 step 3).
        let (intention, flags) = codec.analyze(&data, requested, flags)?;
        if intention == Intention::Nop {
            tracing::debug!(db, key = %String::from_utf8_lossy(&key), "finish: nop");
            return Ok(data);
        }

        // OUT mints a new object version (§4.3); IN/DEL operate on rows
        // written under the version the parent key's meta already carries.
        let version = match intention {
            Intention::Out => self.next_version(),
            _ => data.meta.as_ref().map(|m| m.version).unwrap_or(0),
        };

        // Dispatch + execute (§4.5 steps 4-5): hand the request to a
        // worker thread and block this call until it replies. Requests
        // against distinct keys still run concurrently because each
        // holds only its own key's lock while waiting here.
        tracing::debug!(db, key = %String::from_utf8_lossy(&key), ?intention, version, "dispatch");
        let (reply_tx, reply_rx) = mpsc::channel();
        let job = Job { db, version, object_type, intention, flags, used_memory, maxmemory, data, reply: reply_tx };
        self.workers
            .sender
            .as_ref()
            .expect("sender only cleared on drop")
            .send(job)
            .map_err(|_| SwapError::Exec { db, key: key.to_vec(), reason: "worker pool is shut down".into() })?;
        let outcome = reply_rx
            .recv()
            .map_err(|_| SwapError::Exec { db, key: key.to_vec(), reason: "worker dropped the reply channel".into() })??;

        // Notify + finish (§4.5 steps 6-7): install the result.
        let mut data = outcome.data;
        if intention == Intention::Out {
            let payload = match object_type {
                ObjectType::Hash | ObjectType::Set | ObjectType::ZSet => {
                    coldtier_storage::ObjectPayload::Len(outcome.written_rows.len() as u64)
                }
                ObjectType::String | ObjectType::List | ObjectType::Stream => {
                    coldtier_storage::ObjectPayload::None
                }
            };
            data.meta = Some(coldtier_storage::ObjectMeta { object_type, version, payload: payload.clone() });

            // Persist the meta descriptor alongside the data rows the
            // worker already wrote, so a restart's meta-scan recovery
            // (§4.7) has something to reconcile against.
            let meta_value = crate::codec::MetaValue {
                object_type,
                expire_ms: data.expire_ms.unwrap_or(-1),
                version,
                payload,
            };
            self.store
                .put(
                    coldtier_durability::ColumnFamily::Meta,
                    &crate::codec::encode_meta_key(db, &key),
                    &crate::codec::encode_meta_value(&meta_value),
                )
                .map_err(SwapError::Rio)?;
        }
        if let (Intention::In, Some(fragment)) = (intention, outcome.fragment) {
            codec.swap_in(&mut data, fragment)?;
        }
        if intention == Intention::Del || (intention == Intention::In && flags.del) {
            self.store
                .delete(coldtier_durability::ColumnFamily::Meta, &crate::codec::encode_meta_key(db, &key))
                .map_err(SwapError::Rio)?;
        }
        tracing::debug!(db, key = %String::from_utf8_lossy(&key), ?intention, "finish");
        Ok(data)
    }

    /// Direct access to the underlying column store, for recovery and
    /// meta-scan paths that don't go through the per-key pipeline.
    pub fn store(&self) -> &dyn ColumnStore {
        self.store.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coldtier_durability::MemStore;

    fn pipeline() -> Pipeline {
        let locks = Arc::new(LockManager::new());
        let store: Arc<dyn ColumnStore> = Arc::new(MemStore::new());
        Pipeline::new(locks, store, 2)
    }

    #[test]
    fn string_out_then_in_round_trips_through_disk() {
        let p = pipeline();
        let mut data = SwapData::new(0, b"k".to_vec());
        data.hot_value = Some(b"value".to_vec());

        let after_out = p
            .run(SwapCommand { db: 0, txid: 1, key: b"k".to_vec(), object_type: ObjectType::String, requested: Intention::Out, flags: IntentionFlags::default(), used_memory: 0, maxmemory: 0 }, data)
            .unwrap();
        assert!(after_out.hot_value.is_none());

        let empty = SwapData::new(0, b"k".to_vec());
        let after_in = p
            .run(SwapCommand { db: 0, txid: 2, key: b"k".to_vec(), object_type: ObjectType::String, requested: Intention::In, flags: IntentionFlags::default(), used_memory: 0, maxmemory: 0 }, empty)
            .unwrap();
        assert_eq!(after_in.hot_value, Some(b"value".to_vec()));
    }

    #[test]
    fn zset_out_then_in_round_trips_through_score_cf() {
        let p = pipeline();
        let mut stream = Vec::new();
        for (m, score) in [(b"alice".as_slice(), 1.5f64), (b"bob".as_slice(), -2.0f64)] {
            stream.extend_from_slice(&(m.len() as u32).to_le_bytes());
            stream.extend_from_slice(m);
            stream.extend_from_slice(&8u32.to_le_bytes());
            stream.extend_from_slice(&crate::codec::encode_score(score));
        }
        let mut data = SwapData::new(0, b"z".to_vec());
        data.hot_value = Some(stream);

        let after_out = p
            .run(SwapCommand { db: 0, txid: 1, key: b"z".to_vec(), object_type: ObjectType::ZSet, requested: Intention::Out, flags: IntentionFlags::default(), used_memory: 0, maxmemory: 0 }, data)
            .unwrap();
        assert!(after_out.hot_value.is_none());

        let mut empty = SwapData::new(0, b"z".to_vec());
        empty.meta = after_out.meta.clone();
        let after_in = p
            .run(SwapCommand { db: 0, txid: 2, key: b"z".to_vec(), object_type: ObjectType::ZSet, requested: Intention::In, flags: IntentionFlags::default(), used_memory: 0, maxmemory: 0 }, empty)
            .unwrap();

        let bytes = after_in.hot_value.unwrap();
        let mut by_member = std::collections::HashMap::new();
        let mut off = 0;
        while off + 4 <= bytes.len() {
            let mlen = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap()) as usize;
            off += 4;
            let member = bytes[off..off + mlen].to_vec();
            off += mlen;
            let slen = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap()) as usize;
            off += 4;
            let score_bytes: [u8; 8] = bytes[off..off + slen].try_into().unwrap();
            off += slen;
            by_member.insert(member, crate::codec::decode_score(score_bytes));
        }
        assert_eq!(by_member[b"alice".as_slice()], 1.5);
        assert_eq!(by_member[b"bob".as_slice()], -2.0);
    }

    #[test]
    fn nop_short_circuits_without_touching_disk() {
        let p = pipeline();
        let mut data = SwapData::new(0, b"k".to_vec());
        data.hot_value = Some(b"already hot".to_vec());
        let result = p
            .run(SwapCommand { db: 0, txid: 1, key: b"k".to_vec(), object_type: ObjectType::String, requested: Intention::In, flags: IntentionFlags::default(), used_memory: 0, maxmemory: 0 }, data)
            .unwrap();
        assert_eq!(result.hot_value, Some(b"already hot".to_vec()));
    }

    #[test]
    fn distinct_keys_run_concurrently() {
        use std::sync::Barrier;
        let p = Arc::new(pipeline());
        let barrier = Arc::new(Barrier::new(2));
        let mut handles = Vec::new();
        for i in 0..2u8 {
            let p = Arc::clone(&p);
            let barrier = Arc::clone(&barrier);
            handles.push(std::thread::spawn(move || {
                barrier.wait();
                let mut data = SwapData::new(0, vec![i]);
                data.hot_value = Some(vec![i]);
                p.run(SwapCommand { db: 0, txid: i as u64 + 1, key: vec![i], object_type: ObjectType::String, requested: Intention::Out, flags: IntentionFlags::default(), used_memory: 0, maxmemory: 0 }, data)
                    .unwrap();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn shift_version_bumps_past_observed_value() {
        let p = pipeline();
        let _ = p.next_version();
        p.shift_version(1000);
        assert_eq!(p.next_version(), 1000);
    }

    #[test]
    fn keep_data_flag_keeps_the_hot_value_after_out() {
        let p = pipeline();
        let mut data = SwapData::new(0, b"k".to_vec());
        data.hot_value = Some(b"value".to_vec());
        let flags = IntentionFlags { keep_data: true, ..IntentionFlags::default() };
        let out = p
            .run(SwapCommand { db: 0, txid: 1, key: b"k".to_vec(), object_type: ObjectType::String, requested: Intention::Out, flags, used_memory: 0, maxmemory: 0 }, data)
            .unwrap();
        assert_eq!(out.hot_value, Some(b"value".to_vec()));
    }

    #[test]
    fn persist_driven_out_drops_hot_value_above_the_keep_data_band() {
        let p = pipeline();
        let mut data = SwapData::new(0, b"k".to_vec());
        data.hot_value = Some(b"value".to_vec());
        // keep_data is set, but a persist-driven flush overrides it with
        // the used-memory band: 90% of maxmemory is above the 80% line,
        // so the in-memory copy is dropped (§4.6).
        let flags = IntentionFlags { keep_data: true, persist: true, ..IntentionFlags::default() };
        let out = p
            .run(
                SwapCommand { db: 0, txid: 1, key: b"k".to_vec(), object_type: ObjectType::String, requested: Intention::Out, flags, used_memory: 90, maxmemory: 100 },
                data,
            )
            .unwrap();
        assert!(out.hot_value.is_none());
    }

    #[test]
    fn in_del_removes_disk_rows_and_meta_alongside_the_merge() {
        let p = pipeline();
        let mut data = SwapData::new(0, b"k".to_vec());
        data.hot_value = Some(b"value".to_vec());
        p.run(SwapCommand { db: 0, txid: 1, key: b"k".to_vec(), object_type: ObjectType::String, requested: Intention::Out, flags: IntentionFlags::default(), used_memory: 0, maxmemory: 0 }, data)
            .unwrap();

        let mut empty = SwapData::new(0, b"k".to_vec());
        let meta_before = p.store.get(coldtier_durability::ColumnFamily::Meta, &crate::codec::encode_meta_key(0, b"k")).unwrap();
        assert!(meta_before.is_some());
        empty.meta = Some(coldtier_storage::ObjectMeta { object_type: ObjectType::String, version: 0, payload: coldtier_storage::ObjectPayload::None });
        let flags = IntentionFlags { del: true, ..IntentionFlags::default() };
        let after_in = p.run(SwapCommand { db: 0, txid: 2, key: b"k".to_vec(), object_type: ObjectType::String, requested: Intention::In, flags, used_memory: 0, maxmemory: 0 }, empty).unwrap();
        assert_eq!(after_in.hot_value, Some(b"value".to_vec()));

        let data_row = p.store.get(coldtier_durability::ColumnFamily::Data, &crate::codec::encode_data_key(0, b"k", 0, &[])).unwrap();
        assert!(data_row.is_none());
        let meta_after = p.store.get(coldtier_durability::ColumnFamily::Meta, &crate::codec::encode_meta_key(0, b"k")).unwrap();
        assert!(meta_after.is_none());
    }
}
