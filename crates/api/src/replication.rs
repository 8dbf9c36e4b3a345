//! Replication dispatch (§4.8): a pool of worker clients parallelises
//! swap work for the master→replica stream while preserving in-order
//! command application, mirroring the pipeline's own channel-based
//! worker pool (§5) one layer up.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use coldtier_engine::{Intention, IntentionFlags, Pipeline, Result, SwapCommand, SwapData};
use coldtier_storage::ObjectType;

/// One command parsed off the master replication stream, ready to enter
/// the swap pipeline (§4.8 step 1).
pub struct ReplicatedCommand {
    /// Database the command selects.
    pub db: u32,
    /// The key it touches.
    pub key: Vec<u8>,
    /// The key's value type.
    pub object_type: ObjectType,
    /// What the command resolves to.
    pub intention: Intention,
    /// Modifier flags for `intention`.
    pub flags: IntentionFlags,
    /// Pre-swap snapshot, the same as a locally originated request would
    /// build under its own key lock.
    pub data: SwapData,
    /// Byte length of this command on the wire, used to advance the
    /// applied offset once it's been called (§4.8 step 4).
    pub wire_len: u64,
}

/// Dispatches replicated commands to the pipeline in bounded-size
/// concurrent batches, then replays `on_call` for each command in the
/// batch in its original order — commands are swapped out of order but
/// always *called* in order (§4.8 invariant).
pub struct ReplicationDispatcher {
    pipeline: Arc<Pipeline>,
    worker_count: usize,
    next_txid: AtomicU64,
}

impl ReplicationDispatcher {
    /// Builds a dispatcher over `pipeline` with `worker_count` worker
    /// clients (§6 `repl.workers`, default 256 reserved clients).
    pub fn new(pipeline: Arc<Pipeline>, worker_count: usize) -> Self {
        ReplicationDispatcher { pipeline, worker_count: worker_count.max(1), next_txid: AtomicU64::new(1) }
    }

    fn next_txid(&self) -> u64 {
        self.next_txid.fetch_add(1, Ordering::Relaxed)
    }

    /// Applies `commands` in received order, dispatching up to
    /// `worker_count` of them to the pipeline at once. `on_call` fires
    /// once per command, strictly in the order commands were received,
    /// only after that command's swap (and every earlier command's) has
    /// finished. Returns the total wire length applied, for advancing
    /// the repl client's offset.
    pub fn apply_batch<F>(&self, commands: Vec<ReplicatedCommand>, mut on_call: F) -> Result<u64>
    where
        F: FnMut(&ReplicatedCommand, SwapData),
    {
        let mut applied = 0u64;
        for chunk in commands.chunks(self.worker_count) {
            let results: Vec<_> = std::thread::scope(|scope| {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|cmd| {
                        let pipeline = Arc::clone(&self.pipeline);
                        let txid = self.next_txid();
                        scope.spawn(move || {
                            let swap_cmd = SwapCommand {
                                db: cmd.db,
                                txid,
                                key: cmd.key.clone(),
                                object_type: cmd.object_type,
                                requested: cmd.intention,
                                flags: cmd.flags,
                                used_memory: 0,
                                maxmemory: 0,
                            };
                            pipeline.run(swap_cmd, cmd.data.clone())
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().expect("replication worker panicked")).collect()
            });

            for (cmd, result) in chunk.iter().zip(results) {
                let data = result?;
                on_call(cmd, data);
                applied += cmd.wire_len;
            }
        }
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coldtier_concurrency::LockManager;
    use coldtier_durability::{ColumnStore, MemStore};
    use coldtier_engine::pipeline::DEFAULT_WORKERS;

    fn dispatcher(worker_count: usize) -> ReplicationDispatcher {
        let locks = Arc::new(LockManager::new());
        let store: Arc<dyn ColumnStore> = Arc::new(MemStore::new());
        let pipeline = Arc::new(Pipeline::new(locks, store, DEFAULT_WORKERS));
        ReplicationDispatcher::new(pipeline, worker_count)
    }

    fn out_command(db: u32, key: &[u8], value: &[u8], wire_len: u64) -> ReplicatedCommand {
        let mut data = SwapData::new(db, key.to_vec());
        data.hot_value = Some(value.to_vec());
        ReplicatedCommand {
            db,
            key: key.to_vec(),
            object_type: ObjectType::String,
            intention: Intention::Out,
            flags: IntentionFlags::default(),
            data,
            wire_len,
        }
    }

    #[test]
    fn applies_commands_in_received_order() {
        let d = dispatcher(2);
        let commands = vec![out_command(0, b"a", b"1", 10), out_command(0, b"b", b"2", 20), out_command(0, b"c", b"3", 30)];
        let mut called_keys = Vec::new();
        let applied = d
            .apply_batch(commands, |cmd, _data| {
                called_keys.push(cmd.key.clone());
            })
            .unwrap();
        assert_eq!(called_keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert_eq!(applied, 60);
    }

    #[test]
    fn single_worker_still_applies_every_command() {
        let d = dispatcher(1);
        let commands = vec![out_command(0, b"a", b"1", 5), out_command(0, b"b", b"2", 5)];
        let mut count = 0;
        d.apply_batch(commands, |_, _| count += 1).unwrap();
        assert_eq!(count, 2);
    }
}
