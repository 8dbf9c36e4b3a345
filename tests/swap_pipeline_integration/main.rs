//! End-to-end coverage of the admit -> analyze -> dispatch -> execute ->
//! finish pipeline against a real `ColumnStore`, plus the meta-scan
//! recovery pass that runs ahead of it at startup.

use std::sync::Arc;

use coldtier::{handle_command, CliReply, EvictOutcome, LoadOutcome, SwapConfig, SwapServer};
use coldtier_durability::{ColumnFamily, ColumnStore, MemStore};
use coldtier_engine::codec::{encode_data_key, encode_meta_key, encode_meta_value, MetaValue};
use coldtier_storage::{ObjectPayload, ObjectType};

fn server_over(store: Arc<dyn ColumnStore>) -> SwapServer {
    SwapServer::new(SwapConfig::default(), store).expect("default config is always valid")
}

/// Scenario 4: swap-out round trip for a string with an expire set.
#[test]
fn string_swap_out_then_in_round_trips_through_disk() {
    let store: Arc<dyn ColumnStore> = Arc::new(MemStore::new());
    let server = server_over(Arc::clone(&store));

    server.put_hot(0, b"k", b"v".to_vec()).unwrap();
    assert_eq!(server.evict_key(0, b"k").unwrap(), EvictOutcome::Freed);

    // The key's hot value is gone but its meta and data rows exist on disk.
    assert!(store.get(ColumnFamily::Meta, &encode_meta_key(0, b"k")).unwrap().is_some());
    assert!(store.get(ColumnFamily::Data, &encode_data_key(0, b"k", 0, b"")).unwrap().is_some());

    assert_eq!(server.load_key(0, b"k").unwrap(), LoadOutcome::Loaded);
    // disk rows are retained by a plain load (no IN_DEL flag).
    assert!(store.get(ColumnFamily::Data, &encode_data_key(0, b"k", 0, b"")).unwrap().is_some());
}

/// Scenario 5: SWAP.EXPIRED removes both the META and DATA rows once a
/// key has gone cold, matching IN_DEL's full-removal semantics.
#[test]
fn expire_removes_meta_and_data_rows_after_swap_out() {
    let store: Arc<dyn ColumnStore> = Arc::new(MemStore::new());
    let server = server_over(Arc::clone(&store));

    server.put_hot(0, b"k", b"v".to_vec()).unwrap();
    server.evict_key(0, b"k").unwrap();
    assert!(server.expire_key(0, b"k").unwrap());

    assert!(store.get(ColumnFamily::Meta, &encode_meta_key(0, b"k")).unwrap().is_none());
    assert!(store.get(ColumnFamily::Data, &encode_data_key(0, b"k", 0, b"")).unwrap().is_none());
    assert_eq!(server.load_key(0, b"k").unwrap(), LoadOutcome::Absent);
}

/// Scenario 6: persist recovery for a hash — meta(type=HASH,len=2) plus
/// two valid subkeys for the current version, one obsolete subkey under a
/// stale version, and an unrelated string row. Recovery should keep the
/// hash's meta unchanged and register the key cold.
#[test]
fn recovery_keeps_hash_meta_when_rebuild_matches() {
    let store = MemStore::new();
    let meta = MetaValue { object_type: ObjectType::Hash, expire_ms: -1, version: 5, payload: ObjectPayload::Len(2) };
    store.put(ColumnFamily::Meta, &encode_meta_key(0, b"h"), &encode_meta_value(&meta)).unwrap();
    store.put(ColumnFamily::Data, &encode_data_key(0, b"h", 5, b"f1"), b"v1").unwrap();
    store.put(ColumnFamily::Data, &encode_data_key(0, b"h", 5, b"f2"), b"v2").unwrap();
    // obsolete subkey under a stale version, should be ignored.
    store.put(ColumnFamily::Data, &encode_data_key(0, b"h", 4, b"f0"), b"stale").unwrap();
    // unrelated string key, untouched by the hash's recovery.
    store.put(ColumnFamily::Meta, &encode_meta_key(0, b"s"), &encode_meta_value(&MetaValue {
        object_type: ObjectType::String,
        expire_ms: -1,
        version: 0,
        payload: ObjectPayload::None,
    })).unwrap();
    store.put(ColumnFamily::Data, &encode_data_key(0, b"s", 0, b""), b"value").unwrap();

    let store: Arc<dyn ColumnStore> = Arc::new(store);
    let server = server_over(Arc::clone(&store));
    assert_eq!(server.recover().unwrap(), 2);

    // the hash's meta survived unchanged: still there to load from.
    assert_eq!(server.load_key(0, b"h").unwrap(), LoadOutcome::Loaded);
    assert_eq!(server.load_key(0, b"s").unwrap(), LoadOutcome::Loaded);

    // the stale subkey under the obsolete version was never counted.
    let stored = store.get(ColumnFamily::Meta, &encode_meta_key(0, b"h")).unwrap().unwrap();
    assert_eq!(coldtier_engine::codec::decode_meta_value(&stored).unwrap().payload, ObjectPayload::Len(2));
}

/// A key whose on-disk rows don't agree with its meta gets its meta
/// rebuilt to match what's actually present, rather than deleted outright.
#[test]
fn recovery_rebuilds_meta_when_subkey_count_drifted() {
    let store = MemStore::new();
    let meta = MetaValue { object_type: ObjectType::Hash, expire_ms: -1, version: 1, payload: ObjectPayload::Len(1) };
    store.put(ColumnFamily::Meta, &encode_meta_key(0, b"h"), &encode_meta_value(&meta)).unwrap();
    store.put(ColumnFamily::Data, &encode_data_key(0, b"h", 1, b"f1"), b"v1").unwrap();
    store.put(ColumnFamily::Data, &encode_data_key(0, b"h", 1, b"f2"), b"v2").unwrap();

    let store: Arc<dyn ColumnStore> = Arc::new(store);
    let server = server_over(Arc::clone(&store));
    assert_eq!(server.recover().unwrap(), 1);

    let stored = store.get(ColumnFamily::Meta, &encode_meta_key(0, b"h")).unwrap().unwrap();
    assert_eq!(coldtier_engine::codec::decode_meta_value(&stored).unwrap().payload, ObjectPayload::Len(2));
}

/// A meta row with no surviving subkeys at all is dropped during recovery.
#[test]
fn recovery_deletes_meta_with_no_surviving_subkeys() {
    let store = MemStore::new();
    let meta = MetaValue { object_type: ObjectType::Hash, expire_ms: -1, version: 1, payload: ObjectPayload::Len(3) };
    store.put(ColumnFamily::Meta, &encode_meta_key(0, b"h"), &encode_meta_value(&meta)).unwrap();

    let store: Arc<dyn ColumnStore> = Arc::new(store);
    let server = server_over(Arc::clone(&store));
    assert_eq!(server.recover().unwrap(), 0);
    assert_eq!(server.load_key(0, b"h").unwrap(), LoadOutcome::Absent);
}

/// The CLI surface drives the same round trip through command names
/// rather than direct method calls.
#[test]
fn cli_names_drive_the_same_round_trip() {
    let store: Arc<dyn ColumnStore> = Arc::new(MemStore::new());
    let server = server_over(store);
    server.put_hot(0, b"k", b"v".to_vec()).unwrap();

    assert_eq!(handle_command(&server, 0, "SWAP.EVICT", &[b"k".to_vec()]).unwrap(), CliReply::Integer(1));
    assert_eq!(handle_command(&server, 0, "SWAP.LOAD", &[b"k".to_vec()]).unwrap(), CliReply::Integer(1));

    match handle_command(&server, 0, "SWAP.INFO", &[]).unwrap() {
        CliReply::Bulk(text) => assert!(text.starts_with("# ColdFilter")),
        other => panic!("expected Bulk, got {other:?}"),
    }
}
