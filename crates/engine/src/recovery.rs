//! Startup meta-scan recovery (§4.7): scans the META column family,
//! rebuilds each key's meta from its DATA/SCORE rows, and reconciles the
//! two before the cold filter and version counter come up.

use std::collections::HashMap;

use coldtier_durability::{ColumnFamily, ColumnStore};
use coldtier_storage::{ObjectMeta, ObjectPayload, ObjectType};

use crate::codec::{decode_data_key, decode_meta_key, decode_meta_value, encode_meta_key, encode_meta_value, MetaValue};
use crate::error::Result;

/// One key recovered from disk, with its (possibly rebuilt) meta.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveredKey {
    /// Database the key belongs to.
    pub db: u32,
    /// The key itself.
    pub key: Vec<u8>,
    /// Expire time, milliseconds since epoch, or -1 for no expire.
    pub expire_ms: i64,
    /// The reconciled object meta.
    pub meta: ObjectMeta,
    /// Whether the stored meta had to be rewritten to match what the
    /// DATA/SCORE rows actually contain.
    pub rebuilt: bool,
}

/// Outcome of a full recovery pass.
#[derive(Debug, Default)]
pub struct RecoveryReport {
    /// Keys whose meta survived (unchanged or rebuilt); each should be
    /// registered as cold in its db's cold filter.
    pub kept: Vec<RecoveredKey>,
    /// Keys whose meta failed reconciliation and was deleted outright.
    pub deleted: Vec<(u32, Vec<u8>)>,
    /// The version counter should resume from this value
    /// (`max observed version + 1`).
    pub next_version: u64,
}

fn rebuilt_payload(object_type: ObjectType, subkey_count: u64) -> ObjectPayload {
    match object_type {
        ObjectType::Hash | ObjectType::Set | ObjectType::ZSet => ObjectPayload::Len(subkey_count),
        ObjectType::String | ObjectType::List | ObjectType::Stream => ObjectPayload::None,
    }
}

/// Runs the recovery pass described in §4.7's reconciliation table,
/// writing back any rebuilt meta and deleting any meta that didn't
/// survive, then returning a report the caller uses to prime its cold
/// filters and version counter.
pub fn recover(store: &dyn ColumnStore) -> Result<RecoveryReport> {
    let meta_rows = store.scan_all(ColumnFamily::Meta)?;
    let mut data_rows = store.scan_all(ColumnFamily::Data)?;
    data_rows.extend(store.scan_all(ColumnFamily::Score)?);

    // (db, key) -> subkeys present at each observed version.
    let mut by_key: HashMap<(u32, Vec<u8>), HashMap<u64, u64>> = HashMap::new();
    for (k, _) in &data_rows {
        if let Some((db, key, version, _subkey)) = decode_data_key(k) {
            *by_key.entry((db, key.to_vec())).or_default().entry(version).or_insert(0) += 1;
        }
    }

    let mut report = RecoveryReport::default();

    for (mk, mv) in &meta_rows {
        let Some((db, key)) = decode_meta_key(mk) else { continue };
        let Some(meta_value) = decode_meta_value(mv) else {
            tracing::error!(db, key = %String::from_utf8_lossy(key), "recovery: dropping unreadable meta row");
            report.deleted.push((db, key.to_vec()));
            store.delete(ColumnFamily::Meta, mk)?;
            continue;
        };
        report.next_version = report.next_version.max(meta_value.version + 1);

        // Strings carry no object-meta version on their DATA row: it's
        // always written under version 0, regardless of what meta.version
        // holds (§4.3).
        let row_version = match meta_value.object_type {
            ObjectType::String => 0,
            _ => meta_value.version,
        };
        let observed = by_key.get(&(db, key.to_vec())).and_then(|versions| versions.get(&row_version)).copied().unwrap_or(0);

        let delete = match meta_value.object_type {
            ObjectType::String => observed != 1,
            _ => observed == 0,
        };

        if delete {
            tracing::error!(
                db,
                key = %String::from_utf8_lossy(key),
                observed,
                "recovery: no surviving subkeys for stored meta, dropping"
            );
            report.deleted.push((db, key.to_vec()));
            store.delete(ColumnFamily::Meta, mk)?;
            continue;
        }

        let rebuilt = rebuilt_payload(meta_value.object_type, observed);
        let changed = rebuilt != meta_value.payload;
        let final_meta = MetaValue {
            object_type: meta_value.object_type,
            expire_ms: meta_value.expire_ms,
            version: meta_value.version,
            payload: if changed { rebuilt } else { meta_value.payload.clone() },
        };
        if changed {
            store.put(ColumnFamily::Meta, &encode_meta_key(db, key), &encode_meta_value(&final_meta))?;
        }

        report.kept.push(RecoveredKey {
            db,
            key: key.to_vec(),
            expire_ms: final_meta.expire_ms,
            meta: ObjectMeta { object_type: final_meta.object_type, version: final_meta.version, payload: final_meta.payload },
            rebuilt: changed,
        });
    }

    if report.next_version == 0 {
        report.next_version = 1;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_data_key;
    use coldtier_durability::MemStore;

    fn put_meta(store: &MemStore, db: u32, key: &[u8], v: &MetaValue) {
        store.put(ColumnFamily::Meta, &encode_meta_key(db, key), &encode_meta_value(v)).unwrap();
    }

    #[test]
    fn hash_with_matching_subkeys_is_kept_unchanged() {
        let store = MemStore::new();
        let meta = MetaValue { object_type: ObjectType::Hash, expire_ms: -1, version: 3, payload: ObjectPayload::Len(2) };
        put_meta(&store, 0, b"h", &meta);
        store.put(ColumnFamily::Data, &encode_data_key(0, b"h", 3, b"f1"), b"v1").unwrap();
        store.put(ColumnFamily::Data, &encode_data_key(0, b"h", 3, b"f2"), b"v2").unwrap();

        let report = recover(&store).unwrap();
        assert_eq!(report.kept.len(), 1);
        assert!(!report.kept[0].rebuilt);
        assert_eq!(report.next_version, 4);
    }

    #[test]
    fn hash_with_extra_subkey_is_rebuilt() {
        let store = MemStore::new();
        let meta = MetaValue { object_type: ObjectType::Hash, expire_ms: -1, version: 1, payload: ObjectPayload::Len(1) };
        put_meta(&store, 0, b"h", &meta);
        store.put(ColumnFamily::Data, &encode_data_key(0, b"h", 1, b"f1"), b"v1").unwrap();
        store.put(ColumnFamily::Data, &encode_data_key(0, b"h", 1, b"f2"), b"v2").unwrap();

        let report = recover(&store).unwrap();
        assert_eq!(report.kept.len(), 1);
        assert!(report.kept[0].rebuilt);
        assert_eq!(report.kept[0].meta.payload, ObjectPayload::Len(2));
    }

    #[test]
    fn hash_with_no_subkeys_is_deleted() {
        let store = MemStore::new();
        let meta = MetaValue { object_type: ObjectType::Hash, expire_ms: -1, version: 1, payload: ObjectPayload::Len(1) };
        put_meta(&store, 0, b"h", &meta);

        let report = recover(&store).unwrap();
        assert!(report.kept.is_empty());
        assert_eq!(report.deleted, vec![(0, b"h".to_vec())]);
        assert!(store.get(ColumnFamily::Meta, &encode_meta_key(0, b"h")).unwrap().is_none());
    }

    #[test]
    fn string_with_exactly_one_row_is_kept() {
        let store = MemStore::new();
        let meta = MetaValue { object_type: ObjectType::String, expire_ms: -1, version: 0, payload: ObjectPayload::None };
        put_meta(&store, 0, b"s", &meta);
        store.put(ColumnFamily::Data, &encode_data_key(0, b"s", 0, b""), b"value").unwrap();

        let report = recover(&store).unwrap();
        assert_eq!(report.kept.len(), 1);
        assert!(!report.kept[0].rebuilt);
    }

    #[test]
    fn string_with_stale_rows_only_is_deleted() {
        let store = MemStore::new();
        let meta = MetaValue { object_type: ObjectType::String, expire_ms: -1, version: 0, payload: ObjectPayload::None };
        put_meta(&store, 0, b"s", &meta);
        // a leftover row under a different version than meta carries
        store.put(ColumnFamily::Data, &encode_data_key(0, b"s", 7, b""), b"stale").unwrap();

        let report = recover(&store).unwrap();
        assert!(report.kept.is_empty());
        assert_eq!(report.deleted, vec![(0, b"s".to_vec())]);
    }

    #[test]
    fn next_version_tracks_the_highest_observed_version() {
        let store = MemStore::new();
        put_meta(&store, 0, b"a", &MetaValue { object_type: ObjectType::String, expire_ms: -1, version: 5, payload: ObjectPayload::None });
        store.put(ColumnFamily::Data, &encode_data_key(0, b"a", 5, b""), b"v").unwrap();
        put_meta(&store, 0, b"b", &MetaValue { object_type: ObjectType::String, expire_ms: -1, version: 9, payload: ObjectPayload::None });
        store.put(ColumnFamily::Data, &encode_data_key(0, b"b", 9, b""), b"v").unwrap();

        let report = recover(&store).unwrap();
        assert_eq!(report.next_version, 10);
    }
}
