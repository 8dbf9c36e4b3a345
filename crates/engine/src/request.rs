//! Swap data/request model (§3, §4.5): the immutable pre-swap snapshot
//! (`SwapData`), the intention a request resolves to, and the
//! `SwapCodec` trait that gives each value type its own analyze/encode/
//! decode/merge behavior in place of a C-style vtable of free functions
//! (§9 "Dynamic dispatch over value types").

use coldtier_storage::{ObjectMeta, ObjectPayload, ObjectType};

use crate::error::{Result, SwapError};

/// What a swap request resolves to have the worker thread do (§3, §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intention {
    /// Nothing to do; short-circuit without touching disk.
    Nop,
    /// Load the object (or part of it) from disk into memory.
    In,
    /// Flush the object (or part of it) to disk.
    Out,
    /// Remove the object entirely, in memory and on disk.
    Del,
}

/// Modifier flags narrowing how an [`Intention`] should be carried out
/// (§4.5).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntentionFlags {
    /// IN: also delete the on-disk rows once loaded.
    pub del: bool,
    /// IN: only check presence, don't materialize the value.
    pub mock: bool,
    /// IN: overwrite the in-memory value even if present.
    pub overwrite: bool,
    /// IN: force the merged result hot regardless of size heuristics.
    pub force_hot: bool,
    /// OUT: only flush meta, not data rows.
    pub meta_only: bool,
    /// OUT: this flush is driven by the persistence engine.
    pub persist: bool,
    /// OUT: keep the in-memory value after a successful flush.
    pub keep_data: bool,
    /// IN: abort if satisfying this request would exceed memory.
    pub oom_check: bool,
}

/// The immutable snapshot of a key's pre-swap state, captured at lock
/// time (§3). Mutated only on the worker thread during its swap; freed
/// after the main-thread completion callback runs.
#[derive(Debug, Clone)]
pub struct SwapData {
    /// Database the key belongs to.
    pub db: u32,
    /// The key itself.
    pub key: Vec<u8>,
    /// The current in-memory value, if the key is hot.
    pub hot_value: Option<Vec<u8>>,
    /// Expire time, milliseconds since epoch, if any.
    pub expire_ms: Option<i64>,
    /// The key's object meta, if it has (or had) any on-disk portion.
    pub meta: Option<ObjectMeta>,
    /// Subkeys known to be dirty at snapshot time.
    pub dirty_subkeys: Vec<Vec<u8>>,
    /// Whether an expiration event should be emitted on completion.
    pub propagate_expire: bool,
    /// Whether the in-memory value itself is dirty relative to disk.
    pub set_dirty: bool,
    /// Whether the object meta is dirty relative to disk.
    pub set_dirty_meta: bool,
}

impl SwapData {
    /// Starts a snapshot for `key` in `db` with no disk-backed state yet.
    pub fn new(db: u32, key: Vec<u8>) -> Self {
        SwapData {
            db,
            key,
            hot_value: None,
            expire_ms: None,
            meta: None,
            dirty_subkeys: Vec::new(),
            propagate_expire: false,
            set_dirty: false,
            set_dirty_meta: false,
        }
    }
}

/// A request carried through the batch/worker machinery (§3, §4.5). Owned
/// by the pipeline; freed on completion.
#[derive(Debug, Clone)]
pub struct SwapRequest {
    /// The pre-swap snapshot this request operates over.
    pub data: SwapData,
    /// The resolved intention.
    pub intention: Intention,
    /// Modifier flags for that intention.
    pub flags: IntentionFlags,
}

/// Result of [`SwapCodec::analyze`]: the resolved intention plus flags.
pub type Analysis = (Intention, IntentionFlags);

/// One polymorphic interface implemented per value type, replacing the
/// original's per-type vtable of free functions (§9).
pub trait SwapCodec {
    /// This codec's object type tag.
    fn object_type(&self) -> ObjectType;

    /// Decides NOP/IN/OUT/DEL plus flags for `data` given the command's
    /// requested `intention` and input `flags` (§4.5 step 3).
    fn analyze(&self, data: &SwapData, intention: Intention, flags: IntentionFlags) -> Result<Analysis>;

    /// Encodes the DATA-CF (and, for zset, SCORE-CF) keys this swap needs
    /// to read or write via point lookups.
    fn encode_keys(&self, dbid: u32, data: &SwapData, version: u64) -> Result<Vec<Vec<u8>>>;

    /// When an IN must load every subkey rather than a known point set
    /// (no dirty subkeys to target individually), returns the `[start,
    /// end)` range to scan instead of calling [`SwapCodec::encode_keys`].
    fn range_load(&self, dbid: u32, data: &SwapData, version: u64) -> Option<(Vec<u8>, Vec<u8>)> {
        let _ = (dbid, data, version);
        None
    }

    /// Decodes rows returned by a RIO back into an in-memory fragment,
    /// also reporting which requested subkeys were absent (for the cold
    /// filter's absent cache).
    fn decode_result(&self, rows: &[(Vec<u8>, Vec<u8>)]) -> Result<DecodedFragment>;

    /// Installs a decoded fragment into the hot value, merging with
    /// whatever hot value (if any) was already present.
    fn swap_in(&self, data: &mut SwapData, fragment: DecodedFragment) -> Result<()>;

    /// Produces the rows to persist for an OUT and whether any warm
    /// portion remains in memory afterward.
    fn swap_out(&self, data: &mut SwapData, keep_data: bool) -> Result<SwapOutResult>;

    /// Produces the range(s) to delete for a full DEL.
    fn swap_del(&self, data: &SwapData, version: u64) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Whether the object resulting from a merge should be considered
    /// fully hot (no remaining cold portion).
    fn merged_is_hot(&self, data: &SwapData) -> bool;
}

/// A fragment of object data decoded from disk rows.
#[derive(Debug, Clone, Default)]
pub struct DecodedFragment {
    /// The decoded bytes (whole value for string; re-encoded for others).
    pub value: Vec<u8>,
    /// Subkeys the RIO was asked for but that came back absent.
    pub absent_subkeys: Vec<Vec<u8>>,
}

/// What a [`SwapCodec::swap_out`] produced.
pub struct SwapOutResult {
    /// DATA-CF (and SCORE-CF) rows to write.
    pub rows: Vec<(Vec<u8>, Vec<u8>)>,
    /// Whether any warm portion of the object remains in memory.
    pub remains_warm: bool,
}

fn unsupported(data: &SwapData, op: &str) -> SwapError {
    SwapError::Setup { db: data.db, key: data.key.clone(), reason: format!("{op} not supported for this type") }
}

/// String codec: the object is a single opaque value, stored as one
/// DATA-CF row with an empty subkey and version 0 (§6).
pub struct StringCodec;

impl SwapCodec for StringCodec {
    fn object_type(&self) -> ObjectType {
        ObjectType::String
    }

    fn analyze(&self, data: &SwapData, intention: Intention, flags: IntentionFlags) -> Result<Analysis> {
        match intention {
            Intention::In if data.hot_value.is_some() && !flags.overwrite => Ok((Intention::Nop, flags)),
            other => Ok((other, flags)),
        }
    }

    fn encode_keys(&self, dbid: u32, data: &SwapData, _version: u64) -> Result<Vec<Vec<u8>>> {
        // Strings carry no object meta version; the data key always uses
        // version 0 (§4.3: "For strings, subkey is empty and version is 0").
        Ok(vec![crate::codec::encode_data_key(dbid, &data.key, 0, &[])])
    }

    fn decode_result(&self, rows: &[(Vec<u8>, Vec<u8>)]) -> Result<DecodedFragment> {
        match rows.first() {
            Some((_, v)) => Ok(DecodedFragment { value: v.clone(), absent_subkeys: Vec::new() }),
            None => Ok(DecodedFragment { value: Vec::new(), absent_subkeys: vec![Vec::new()] }),
        }
    }

    fn swap_in(&self, data: &mut SwapData, fragment: DecodedFragment) -> Result<()> {
        data.hot_value = Some(fragment.value);
        Ok(())
    }

    fn swap_out(&self, data: &mut SwapData, keep_data: bool) -> Result<SwapOutResult> {
        let value = data.hot_value.clone().ok_or_else(|| unsupported(data, "swap_out"))?;
        if !keep_data {
            data.hot_value = None;
        }
        Ok(SwapOutResult { rows: vec![(Vec::new(), value)], remains_warm: keep_data })
    }

    fn swap_del(&self, data: &SwapData, _version: u64) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let start = crate::codec::data_range_start(data.db, &data.key, 0);
        let end = crate::codec::data_range_end(data.db, &data.key, 0);
        Ok(vec![(start, end)])
    }

    fn merged_is_hot(&self, _data: &SwapData) -> bool {
        true
    }
}

/// Hash codec: the object is a field→value map, each field stored as its
/// own DATA-CF row keyed by `subkey = field` (§6).
pub struct HashCodec;

impl SwapCodec for HashCodec {
    fn object_type(&self) -> ObjectType {
        ObjectType::Hash
    }

    fn analyze(&self, data: &SwapData, intention: Intention, flags: IntentionFlags) -> Result<Analysis> {
        match intention {
            Intention::In if data.meta.is_none() => Ok((Intention::Nop, flags)),
            other => Ok((other, flags)),
        }
    }

    fn encode_keys(&self, dbid: u32, data: &SwapData, version: u64) -> Result<Vec<Vec<u8>>> {
        Ok(data
            .dirty_subkeys
            .iter()
            .map(|f| crate::codec::encode_data_key(dbid, &data.key, version, f))
            .collect())
    }

    fn range_load(&self, dbid: u32, data: &SwapData, version: u64) -> Option<(Vec<u8>, Vec<u8>)> {
        if data.dirty_subkeys.is_empty() {
            let start = crate::codec::data_range_start(dbid, &data.key, version);
            let end = crate::codec::data_range_end(dbid, &data.key, version);
            Some((start, end))
        } else {
            None
        }
    }

    fn decode_result(&self, rows: &[(Vec<u8>, Vec<u8>)]) -> Result<DecodedFragment> {
        // Re-encode as a length-prefixed field/value stream; callers that
        // need structured field access decode it via the same framing.
        let mut value = Vec::new();
        for (k, v) in rows {
            let (_, _, _, subkey) = crate::codec::decode_data_key(k)
                .ok_or_else(|| SwapError::Data { db: 0, key: k.clone(), reason: "malformed data key".into() })?;
            value.extend_from_slice(&(subkey.len() as u32).to_le_bytes());
            value.extend_from_slice(subkey);
            value.extend_from_slice(&(v.len() as u32).to_le_bytes());
            value.extend_from_slice(v);
        }
        Ok(DecodedFragment { value, absent_subkeys: Vec::new() })
    }

    fn swap_in(&self, data: &mut SwapData, fragment: DecodedFragment) -> Result<()> {
        let mut merged = data.hot_value.take().unwrap_or_default();
        merged.extend_from_slice(&fragment.value);
        data.hot_value = Some(merged);
        Ok(())
    }

    fn swap_out(&self, data: &mut SwapData, keep_data: bool) -> Result<SwapOutResult> {
        let fields = parse_field_stream(data.hot_value.as_deref().unwrap_or(&[]));
        let rows = fields;
        if !keep_data {
            data.hot_value = None;
        }
        Ok(SwapOutResult { rows, remains_warm: keep_data })
    }

    fn swap_del(&self, data: &SwapData, version: u64) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let start = crate::codec::data_range_start(data.db, &data.key, version);
        let end = crate::codec::data_range_end(data.db, &data.key, version);
        Ok(vec![(start, end)])
    }

    fn merged_is_hot(&self, data: &SwapData) -> bool {
        matches!(&data.meta, Some(ObjectMeta { payload: ObjectPayload::Len(_), .. }) | None)
    }
}

/// Set codec: the object is a member set, each member stored as its own
/// DATA-CF row keyed by `subkey = member` with an empty value (§6).
pub struct SetCodec;

impl SwapCodec for SetCodec {
    fn object_type(&self) -> ObjectType {
        ObjectType::Set
    }

    fn analyze(&self, data: &SwapData, intention: Intention, flags: IntentionFlags) -> Result<Analysis> {
        match intention {
            Intention::In if data.meta.is_none() => Ok((Intention::Nop, flags)),
            other => Ok((other, flags)),
        }
    }

    fn encode_keys(&self, dbid: u32, data: &SwapData, version: u64) -> Result<Vec<Vec<u8>>> {
        Ok(data
            .dirty_subkeys
            .iter()
            .map(|m| crate::codec::encode_data_key(dbid, &data.key, version, m))
            .collect())
    }

    fn range_load(&self, dbid: u32, data: &SwapData, version: u64) -> Option<(Vec<u8>, Vec<u8>)> {
        if data.dirty_subkeys.is_empty() {
            let start = crate::codec::data_range_start(dbid, &data.key, version);
            let end = crate::codec::data_range_end(dbid, &data.key, version);
            Some((start, end))
        } else {
            None
        }
    }

    fn decode_result(&self, rows: &[(Vec<u8>, Vec<u8>)]) -> Result<DecodedFragment> {
        let mut value = Vec::new();
        for (k, _) in rows {
            let (_, _, _, member) = crate::codec::decode_data_key(k)
                .ok_or_else(|| SwapError::Data { db: 0, key: k.clone(), reason: "malformed data key".into() })?;
            value.extend_from_slice(&(member.len() as u32).to_le_bytes());
            value.extend_from_slice(member);
            value.extend_from_slice(&0u32.to_le_bytes());
        }
        Ok(DecodedFragment { value, absent_subkeys: Vec::new() })
    }

    fn swap_in(&self, data: &mut SwapData, fragment: DecodedFragment) -> Result<()> {
        let mut merged = data.hot_value.take().unwrap_or_default();
        merged.extend_from_slice(&fragment.value);
        data.hot_value = Some(merged);
        Ok(())
    }

    fn swap_out(&self, data: &mut SwapData, keep_data: bool) -> Result<SwapOutResult> {
        let members = parse_field_stream(data.hot_value.as_deref().unwrap_or(&[]));
        let rows = members.into_iter().map(|(m, _)| (m, Vec::new())).collect();
        if !keep_data {
            data.hot_value = None;
        }
        Ok(SwapOutResult { rows, remains_warm: keep_data })
    }

    fn swap_del(&self, data: &SwapData, version: u64) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let start = crate::codec::data_range_start(data.db, &data.key, version);
        let end = crate::codec::data_range_end(data.db, &data.key, version);
        Ok(vec![(start, end)])
    }

    fn merged_is_hot(&self, data: &SwapData) -> bool {
        matches!(&data.meta, Some(ObjectMeta { payload: ObjectPayload::Len(_), .. }) | None)
    }
}

/// ZSet codec: the object is a member→score map. Each member is stored as
/// a SCORE-CF row whose subkey is `score_bigendian (8) || member`, which
/// is the same byte layout `encode_score_key` produces, so an ordinary
/// data-key prefix scan over that column family already returns rows in
/// score order (§6).
///
/// Point lookups of individual members (as opposed to a full range load)
/// would need the member's current score to rebuild its subkey, which
/// this codec doesn't track; [`ZSetCodec::encode_keys`] always loads the
/// full range, same as [`HashCodec`] and [`SetCodec`] do when no dirty
/// subkeys are known.
pub struct ZSetCodec;

impl SwapCodec for ZSetCodec {
    fn object_type(&self) -> ObjectType {
        ObjectType::ZSet
    }

    fn analyze(&self, data: &SwapData, intention: Intention, flags: IntentionFlags) -> Result<Analysis> {
        match intention {
            Intention::In if data.meta.is_none() => Ok((Intention::Nop, flags)),
            other => Ok((other, flags)),
        }
    }

    fn encode_keys(&self, _dbid: u32, _data: &SwapData, _version: u64) -> Result<Vec<Vec<u8>>> {
        Ok(Vec::new())
    }

    fn range_load(&self, dbid: u32, data: &SwapData, version: u64) -> Option<(Vec<u8>, Vec<u8>)> {
        let start = crate::codec::data_range_start(dbid, &data.key, version);
        let end = crate::codec::data_range_end(dbid, &data.key, version);
        Some((start, end))
    }

    fn decode_result(&self, rows: &[(Vec<u8>, Vec<u8>)]) -> Result<DecodedFragment> {
        let mut value = Vec::new();
        for (k, _) in rows {
            let (_, _, _, subkey) = crate::codec::decode_data_key(k)
                .ok_or_else(|| SwapError::Data { db: 0, key: k.clone(), reason: "malformed score key".into() })?;
            if subkey.len() < 8 {
                return Err(SwapError::Data { db: 0, key: k.clone(), reason: "score subkey too short".into() });
            }
            let (score_bytes, member) = subkey.split_at(8);
            value.extend_from_slice(&(member.len() as u32).to_le_bytes());
            value.extend_from_slice(member);
            value.extend_from_slice(&8u32.to_le_bytes());
            value.extend_from_slice(score_bytes);
        }
        Ok(DecodedFragment { value, absent_subkeys: Vec::new() })
    }

    fn swap_in(&self, data: &mut SwapData, fragment: DecodedFragment) -> Result<()> {
        let mut merged = data.hot_value.take().unwrap_or_default();
        merged.extend_from_slice(&fragment.value);
        data.hot_value = Some(merged);
        Ok(())
    }

    fn swap_out(&self, data: &mut SwapData, keep_data: bool) -> Result<SwapOutResult> {
        let members = parse_field_stream(data.hot_value.as_deref().unwrap_or(&[]));
        let mut rows = Vec::with_capacity(members.len());
        for (member, score_bytes) in members {
            if score_bytes.len() != 8 {
                return Err(unsupported(data, "swap_out (malformed score)"));
            }
            let mut subkey = score_bytes;
            subkey.extend_from_slice(&member);
            rows.push((subkey, member));
        }
        if !keep_data {
            data.hot_value = None;
        }
        Ok(SwapOutResult { rows, remains_warm: keep_data })
    }

    fn swap_del(&self, data: &SwapData, version: u64) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let start = crate::codec::data_range_start(data.db, &data.key, version);
        let end = crate::codec::data_range_end(data.db, &data.key, version);
        Ok(vec![(start, end)])
    }

    fn merged_is_hot(&self, data: &SwapData) -> bool {
        matches!(&data.meta, Some(ObjectMeta { payload: ObjectPayload::Len(_), .. }) | None)
    }
}

fn parse_field_stream(bytes: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut out = Vec::new();
    let mut off = 0;
    while off + 4 <= bytes.len() {
        let flen = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap()) as usize;
        off += 4;
        if off + flen > bytes.len() {
            break;
        }
        let field = bytes[off..off + flen].to_vec();
        off += flen;
        if off + 4 > bytes.len() {
            break;
        }
        let vlen = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap()) as usize;
        off += 4;
        if off + vlen > bytes.len() {
            break;
        }
        let value = bytes[off..off + vlen].to_vec();
        off += vlen;
        out.push((field, value));
    }
    out
}

/// Placeholder codec for value types with no [MODULE] in the
/// specification's scope: the match over `ValueKind` stays total, but
/// every operation reports `Unsupported`. Follow-on work, tracked in
/// DESIGN.md.
pub struct UnsupportedCodec(pub ObjectType);

impl SwapCodec for UnsupportedCodec {
    fn object_type(&self) -> ObjectType {
        self.0
    }

    fn analyze(&self, data: &SwapData, _intention: Intention, _flags: IntentionFlags) -> Result<Analysis> {
        Err(unsupported(data, "analyze"))
    }

    fn encode_keys(&self, _dbid: u32, data: &SwapData, _version: u64) -> Result<Vec<Vec<u8>>> {
        Err(unsupported(data, "encode_keys"))
    }

    fn decode_result(&self, _rows: &[(Vec<u8>, Vec<u8>)]) -> Result<DecodedFragment> {
        Err(SwapError::Setup { db: 0, key: Vec::new(), reason: "decode_result not supported".into() })
    }

    fn swap_in(&self, data: &mut SwapData, _fragment: DecodedFragment) -> Result<()> {
        Err(unsupported(data, "swap_in"))
    }

    fn swap_out(&self, data: &mut SwapData, _keep_data: bool) -> Result<SwapOutResult> {
        Err(unsupported(data, "swap_out"))
    }

    fn swap_del(&self, data: &SwapData, _version: u64) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Err(unsupported(data, "swap_del"))
    }

    fn merged_is_hot(&self, _data: &SwapData) -> bool {
        true
    }
}

/// Resolves the [`SwapCodec`] for an object type.
pub fn codec_for(object_type: ObjectType) -> Box<dyn SwapCodec + Send + Sync> {
    match object_type {
        ObjectType::String => Box::new(StringCodec),
        ObjectType::Hash => Box::new(HashCodec),
        ObjectType::Set => Box::new(SetCodec),
        ObjectType::ZSet => Box::new(ZSetCodec),
        other => Box::new(UnsupportedCodec(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_swap_out_then_in_round_trips() {
        let codec = StringCodec;
        let mut data = SwapData::new(0, b"k".to_vec());
        data.hot_value = Some(b"value".to_vec());
        let out = codec.swap_out(&mut data, false).unwrap();
        assert!(data.hot_value.is_none());
        let fragment = codec.decode_result(&[(Vec::new(), out.rows[0].1.clone())]).unwrap();
        codec.swap_in(&mut data, fragment).unwrap();
        assert_eq!(data.hot_value, Some(b"value".to_vec()));
    }

    #[test]
    fn string_analyze_nop_when_already_hot() {
        let codec = StringCodec;
        let mut data = SwapData::new(0, b"k".to_vec());
        data.hot_value = Some(b"v".to_vec());
        let (intention, _) = codec.analyze(&data, Intention::In, IntentionFlags::default()).unwrap();
        assert_eq!(intention, Intention::Nop);

        data.hot_value = None;
        let (intention, _) = codec.analyze(&data, Intention::In, IntentionFlags::default()).unwrap();
        assert_eq!(intention, Intention::In);
    }

    #[test]
    fn hash_swap_out_then_in_round_trips_all_fields() {
        let codec = HashCodec;
        let mut data = SwapData::new(0, b"h".to_vec());
        let mut stream = Vec::new();
        for (f, v) in [(b"f1".as_slice(), b"v1".as_slice()), (b"f2", b"v2")] {
            stream.extend_from_slice(&(f.len() as u32).to_le_bytes());
            stream.extend_from_slice(f);
            stream.extend_from_slice(&(v.len() as u32).to_le_bytes());
            stream.extend_from_slice(v);
        }
        data.hot_value = Some(stream);

        let out = codec.swap_out(&mut data, false).unwrap();
        assert_eq!(out.rows.len(), 2);
        assert!(data.hot_value.is_none());

        let keyed_rows: Vec<(Vec<u8>, Vec<u8>)> = out
            .rows
            .iter()
            .map(|(f, v)| (crate::codec::encode_data_key(0, &data.key, 1, f), v.clone()))
            .collect();
        let fragment = codec.decode_result(&keyed_rows).unwrap();
        codec.swap_in(&mut data, fragment).unwrap();
        let roundtripped = parse_field_stream(data.hot_value.as_deref().unwrap());
        assert_eq!(roundtripped.len(), 2);
    }

    #[test]
    fn set_swap_out_then_in_round_trips_all_members() {
        let codec = SetCodec;
        let mut data = SwapData::new(0, b"s".to_vec());
        let mut stream = Vec::new();
        for m in [b"m1".as_slice(), b"m2"] {
            stream.extend_from_slice(&(m.len() as u32).to_le_bytes());
            stream.extend_from_slice(m);
            stream.extend_from_slice(&0u32.to_le_bytes());
        }
        data.hot_value = Some(stream);

        let out = codec.swap_out(&mut data, false).unwrap();
        assert_eq!(out.rows.len(), 2);
        assert!(data.hot_value.is_none());

        let keyed_rows: Vec<(Vec<u8>, Vec<u8>)> = out
            .rows
            .iter()
            .map(|(m, v)| (crate::codec::encode_data_key(0, &data.key, 1, m), v.clone()))
            .collect();
        let fragment = codec.decode_result(&keyed_rows).unwrap();
        codec.swap_in(&mut data, fragment).unwrap();
        let roundtripped = parse_field_stream(data.hot_value.as_deref().unwrap());
        let members: Vec<Vec<u8>> = roundtripped.into_iter().map(|(m, _)| m).collect();
        assert!(members.contains(&b"m1".to_vec()));
        assert!(members.contains(&b"m2".to_vec()));
    }

    #[test]
    fn zset_swap_out_then_in_round_trips_scores() {
        let codec = ZSetCodec;
        let mut data = SwapData::new(0, b"z".to_vec());
        let mut stream = Vec::new();
        for (m, score) in [(b"alice".as_slice(), 1.5f64), (b"bob".as_slice(), -2.0f64)] {
            stream.extend_from_slice(&(m.len() as u32).to_le_bytes());
            stream.extend_from_slice(m);
            let score_bytes = crate::codec::encode_score(score);
            stream.extend_from_slice(&8u32.to_le_bytes());
            stream.extend_from_slice(&score_bytes);
        }
        data.hot_value = Some(stream);

        let out = codec.swap_out(&mut data, false).unwrap();
        assert_eq!(out.rows.len(), 2);
        assert!(data.hot_value.is_none());

        let keyed_rows: Vec<(Vec<u8>, Vec<u8>)> = out
            .rows
            .iter()
            .map(|(subkey, v)| (crate::codec::encode_data_key(0, &data.key, 1, subkey), v.clone()))
            .collect();
        let fragment = codec.decode_result(&keyed_rows).unwrap();
        codec.swap_in(&mut data, fragment).unwrap();
        let roundtripped = parse_field_stream(data.hot_value.as_deref().unwrap());
        let by_member: std::collections::HashMap<Vec<u8>, f64> = roundtripped
            .into_iter()
            .map(|(m, s)| (m, crate::codec::decode_score(s.try_into().unwrap())))
            .collect();
        assert_eq!(by_member[b"alice".as_slice()], 1.5);
        assert_eq!(by_member[b"bob".as_slice()], -2.0);
    }

    #[test]
    fn unsupported_codec_reports_setup_error() {
        let codec = codec_for(ObjectType::List);
        let data = SwapData::new(0, b"l".to_vec());
        assert!(codec.analyze(&data, Intention::In, IntentionFlags::default()).is_err());
    }
}
