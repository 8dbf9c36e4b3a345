//! On-disk key/value byte layouts (§6): meta keys/values, data keys,
//! score keys, range keys, and the meta-scan cursor encoding.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use coldtier_storage::{ObjectPayload, ObjectType};

/// One-byte type tag used in a meta value (§6: "type_abbrev ... one of K
/// L H S Z M X").
pub fn type_abbrev(t: ObjectType) -> u8 {
    match t {
        ObjectType::String => b'K',
        ObjectType::List => b'L',
        ObjectType::Hash => b'H',
        ObjectType::Set => b'S',
        ObjectType::ZSet => b'Z',
        ObjectType::Stream => b'X',
    }
}

/// Inverse of [`type_abbrev`].
pub fn type_from_abbrev(b: u8) -> Option<ObjectType> {
    match b {
        b'K' => Some(ObjectType::String),
        b'L' => Some(ObjectType::List),
        b'H' => Some(ObjectType::Hash),
        b'S' => Some(ObjectType::Set),
        b'Z' => Some(ObjectType::ZSet),
        b'X' => Some(ObjectType::Stream),
        _ => None,
    }
}

/// Encodes the META-CF key: `dbid (4 bytes native) || key_bytes`.
///
/// "Native" byte order for the db id matches the teacher's wire codecs,
/// which use little-endian throughout; this is an implementation detail
/// invisible to callers since both sides of every comparison go through
/// this module.
pub fn encode_meta_key(dbid: u32, key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + key.len());
    out.extend_from_slice(&dbid.to_le_bytes());
    out.extend_from_slice(key);
    out
}

/// Decodes a META-CF key produced by [`encode_meta_key`].
pub fn decode_meta_key(bytes: &[u8]) -> Option<(u32, &[u8])> {
    if bytes.len() < 4 {
        return None;
    }
    let dbid = LittleEndian::read_u32(&bytes[..4]);
    Some((dbid, &bytes[4..]))
}

/// A decoded META-CF value.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaValue {
    /// The object's value type.
    pub object_type: ObjectType,
    /// Expire time, milliseconds since epoch, or -1 for no expire.
    pub expire_ms: i64,
    /// The object's current version.
    pub version: u64,
    /// Type-specific payload appended after the fixed header.
    pub payload: ObjectPayload,
}

/// Encodes a META-CF value: `type_abbrev (1) || expire_i64 (8) ||
/// version_u64 (8) || optional extend_bytes`.
pub fn encode_meta_value(v: &MetaValue) -> Vec<u8> {
    let mut out = Vec::with_capacity(17);
    out.push(type_abbrev(v.object_type));
    out.extend_from_slice(&v.expire_ms.to_le_bytes());
    out.extend_from_slice(&v.version.to_le_bytes());
    match &v.payload {
        ObjectPayload::None => {}
        ObjectPayload::Len(n) => out.extend_from_slice(&n.to_le_bytes()),
        ObjectPayload::Segments(segs) => {
            out.extend_from_slice(&(segs.len() as u64).to_le_bytes());
            for s in segs {
                out.extend_from_slice(&s.to_le_bytes());
            }
        }
    }
    out
}

/// Decodes a META-CF value produced by [`encode_meta_value`].
pub fn decode_meta_value(bytes: &[u8]) -> Option<MetaValue> {
    if bytes.len() < 17 {
        return None;
    }
    let object_type = type_from_abbrev(bytes[0])?;
    let expire_ms = LittleEndian::read_i64(&bytes[1..9]);
    let version = LittleEndian::read_u64(&bytes[9..17]);
    let extend = &bytes[17..];
    let payload = match object_type {
        ObjectType::Hash | ObjectType::Set | ObjectType::ZSet => {
            if extend.len() < 8 {
                ObjectPayload::Len(0)
            } else {
                ObjectPayload::Len(LittleEndian::read_u64(&extend[..8]))
            }
        }
        ObjectType::List => {
            if extend.len() < 8 {
                ObjectPayload::Segments(Vec::new())
            } else {
                let n = LittleEndian::read_u64(&extend[..8]) as usize;
                let mut segs = Vec::with_capacity(n);
                let mut off = 8;
                for _ in 0..n {
                    if off + 8 > extend.len() {
                        break;
                    }
                    segs.push(LittleEndian::read_u64(&extend[off..off + 8]));
                    off += 8;
                }
                ObjectPayload::Segments(segs)
            }
        }
        ObjectType::String | ObjectType::Stream => ObjectPayload::None,
    };
    Some(MetaValue { object_type, expire_ms, version, payload })
}

/// Encodes the DATA-CF key: `dbid (4) || key_len (4) || key_bytes ||
/// version_u64 || subkey_bytes`. For strings, `subkey` is empty and
/// `version` is 0 (§6).
pub fn encode_data_key(dbid: u32, key: &[u8], version: u64, subkey: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + key.len() + subkey.len());
    out.extend_from_slice(&dbid.to_le_bytes());
    out.extend_from_slice(&(key.len() as u32).to_le_bytes());
    out.extend_from_slice(key);
    out.extend_from_slice(&version.to_le_bytes());
    out.extend_from_slice(subkey);
    out
}

/// Decodes a DATA-CF key produced by [`encode_data_key`].
pub fn decode_data_key(bytes: &[u8]) -> Option<(u32, &[u8], u64, &[u8])> {
    if bytes.len() < 8 {
        return None;
    }
    let dbid = LittleEndian::read_u32(&bytes[..4]);
    let key_len = LittleEndian::read_u32(&bytes[4..8]) as usize;
    let key_start: usize = 8;
    let key_end = key_start.checked_add(key_len)?;
    if bytes.len() < key_end + 8 {
        return None;
    }
    let key = &bytes[key_start..key_end];
    let version = LittleEndian::read_u64(&bytes[key_end..key_end + 8]);
    let subkey = &bytes[key_end + 8..];
    Some((dbid, key, version, subkey))
}

/// The data-key prefix shared by every subkey of `(dbid, key, version)`
/// (`rocksEncodeDataRangeStart`, §6).
pub fn data_range_start(dbid: u32, key: &[u8], version: u64) -> Vec<u8> {
    encode_data_key(dbid, key, version, &[])
}

/// The lexicographic successor of [`data_range_start`], i.e. the exclusive
/// end of the range covering every subkey of `(dbid, key, version)`
/// (`rocksEncodeDataRangeEnd`, §6).
pub fn data_range_end(dbid: u32, key: &[u8], version: u64) -> Vec<u8> {
    let mut end = data_range_start(dbid, key, version);
    increment_bytes(&mut end);
    end
}

/// Appends a single `0x00` byte to form the successor of `prefix` when
/// `prefix` can't be incremented in place without growing (used whenever a
/// byte string of all-`0xff` would otherwise need to overflow).
fn increment_bytes(buf: &mut Vec<u8>) {
    for i in (0..buf.len()).rev() {
        if buf[i] != 0xff {
            buf[i] += 1;
            buf.truncate(i + 1);
            return;
        }
    }
    buf.push(0x00);
}

/// Re-encodes an `f64` so that byte-wise big-endian ordering matches
/// numeric ordering, including across the sign boundary (§6).
pub fn encode_score(score: f64) -> [u8; 8] {
    let bits = score.to_bits();
    let flipped = if score.is_sign_negative() { !bits } else { bits | (1u64 << 63) };
    let mut out = [0u8; 8];
    BigEndian::write_u64(&mut out, flipped);
    out
}

/// Inverse of [`encode_score`].
pub fn decode_score(bytes: [u8; 8]) -> f64 {
    let flipped = BigEndian::read_u64(&bytes);
    let bits = if flipped & (1u64 << 63) != 0 { flipped & !(1u64 << 63) } else { !flipped };
    f64::from_bits(bits)
}

/// Encodes a SCORE-CF key: `dbid (4) || key_len (4) || key_bytes ||
/// version_u64 || double_bigendian || member_bytes` (§6).
pub fn encode_score_key(dbid: u32, key: &[u8], version: u64, score: f64, member: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + key.len() + 8 + member.len());
    out.extend_from_slice(&dbid.to_le_bytes());
    out.extend_from_slice(&(key.len() as u32).to_le_bytes());
    out.extend_from_slice(key);
    out.extend_from_slice(&version.to_le_bytes());
    out.extend_from_slice(&encode_score(score));
    out.extend_from_slice(member);
    out
}

/// `(dbid, key, version, score, member)`, as returned by [`decode_score_key`].
pub type ScoreKeyParts<'a> = (u32, &'a [u8], u64, f64, &'a [u8]);

/// Decodes a SCORE-CF key produced by [`encode_score_key`].
pub fn decode_score_key(bytes: &[u8]) -> Option<ScoreKeyParts<'_>> {
    if bytes.len() < 8 {
        return None;
    }
    let dbid = LittleEndian::read_u32(&bytes[..4]);
    let key_len = LittleEndian::read_u32(&bytes[4..8]) as usize;
    let key_start: usize = 8;
    let key_end = key_start.checked_add(key_len)?;
    if bytes.len() < key_end + 16 {
        return None;
    }
    let key = &bytes[key_start..key_end];
    let version = LittleEndian::read_u64(&bytes[key_end..key_end + 8]);
    let mut score_bytes = [0u8; 8];
    score_bytes.copy_from_slice(&bytes[key_end + 8..key_end + 16]);
    let score = decode_score(score_bytes);
    let member = &bytes[key_end + 16..];
    Some((dbid, key, version, score, member))
}

/// Bit layout of a meta-scan cursor: bit 0 is the hot/cold flag, the
/// remaining bits split into `(session_id, session_seq)` with a
/// configurable `session_bits` (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanCursor {
    /// Whether the cursor is currently scanning the hot (in-memory)
    /// portion of the keyspace.
    pub hot: bool,
    /// Identifier of the scan session this cursor belongs to.
    pub session_id: u32,
    /// Sequence number within that session.
    pub session_seq: u32,
}

impl ScanCursor {
    /// Packs this cursor into its `u64` wire form given `session_bits`
    /// bits reserved for the session id.
    pub fn encode(&self, session_bits: u8) -> u64 {
        let flag = self.hot as u64;
        let session_id = (self.session_id as u64) & ((1u64 << session_bits) - 1);
        let session_seq = self.session_seq as u64;
        flag | (session_id << 1) | (session_seq << (1 + session_bits))
    }

    /// Unpacks a cursor previously produced by [`ScanCursor::encode`].
    pub fn decode(cursor: u64, session_bits: u8) -> Self {
        let hot = cursor & 1 != 0;
        let session_id = ((cursor >> 1) & ((1u64 << session_bits) - 1)) as u32;
        let session_seq = (cursor >> (1 + session_bits)) as u32;
        ScanCursor { hot, session_id, session_seq }
    }
}
