//! In-memory swap keyspace primitives: the LRU and cuckoo-filter building
//! blocks (§4.1), the composite cold filter (§4.2), and the per-database
//! keyspace state (§3) built from them.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coldfilter;
pub mod cuckoo;
pub mod keyspace;
pub mod lru;

pub use coldfilter::{ColdFilter, ColdFilterStats, FiltReason};
pub use cuckoo::{BitsPerTag, CuckooFilter, CuckooStat};
pub use keyspace::{Database, DirtySubkeys, ObjectMeta, ObjectPayload, ObjectType, EVICT_ASAP_KEYS_LIMIT};
pub use lru::LruCache;
