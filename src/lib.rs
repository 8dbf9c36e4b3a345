//! # coldtier
//!
//! The swap subsystem of a disk-tiered key-value store: hot keys live in
//! memory, cold keys are swapped to an on-disk column-family store behind
//! a per-key lock and a fixed worker-thread pool.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use coldtier::{handle_command, SwapConfig, SwapServer};
//! use coldtier_durability::{ColumnStore, MemStore};
//!
//! fn main() -> coldtier::Result<()> {
//!     let store: Arc<dyn ColumnStore> = Arc::new(MemStore::new());
//!     let server = SwapServer::new(SwapConfig::default(), store)
//!         .expect("default config is always valid");
//!
//!     server.put_hot(0, b"user:1", b"alice".to_vec())?;
//!     handle_command(&server, 0, "SWAP.EVICT", &[b"user:1".to_vec()])?;
//!     handle_command(&server, 0, "SWAP.LOAD", &[b"user:1".to_vec()])?;
//!     Ok(())
//! }
//! ```
//!
//! # Layout
//!
//! | Crate | Role |
//! |-------|------|
//! | `coldtier-core` | The `Key` type and base error taxonomy. |
//! | `coldtier-storage` | LRU/cuckoo filters, the composite cold filter, per-db keyspace state. |
//! | `coldtier-concurrency` | The three-level (server/db/key) hierarchical lock. |
//! | `coldtier-durability` | The `ColumnStore` trait, `Rio` descriptors, a `MemStore` test backend. |
//! | `coldtier-engine` | Codecs, the swap request pipeline, eviction, persistence, rate limiting. |
//! | `coldtier-api` | The `SwapServer`, the `SWAP.*`/`DEBUG SWAPOUT` CLI surface, replication dispatch. |
//!
//! Only this crate's re-exported surface is meant for external use; the
//! component crates are implementation detail reached through it.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub use coldtier_api::{handle_command, CliReply, EvictOutcome, LoadOutcome, ReplicatedCommand, ReplicationDispatcher, SwapServer};
pub use coldtier_core::{CoreError, Key, KeyError};
pub use coldtier_engine::{Intention, IntentionFlags, Result, SwapCodec, SwapConfig, SwapData, SwapError, SwapRequest};
pub use coldtier_storage::ObjectType;
