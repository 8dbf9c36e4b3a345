//! Per-key exclusive locking for the swap subsystem.
//!
//! This crate implements the three-level (server / database / key)
//! hierarchical lock described in the swap request pipeline: acquiring a
//! key lock implicitly reserves its enclosing db and server locks in a
//! weaker mode, waiters are ordered by (txid, arrival), and a server-level
//! drain can wait for every outstanding key lock without starving unrelated
//! keys.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod lock;

pub use lock::{DbId, KeyLockGuard, LockManager, ServerLockGuard, TxId};
