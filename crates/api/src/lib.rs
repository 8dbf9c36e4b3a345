//! Replication command dispatch and the swap control CLI surface.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod replication;
pub mod server;

pub use cli::{handle_command, CliReply};
pub use replication::{ReplicatedCommand, ReplicationDispatcher};
pub use server::{EvictOutcome, LoadOutcome, SwapServer};
