//! The swap request pipeline: codec/encoding, configuration, the request
//! model, eviction, rate limiting, and the persistence engine built on
//! top of `coldtier-storage` and `coldtier-durability`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod config;
pub mod error;
pub mod eviction;
pub mod persist;
pub mod pipeline;
pub mod ratelimit;
pub mod recovery;
pub mod request;

pub use config::SwapConfig;
pub use error::{Result, SwapError};
pub use pipeline::{Pipeline, SwapCommand};
pub use recovery::{recover, RecoveredKey, RecoveryReport};
pub use request::{Intention, IntentionFlags, SwapCodec, SwapData, SwapRequest};
