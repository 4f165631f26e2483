//! Network plumbing for the production runner.
//!
//! - [`codec`]: topic-dispatched wire encoding of [`SyncMessage`]s
//! - [`rate_limiter`]: per-peer token buckets for inbound requests
//! - [`local`]: in-process network of runners wired together with channels
//!
//! [`SyncMessage`]: fastsync_messages::SyncMessage

pub mod codec;
pub mod local;
pub mod rate_limiter;
mod wire;

pub use codec::{decode_message, encode_message, topic_for_message, CodecError, Topic};
pub use local::{LocalNetwork, LocalTransport, NetworkError, NetworkStats};
pub use rate_limiter::{RateLimitConfig, SyncRateLimiter};
pub use wire::{WireError, MAX_PAYLOAD_SIZE};
