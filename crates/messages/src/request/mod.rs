//! Request messages sent by a syncing node.

mod block;
mod status;

pub use block::BlockRequest;
pub use status::StatusRequest;
