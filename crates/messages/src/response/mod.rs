//! Response messages sent by a serving node.

mod block;
mod status;

pub use block::{BlockResponse, NoBlockResponse};
pub use status::StatusAnnounce;
