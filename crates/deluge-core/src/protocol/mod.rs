//! Protocol layer: framing, message shapes and request ids.

pub mod frame;
pub mod messages;
pub mod sequence;

pub use frame::{encode_frame, FrameDecoder, FrameError, HEADER_SIZE};
pub use messages::*;
pub use sequence::RequestIdCounter;
