//! # deluge-core
//!
//! Wire-level building blocks for talking to a Deluge daemon over its binary
//! RPC protocol.  Nothing in this crate opens a socket; the client crate
//! plugs these pieces into a TLS transport.
//!
//! # Architecture overview (for beginners)
//!
//! A Deluge daemon listens on a TLS socket (port 58846 by default).  Every
//! message on that socket goes through three layers, outermost first:
//!
//! - **`protocol::frame`** – A 5-byte header (protocol version, then the
//!   payload length) in front of a zlib-compressed body.  The decoder
//!   reassembles frames from a byte stream that may split or merge them.
//!
//! - **`codec`** – The body itself is *rencode*, a compact self-describing
//!   serialization of integers, floats, booleans, strings, lists and
//!   mappings.  Values are represented in Rust by [`Value`].
//!
//! - **`protocol::messages`** – The shape of what is encoded: outbound
//!   `[[id, method, args, kwargs]]` requests and inbound result, error and
//!   event messages.

pub mod codec;
pub mod protocol;

pub use codec::{CodecError, Value};
pub use protocol::frame::{encode_frame, FrameDecoder, FrameError};
pub use protocol::messages::{
    Kwargs, MessageError, MessageType, RemoteFailure, Request, Response, RpcEvent,
    PROTOCOL_VERSION,
};
pub use protocol::sequence::RequestIdCounter;
