//! Application layer: the client itself.
//!
//! - **`client`** – connection lifecycle, the call engine and the reconnect
//!   policy.
//! - **`method`** – the `client.method("core").attr("...")` builder.
//! - **`error`** – [`DelugeError`](error::DelugeError) and its
//!   transport/protocol/remote classification.

pub mod client;
pub mod error;
pub mod method;
