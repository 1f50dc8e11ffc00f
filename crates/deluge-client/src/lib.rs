//! deluge-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does deluge-client do? (for beginners)
//!
//! A Deluge daemon is a BitTorrent engine without a user interface.  Every
//! user interface (the desktop app, the web UI, scripts) controls it through
//! the same RPC protocol: a TLS connection carrying compressed, rencoded
//! method calls such as `core.get_torrents_status` or `core.pause_torrent`.
//!
//! This crate is a client for that protocol:
//!
//! 1. Opens a TLS connection to the daemon (port 58846 by default).
//! 2. Checks that the daemon speaks protocol version 1.
//! 3. Logs in, using the local-client account from the daemon's `auth` file
//!    when talking to `localhost` without explicit credentials.
//! 4. Sends calls one at a time and returns their results as [`Value`]s.
//! 5. If the connection drops mid-call, reconnects once and retries.

/// Application layer: the client, its errors and the method builder.
pub mod application;

/// Infrastructure layer: transports, credential discovery, config file.
pub mod infrastructure;

pub use application::client::{
    ClientOptions, ConnectedClient, ConnectionState, DelugeClient, CLIENT_VERSION, DEFAULT_PORT,
};
pub use application::error::DelugeError;
pub use application::method::MethodPath;
pub use deluge_core::{Kwargs, RpcEvent, Value};
pub use infrastructure::credentials::Credentials;
