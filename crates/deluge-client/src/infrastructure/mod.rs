//! Infrastructure layer: everything that touches the outside world.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `deluge_core`, but the call engine in `application` only sees the
//! [`transport::Transport`] and [`transport::Connector`] traits.
//!
//! # Sub-modules
//!
//! - **`transport`** – the transport traits, the `rustls` TLS implementation
//!   and a scripted in-memory implementation for tests.
//!
//! - **`credentials`** – reads the `localclient` account from the daemon's
//!   `auth` file when connecting to a loopback host.
//!
//! - **`storage`** – the TOML config file.

pub mod credentials;
pub mod storage;
pub mod transport;
