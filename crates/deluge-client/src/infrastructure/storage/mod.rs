//! Persistent settings.
//!
//! - **`config`** – TOML configuration file with the daemon address,
//!   credentials and client behaviour settings.

pub mod config;
