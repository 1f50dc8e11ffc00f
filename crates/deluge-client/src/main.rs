//! deluge-client — call one RPC method on a Deluge daemon and print the result.
//!
//! # Usage
//!
//! ```text
//! deluge-client [OPTIONS] <METHOD> [ARGS_JSON]... [--kwarg KEY=JSON]...
//!
//! Options:
//!   --host     <HOST>   Daemon host [default: config file, then 127.0.0.1]
//!   --port     <PORT>   Daemon RPC port [default: config file, then 58846]
//!   --username <USER>   Login name
//!   --password <PASS>   Login password
//!   --timeout  <SECS>   Socket timeout in seconds [default: 20]
//!   --no-reconnect      Fail instead of reconnecting when the connection drops
//!   --config   <PATH>   Config file to read instead of the platform default
//! ```
//!
//! Positional arguments and `--kwarg` values are JSON:
//!
//! ```text
//! deluge-client core.get_torrents_status '{}' '["name", "progress"]'
//! deluge-client core.add_torrent_url 'https://example.org/x.torrent' --kwarg 'options={}'
//! ```
//!
//! An argument that is not valid JSON is sent as a plain string, so
//! `deluge-client core.pause_torrent a0b1c2...` works without extra quoting.
//!
//! # Configuration layering
//!
//! Command-line flags beat `DELUGE_*` environment variables, which beat the
//! config file, which beats the built-in defaults.  Logs go to stderr
//! (filter from `RUST_LOG`, else the config file's `log_level`); the result
//! goes to stdout as pretty-printed JSON.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use deluge_client::infrastructure::storage::config::{
    load_config, load_config_from, ClientConfig, ConfigError,
};
use deluge_client::{ClientOptions, DelugeClient, Kwargs, Value};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Call a method on a Deluge daemon.
#[derive(Debug, Parser)]
#[command(
    name = "deluge-client",
    about = "Call an RPC method on a Deluge daemon and print the result as JSON",
    version,
    allow_negative_numbers = true
)]
struct Cli {
    /// Daemon host name or IP address.
    #[arg(long, env = "DELUGE_HOST")]
    host: Option<String>,

    /// Daemon RPC port.
    #[arg(long, env = "DELUGE_PORT")]
    port: Option<u16>,

    /// Login name.  Leave unset with `--password` to use the local-client
    /// account when the host is local.
    #[arg(long, short = 'u', env = "DELUGE_USERNAME")]
    username: Option<String>,

    /// Login password.
    #[arg(long, env = "DELUGE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Socket timeout in seconds.
    #[arg(long, env = "DELUGE_TIMEOUT")]
    timeout: Option<u64>,

    /// Do not reconnect and retry when the connection drops mid-call.
    #[arg(long)]
    no_reconnect: bool,

    /// Config file to read instead of the platform default.
    #[arg(long, env = "DELUGE_CONFIG")]
    config: Option<PathBuf>,

    /// Dotted method name, e.g. `core.get_torrents_status`.
    method: String,

    /// Positional arguments, each parsed as JSON.
    args: Vec<String>,

    /// Keyword argument as `KEY=JSON`.  Repeatable.
    #[arg(long = "kwarg", value_name = "KEY=JSON")]
    kwargs: Vec<String>,
}

impl Cli {
    /// Reads the config file named by `--config`, or the platform default.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    fn load_config(&self) -> anyhow::Result<ClientConfig> {
        match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("failed to load config from {}", path.display())),
            None => match load_config() {
                Ok(cfg) => Ok(cfg),
                Err(ConfigError::NoPlatformConfigDir) => Ok(ClientConfig::default()),
                Err(e) => Err(e).context("failed to load config"),
            },
        }
    }

    /// Layers the command-line flags over the config file's settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting timeout is zero.
    fn client_options(&self, config: &ClientConfig) -> anyhow::Result<ClientOptions> {
        let mut options = config.to_options();
        if let Some(host) = &self.host {
            options.host = host.clone();
        }
        if let Some(port) = self.port {
            options.port = port;
        }
        if let Some(username) = &self.username {
            options.username = username.clone();
        }
        if let Some(password) = &self.password {
            options.password = password.clone();
        }
        if let Some(secs) = self.timeout {
            options.timeout = Duration::from_secs(secs);
        }
        if self.no_reconnect {
            options.automatic_reconnect = false;
        }
        if options.timeout.is_zero() {
            bail!("timeout must be at least one second");
        }
        Ok(options)
    }

    /// Parses the positional and keyword arguments of the call.
    ///
    /// # Errors
    ///
    /// Returns an error for a `--kwarg` without `=` or with an empty key.
    fn call_arguments(&self) -> anyhow::Result<(Vec<Value>, Kwargs)> {
        let args = self.args.iter().map(|a| parse_argument(a)).collect();

        let mut kwargs = Kwargs::new();
        for entry in &self.kwargs {
            let (key, raw) = entry
                .split_once('=')
                .with_context(|| format!("invalid --kwarg '{entry}': expected KEY=JSON"))?;
            if key.is_empty() {
                bail!("invalid --kwarg '{entry}': empty key");
            }
            kwargs.insert(key.to_string(), parse_argument(raw));
        }
        Ok((args, kwargs))
    }
}

/// Parses a command-line argument as JSON, falling back to a plain string.
fn parse_argument(raw: &str) -> Value {
    serde_json::from_str::<serde_json::Value>(raw)
        .map(json_to_value)
        .unwrap_or_else(|_| Value::from(raw))
}

/// Converts JSON to the wire value model.
///
/// Integers that fit in `i64` stay integers; everything else numeric becomes
/// a float.  Object keys come out in sorted order.
fn json_to_value(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::None,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::Str(s),
        serde_json::Value::Array(items) => {
            Value::List(items.into_iter().map(json_to_value).collect())
        }
        serde_json::Value::Object(map) => Value::Dict(
            map.into_iter()
                .map(|(k, v)| (Value::Str(k), json_to_value(v)))
                .collect(),
        ),
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// 1. Parse CLI arguments and load the config file.
/// 2. Initialise `tracing_subscriber` (needs the config's log level).
/// 3. Connect with a scoped guard, so the session is closed on every exit
///    path, make the call and print the result.
fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.client.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = cli.client_options(&config)?;
    let (args, kwargs) = cli.call_arguments()?;

    let target = format!("{}:{}", options.host, options.port);
    let mut client = DelugeClient::new(options);
    let mut session = client
        .connect_scoped()
        .with_context(|| format!("failed to connect to {target}"))?;

    let result = session
        .call(&cli.method, args, kwargs)
        .with_context(|| format!("call to {} failed", cli.method))?;

    for event in session.drain_events() {
        info!(event = %event.name, payload = ?event.payload, "daemon event");
    }

    let rendered = serde_json::to_string_pretty(&result).context("failed to render result")?;
    println!("{rendered}");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_requires_method() {
        assert!(Cli::try_parse_from(["deluge-client"]).is_err());
    }

    #[test]
    fn test_cli_method_only() {
        // Arrange / Act
        let cli = Cli::parse_from(["deluge-client", "daemon.info"]);

        // Assert
        assert_eq!(cli.method, "daemon.info");
        assert!(cli.args.is_empty());
        assert!(cli.kwargs.is_empty());
        assert!(!cli.no_reconnect);
    }

    #[test]
    fn test_cli_flags_override_config() {
        // Arrange
        let cli = Cli::parse_from([
            "deluge-client",
            "--host",
            "10.0.0.5",
            "--port",
            "9000",
            "--timeout",
            "3",
            "--no-reconnect",
            "core.get_torrents",
        ]);
        let mut config = ClientConfig::default();
        config.daemon.host = "seedbox.lan".into();
        config.daemon.username = "alice".into();

        // Act
        let options = cli.client_options(&config).unwrap();

        // Assert
        assert_eq!(options.host, "10.0.0.5");
        assert_eq!(options.port, 9000);
        assert_eq!(options.timeout, Duration::from_secs(3));
        assert!(!options.automatic_reconnect);
        assert_eq!(options.username, "alice", "unset flags keep config values");
    }

    #[test]
    fn test_cli_zero_timeout_is_rejected() {
        let cli = Cli::parse_from(["deluge-client", "--timeout", "0", "daemon.info"]);
        assert!(cli.client_options(&ClientConfig::default()).is_err());
    }

    #[test]
    fn test_call_arguments_parse_json() {
        // Arrange
        let cli = Cli::parse_from([
            "deluge-client",
            "core.get_torrents_status",
            "{}",
            r#"["name", "progress"]"#,
            "-1",
            "--kwarg",
            "diff=true",
        ]);

        // Act
        let (args, kwargs) = cli.call_arguments().unwrap();

        // Assert
        assert_eq!(
            args,
            vec![
                Value::Dict(vec![]),
                Value::List(vec![Value::from("name"), Value::from("progress")]),
                Value::Int(-1),
            ]
        );
        assert_eq!(kwargs.get("diff"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_non_json_argument_is_plain_string() {
        assert_eq!(parse_argument("a0b1c2d3"), Value::from("a0b1c2d3"));
        assert_eq!(parse_argument("\"quoted\""), Value::from("quoted"));
    }

    #[test]
    fn test_kwarg_without_equals_is_error() {
        let cli = Cli::parse_from(["deluge-client", "core.pause_torrent", "--kwarg", "oops"]);
        assert!(cli.call_arguments().is_err());
    }

    #[test]
    fn test_kwarg_with_empty_key_is_error() {
        let cli = Cli::parse_from(["deluge-client", "core.pause_torrent", "--kwarg", "=1"]);
        assert!(cli.call_arguments().is_err());
    }

    #[test]
    fn test_json_to_value_numbers() {
        assert_eq!(json_to_value(serde_json::json!(7)), Value::Int(7));
        assert_eq!(json_to_value(serde_json::json!(2.5)), Value::Float(2.5));
        assert_eq!(
            json_to_value(serde_json::json!(u64::MAX)),
            Value::Float(u64::MAX as f64)
        );
        assert_eq!(json_to_value(serde_json::json!(null)), Value::None);
    }

    #[test]
    fn test_missing_config_file_gives_defaults() {
        let cli = Cli::parse_from([
            "deluge-client",
            "--config",
            "/nonexistent/deluge-rpc/config.toml",
            "daemon.info",
        ]);
        assert_eq!(cli.load_config().unwrap(), ClientConfig::default());
    }
}
