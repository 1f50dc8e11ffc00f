//! The RPC client: connection lifecycle, call engine and reconnect policy.
//!
//! # Lifecycle (for beginners)
//!
//! ```text
//!              connect()                 version probe ok        login ok
//! Disconnected ─────────► TLS session ───────────────► Connected ────────► Authenticated
//!      ▲                                                                        │
//!      └────────────── disconnect() / unrecoverable failure ◄───────────────────┘
//! ```
//!
//! 1. **Open** a TLS stream through the [`Connector`].
//! 2. **Negotiate**: send a `daemon.info` probe framed under protocol
//!    version 1 and read one byte.  A 2.x daemon answers with a frame whose
//!    first byte is 1; anything else (or silence) means the peer is not a
//!    daemon we can talk to.
//! 3. **Log in** with `daemon.login`.
//!
//! After that, [`DelugeClient::call`] sends one request at a time and blocks
//! for its reply.
//!
//! # Reconnect policy
//!
//! If a call fails because the stream broke (lost connection, timeout,
//! socket error) and automatic reconnect is on, the client closes the old
//! session, runs the whole lifecycle again on a new one and retries the call
//! once.  If that does not work the call fails with
//! [`DelugeError::FailedToReconnect`].  Protocol errors and remote errors are
//! never retried.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use deluge_core::{
    encode_frame, FrameDecoder, Kwargs, Request, RequestIdCounter, Response, RpcEvent, Value,
    PROTOCOL_VERSION,
};
use tracing::{debug, info, warn};

use super::error::DelugeError;
use super::method::MethodPath;
use crate::infrastructure::credentials::{self, Credentials};
use crate::infrastructure::transport::tls::{TlsConnector, DEFAULT_TIMEOUT};
use crate::infrastructure::transport::{Connector, Transport, TransportError};

/// Default daemon RPC port.
pub const DEFAULT_PORT: u16 = 58846;

/// Client identifier sent with `daemon.login`.
pub const CLIENT_VERSION: &str = "deluge-client";

/// Bytes requested per receive while reading a frame.
const READ_SIZE: usize = 4096;

const PASSWORD_MASK: &str = "<password hidden>";

// ── Options and state ─────────────────────────────────────────────────────────

/// Connection settings for a [`DelugeClient`].
#[derive(Clone)]
pub struct ClientOptions {
    pub host: String,
    pub port: u16,
    /// Leave both `username` and `password` empty to use the local-client
    /// account from the daemon's auth file (loopback hosts only).
    pub username: String,
    pub password: String,
    /// Auth file to read local credentials from instead of the platform
    /// default.
    pub auth_file: Option<PathBuf>,
    /// Decode wire strings that are valid UTF-8 to [`Value::Str`].
    pub decode_utf8: bool,
    pub automatic_reconnect: bool,
    /// Socket timeout for connect, send and receive.
    pub timeout: Duration,
}

impl ClientOptions {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            username: String::new(),
            password: String::new(),
            auth_file: None,
            decode_utf8: true,
            automatic_reconnect: true,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &PASSWORD_MASK)
            .field("auth_file", &self.auth_file)
            .field("decode_utf8", &self.decode_utf8)
            .field("automatic_reconnect", &self.automatic_reconnect)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Where the client is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Session open and protocol version agreed, not yet logged in.
    Connected,
    Authenticated,
}

/// One open transport plus the frame decoder reading from it.
struct Session {
    transport: Box<dyn Transport>,
    decoder: FrameDecoder,
}

impl Session {
    fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            decoder: FrameDecoder::new(PROTOCOL_VERSION),
        }
    }

    fn send(&mut self, request: &Request) -> Result<(), DelugeError> {
        let frame = encode_frame(self.decoder.expected_version(), &request.encode_payload())?;
        self.transport.send(&frame)?;
        Ok(())
    }

    /// Reads until one whole frame is buffered and returns its payload.
    fn read_frame(&mut self) -> Result<Vec<u8>, DelugeError> {
        loop {
            if let Some(payload) = self.decoder.next_frame()? {
                return Ok(payload);
            }
            let chunk = self.transport.receive(READ_SIZE)?;
            if chunk.is_empty() {
                return Err(DelugeError::ConnectionLost);
            }
            self.decoder.push(&chunk);
        }
    }
}

// ── Client ────────────────────────────────────────────────────────────────────

/// Blocking client for a Deluge daemon.
///
/// All operations take `&mut self`: one client drives one connection with
/// one request in flight.  Share a client between threads behind a `Mutex`,
/// or give each thread its own.
///
/// # Examples
///
/// ```no_run
/// use deluge_client::{ClientOptions, DelugeClient, Kwargs};
///
/// let options = ClientOptions::new("seedbox.lan", 58846).with_credentials("alice", "hunter2");
/// let mut client = DelugeClient::new(options);
/// client.connect()?;
/// let torrents = client.call("core.get_torrents_status", vec![], Kwargs::new())?;
/// println!("{torrents}");
/// client.disconnect();
/// # Ok::<(), deluge_client::DelugeError>(())
/// ```
pub struct DelugeClient<C: Connector = TlsConnector> {
    options: ClientOptions,
    connector: C,
    session: Option<Session>,
    state: ConnectionState,
    ids: RequestIdCounter,
    credentials: OnceLock<Credentials>,
    events: Vec<RpcEvent>,
    protocol_version: Option<u8>,
    daemon_version: Option<String>,
    auth_level: Option<i64>,
}

impl DelugeClient<TlsConnector> {
    /// Creates a disconnected client that connects over TLS.
    pub fn new(options: ClientOptions) -> Self {
        let connector = TlsConnector::new(options.timeout);
        Self::with_connector(options, connector)
    }
}

impl<C: Connector> DelugeClient<C> {
    /// Creates a disconnected client that opens transports with `connector`.
    pub fn with_connector(options: ClientOptions, connector: C) -> Self {
        Self {
            options,
            connector,
            session: None,
            state: ConnectionState::Disconnected,
            ids: RequestIdCounter::new(),
            credentials: OnceLock::new(),
            events: Vec::new(),
            protocol_version: None,
            daemon_version: None,
            auth_level: None,
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Authenticated
    }

    /// Protocol version agreed with the daemon, while a session is open.
    pub fn protocol_version(&self) -> Option<u8> {
        self.protocol_version
    }

    /// Version string the daemon returned to the version probe.
    pub fn daemon_version(&self) -> Option<&str> {
        self.daemon_version.as_deref()
    }

    /// Auth level the daemon granted at login.
    pub fn auth_level(&self) -> Option<i64> {
        self.auth_level
    }

    /// The credentials used for login, resolved on first use.
    pub fn credentials(&self) -> &Credentials {
        self.credentials.get_or_init(|| {
            let explicit = Credentials::new(&self.options.username, &self.options.password);
            credentials::resolve(&self.options.host, &explicit, self.options.auth_file.as_deref())
        })
    }

    /// Removes and returns the events received so far.
    pub fn drain_events(&mut self) -> Vec<RpcEvent> {
        std::mem::take(&mut self.events)
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Opens a session, negotiates the protocol version and logs in.
    ///
    /// An existing session is closed first.  On failure the client is left
    /// disconnected.
    ///
    /// # Errors
    ///
    /// Any [`DelugeError`]: transport errors while opening,
    /// [`DelugeError::UnsupportedDaemon`] from negotiation, or a
    /// [`DelugeError::Remote`] if the daemon rejects the login.
    pub fn connect(&mut self) -> Result<(), DelugeError> {
        if self.session.is_some() {
            self.disconnect();
        }

        info!(host = %self.options.host, port = self.options.port, "connecting to daemon");
        let transport = self
            .connector
            .open(&self.options.host, self.options.port)?;
        self.session = Some(Session::new(transport));

        let result = self.negotiate().and_then(|()| self.login());
        if let Err(e) = result {
            self.disconnect();
            return Err(e);
        }
        Ok(())
    }

    /// Closes the session, if any.  Idempotent.
    pub fn disconnect(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.transport.close();
            info!(host = %self.options.host, port = self.options.port, "disconnected from daemon");
        }
        self.state = ConnectionState::Disconnected;
        self.protocol_version = None;
    }

    /// Replaces the session with a fresh one: disconnect, then connect.
    ///
    /// # Errors
    ///
    /// Same as [`connect`](Self::connect).
    pub fn reconnect(&mut self) -> Result<(), DelugeError> {
        self.disconnect();
        self.connect()
    }

    /// Connects and returns a guard that disconnects when dropped.
    ///
    /// # Errors
    ///
    /// Same as [`connect`](Self::connect).  No guard is created on failure.
    pub fn connect_scoped(&mut self) -> Result<ConnectedClient<'_, C>, DelugeError> {
        self.connect()?;
        Ok(ConnectedClient { client: self })
    }

    fn negotiate(&mut self) -> Result<(), DelugeError> {
        let session = self.session.as_mut().ok_or(DelugeError::NotConnected)?;
        let id = self.ids.next();
        let probe = Request::new(id, "daemon.info", Vec::new(), Kwargs::new());
        debug!(request_id = id, "sending version probe");
        session.send(&probe)?;

        let first = match session.transport.receive(1) {
            Ok(bytes) => bytes,
            Err(TransportError::Timeout) => {
                return Err(DelugeError::UnsupportedDaemon(
                    "remote daemon did not answer the version probe".into(),
                ))
            }
            Err(e) => return Err(e.into()),
        };
        match first.first() {
            None => return Err(DelugeError::ConnectionLost),
            Some(&PROTOCOL_VERSION) => session.decoder.push(&first),
            Some(&other) => {
                return Err(DelugeError::UnsupportedDaemon(format!(
                    "received unsupported protocol version {other}"
                )))
            }
        }

        let version = self.await_reply(id)?;
        self.protocol_version = Some(PROTOCOL_VERSION);
        self.daemon_version = Some(version.to_text());
        self.state = ConnectionState::Connected;
        debug!(daemon_version = %version.to_text(), "protocol version {PROTOCOL_VERSION} negotiated");
        Ok(())
    }

    fn login(&mut self) -> Result<(), DelugeError> {
        let creds = self.credentials().clone();
        let mut kwargs = Kwargs::new();
        kwargs.insert("client_version".into(), Value::from(CLIENT_VERSION));

        let level = self.exchange(
            "daemon.login",
            vec![Value::from(creds.username.as_str()), Value::from(creds.password)],
            kwargs,
        )?;
        self.auth_level = level.as_i64();
        self.state = ConnectionState::Authenticated;
        info!(
            username = %creds.username,
            auth_level = ?self.auth_level,
            "logged in"
        );
        Ok(())
    }

    // ── Calls ─────────────────────────────────────────────────────────────────

    /// Calls `method` on the daemon and returns its result.
    ///
    /// # Errors
    ///
    /// - [`DelugeError::NotConnected`] before [`connect`](Self::connect).
    /// - [`DelugeError::Remote`] if the daemon raised; the session stays up.
    /// - [`DelugeError::FailedToReconnect`] if automatic reconnect was tried
    ///   and did not recover the call.
    /// - Any other failure of the stream, after which the client is
    ///   disconnected.
    pub fn call(&mut self, method: &str, args: Vec<Value>, kwargs: Kwargs) -> Result<Value, DelugeError> {
        if self.session.is_none() {
            return Err(DelugeError::NotConnected);
        }

        let err = match self.exchange(method, args.clone(), kwargs.clone()) {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        if !(err.is_transport_failure() && self.options.automatic_reconnect) {
            return Err(self.surface(err));
        }

        warn!(method, error = %err, "call failed, reconnecting");
        if let Err(reconnect_err) = self.reconnect() {
            return Err(DelugeError::FailedToReconnect {
                source: Box::new(reconnect_err),
            });
        }

        match self.exchange(method, args, kwargs) {
            Ok(value) => Ok(value),
            Err(retry_err) if retry_err.is_transport_failure() => {
                self.disconnect();
                Err(DelugeError::FailedToReconnect {
                    source: Box::new(retry_err),
                })
            }
            Err(retry_err) => Err(self.surface(retry_err)),
        }
    }

    /// Starts a dotted method name, e.g. `client.method("core").attr("get_torrents")`.
    pub fn method(&mut self, name: &str) -> MethodPath<'_, C> {
        MethodPath::new(self, name)
    }

    /// Tears the session down unless the daemon itself raised `err`.
    fn surface(&mut self, err: DelugeError) -> DelugeError {
        if !err.is_remote() {
            self.disconnect();
        }
        err
    }

    /// Sends one request and waits for its reply.  No retries.
    fn exchange(&mut self, method: &str, args: Vec<Value>, kwargs: Kwargs) -> Result<Value, DelugeError> {
        let session = self.session.as_mut().ok_or(DelugeError::NotConnected)?;
        let id = self.ids.next();
        debug!(
            request_id = id,
            method,
            args = ?loggable_args(method, &args),
            kwargs = ?kwargs,
            "calling"
        );
        session.send(&Request::new(id, method, args, kwargs))?;
        self.await_reply(id)
    }

    /// Reads frames until the reply to request `id` arrives, buffering any
    /// events that come first.
    fn await_reply(&mut self, id: i64) -> Result<Value, DelugeError> {
        let session = self.session.as_mut().ok_or(DelugeError::NotConnected)?;
        loop {
            let payload = session.read_frame()?;
            match Response::decode_payload(&payload, self.options.decode_utf8)? {
                Response::Event(event) => {
                    debug!(event = %event.name, "event received while waiting for reply");
                    self.events.push(event);
                }
                Response::Result { id: reply_id, value } if reply_id == id => {
                    debug!(request_id = id, "reply received");
                    return Ok(value);
                }
                Response::Error { id: reply_id, failure } if reply_id == id => {
                    debug!(request_id = id, kind = %failure.kind, "remote error received");
                    return Err(DelugeError::Remote {
                        message: failure.message(),
                        kind: failure.kind,
                        traceback: failure.traceback,
                    });
                }
                other => {
                    return Err(DelugeError::Protocol(format!(
                        "reply to request {:?} while waiting for request {id}",
                        other.request_id()
                    )))
                }
            }
        }
    }
}

impl<C: Connector> fmt::Debug for DelugeClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelugeClient")
            .field("options", &self.options)
            .field("state", &self.state)
            .field("protocol_version", &self.protocol_version)
            .field("daemon_version", &self.daemon_version)
            .field("pending_events", &self.events.len())
            .finish()
    }
}

/// Arguments as they may appear in logs: the password of `daemon.login`
/// is replaced by a placeholder.
pub(crate) fn loggable_args(method: &str, args: &[Value]) -> Vec<Value> {
    let mut shown = args.to_vec();
    if method == "daemon.login" {
        if let Some(password) = shown.get_mut(1) {
            *password = Value::from(PASSWORD_MASK);
        }
    }
    shown
}

// ── Scoped connection ─────────────────────────────────────────────────────────

/// A connected client that disconnects when it goes out of scope.
///
/// Derefs to [`DelugeClient`], so every client method is available.
pub struct ConnectedClient<'a, C: Connector> {
    client: &'a mut DelugeClient<C>,
}

impl<C: Connector> Deref for ConnectedClient<'_, C> {
    type Target = DelugeClient<C>;

    fn deref(&self) -> &Self::Target {
        self.client
    }
}

impl<C: Connector> DerefMut for ConnectedClient<'_, C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.client
    }
}

impl<C: Connector> Drop for ConnectedClient<'_, C> {
    fn drop(&mut self) {
        self.client.disconnect();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
