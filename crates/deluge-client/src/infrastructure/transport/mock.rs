//! Scripted in-memory transport for tests.
//!
//! # Why a scripted transport?
//!
//! The real [`TlsConnector`](super::tls::TlsConnector) needs a running
//! daemon.  The types here stand in for one: every request the client sends
//! is decoded and recorded, and the next scripted [`Reply`] batch is framed
//! and queued for the client to read.  Replies echo the id of the request
//! they answer, so scripts never have to predict request ids.
//!
//! # Usage in tests
//!
//! ```ignore
//! let connector = ScriptedConnector::new()
//!     .session(SessionScript::handshake("2.1.1", 10).reply(Reply::result("ok")));
//! let mut client = DelugeClient::with_connector(options, connector.clone());
//!
//! client.connect().unwrap();
//! assert_eq!(client.call("core.ping", vec![], Kwargs::new()).unwrap(), Value::from("ok"));
//!
//! assert_eq!(connector.opens(), 1);
//! assert_eq!(connector.sent_methods(), ["daemon.info", "daemon.login", "core.ping"]);
//! ```
//!
//! A request arriving after the script is exhausted gets no answer, so the
//! client's next receive times out.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use deluge_core::codec::serialize;
use deluge_core::{encode_frame, FrameDecoder, Request, Value, PROTOCOL_VERSION};

use super::{Connector, Transport, TransportError};

// ── Script building blocks ────────────────────────────────────────────────────

/// One thing the fake daemon does after receiving a request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// `[1, id, value]` for the request just received.
    Result(Value),
    /// `[1, id, value]` with an explicit id.
    ResultFor { id: i64, value: Value },
    /// `[2, id, kind, args, {}, traceback]` for the request just received.
    Error {
        kind: String,
        args: Vec<Value>,
        traceback: String,
    },
    /// `[3, name, payload]`.
    Event { name: String, payload: Vec<Value> },
    /// Raw bytes written to the stream as they are.
    Raw(Vec<u8>),
    /// The stream ends: every later receive returns zero bytes.
    Eof,
    /// One receive fails with [`TransportError::Timeout`].
    Timeout,
}

impl Reply {
    pub fn result(value: impl Into<Value>) -> Self {
        Reply::Result(value.into())
    }

    pub fn error(kind: &str, message: &str, traceback: &str) -> Self {
        Reply::Error {
            kind: kind.to_string(),
            args: vec![Value::bytes(message)],
            traceback: traceback.to_string(),
        }
    }

    pub fn event(name: &str, payload: Vec<Value>) -> Self {
        Reply::Event {
            name: name.to_string(),
            payload,
        }
    }
}

/// The replies one connection gives, one batch per request, in order.
#[derive(Debug, Clone, Default)]
pub struct SessionScript {
    batches: VecDeque<Vec<Reply>>,
    chunk_size: Option<usize>,
}

impl SessionScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session that answers the version probe with `daemon_version` and the
    /// login with `auth_level`.
    pub fn handshake(daemon_version: &str, auth_level: i64) -> Self {
        Self::new()
            .reply(Reply::Result(Value::bytes(daemon_version)))
            .reply(Reply::Result(Value::Int(auth_level)))
    }

    /// Answers the next request with a single reply.
    pub fn reply(self, reply: Reply) -> Self {
        self.replies(vec![reply])
    }

    /// Answers the next request with several replies, written back to back.
    pub fn replies(mut self, replies: Vec<Reply>) -> Self {
        self.batches.push_back(replies);
        self
    }

    /// Delivers inbound bytes at most `n` at a time.
    pub fn chunked(mut self, n: usize) -> Self {
        self.chunk_size = Some(n.max(1));
        self
    }
}

/// Frames a decoded message the way the daemon does.
pub fn daemon_frame(message: &Value) -> Vec<u8> {
    encode_frame(PROTOCOL_VERSION, &serialize(message)).unwrap_or_default()
}

// ── Transport ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Inbound {
    Bytes(Vec<u8>),
    Timeout,
    Eof,
}

/// A transport that plays one [`SessionScript`].
pub struct ScriptedTransport {
    script: SessionScript,
    inbox: VecDeque<Inbound>,
    outbound: FrameDecoder,
    shared: Arc<Shared>,
    closed: bool,
}

impl ScriptedTransport {
    fn new(script: SessionScript, shared: Arc<Shared>) -> Self {
        Self {
            script,
            inbox: VecDeque::new(),
            outbound: FrameDecoder::new(PROTOCOL_VERSION),
            shared,
            closed: false,
        }
    }

    fn answer(&mut self, request_id: i64) {
        let Some(batch) = self.script.batches.pop_front() else {
            return;
        };
        for reply in batch {
            let item = match reply {
                Reply::Result(value) => Inbound::Bytes(daemon_frame(&Value::List(vec![
                    Value::Int(1),
                    Value::Int(request_id),
                    value,
                ]))),
                Reply::ResultFor { id, value } => Inbound::Bytes(daemon_frame(&Value::List(
                    vec![Value::Int(1), Value::Int(id), value],
                ))),
                Reply::Error {
                    kind,
                    args,
                    traceback,
                } => Inbound::Bytes(daemon_frame(&Value::List(vec![
                    Value::Int(2),
                    Value::Int(request_id),
                    Value::bytes(kind),
                    Value::List(args),
                    Value::Dict(Vec::new()),
                    Value::bytes(traceback),
                ]))),
                Reply::Event { name, payload } => Inbound::Bytes(daemon_frame(&Value::List(
                    vec![Value::Int(3), Value::bytes(name), Value::List(payload)],
                ))),
                Reply::Raw(bytes) => Inbound::Bytes(bytes),
                Reply::Eof => Inbound::Eof,
                Reply::Timeout => Inbound::Timeout,
            };
            self.inbox.push_back(item);
        }
    }
}

impl Transport for ScriptedTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.outbound.push(bytes);
        while let Some(payload) = self.outbound.next_frame().map_err(invalid_data)? {
            let request = Request::decode_payload(&payload).map_err(invalid_data)?;
            let id = request.id;
            lock(&self.shared.sent).push(request);
            self.answer(id);
        }
        Ok(())
    }

    fn receive(&mut self, max_bytes: usize) -> Result<Vec<u8>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let limit = self
            .script
            .chunk_size
            .map_or(max_bytes, |n| n.min(max_bytes))
            .max(1);
        match self.inbox.pop_front() {
            Some(Inbound::Bytes(mut bytes)) => {
                if bytes.len() > limit {
                    let rest = bytes.split_off(limit);
                    self.inbox.push_front(Inbound::Bytes(rest));
                }
                Ok(bytes)
            }
            Some(Inbound::Eof) => {
                self.inbox.push_front(Inbound::Eof);
                Ok(Vec::new())
            }
            Some(Inbound::Timeout) | None => Err(TransportError::Timeout),
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.shared.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn invalid_data(err: impl std::fmt::Display) -> TransportError {
    TransportError::Io(io::Error::new(io::ErrorKind::InvalidData, err.to_string()))
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Connector ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Shared {
    sessions: Mutex<VecDeque<Option<SessionScript>>>,
    sent: Mutex<Vec<Request>>,
    opens: AtomicUsize,
    closes: AtomicUsize,
}

/// Hands out one scripted transport per `open`, in the order given.
///
/// Clones share state, so a test can keep one clone for assertions after
/// moving the other into the client.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    shared: Arc<Shared>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a session for the next `open`.
    pub fn session(self, script: SessionScript) -> Self {
        lock(&self.shared.sessions).push_back(Some(script));
        self
    }

    /// Queues a refused connection for the next `open`.
    pub fn refuse(self) -> Self {
        lock(&self.shared.sessions).push_back(None);
        self
    }

    /// Number of `open` calls so far, refused ones included.
    pub fn opens(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    /// Number of transports closed so far.
    pub fn closes(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }

    /// Every request sent on every session, in order.
    pub fn sent_requests(&self) -> Vec<Request> {
        lock(&self.shared.sent).clone()
    }

    pub fn sent_methods(&self) -> Vec<String> {
        lock(&self.shared.sent)
            .iter()
            .map(|r| r.method.clone())
            .collect()
    }
}

impl Connector for ScriptedConnector {
    fn open(&self, host: &str, port: u16) -> Result<Box<dyn Transport>, TransportError> {
        self.shared.opens.fetch_add(1, Ordering::SeqCst);
        match lock(&self.shared.sessions).pop_front() {
            Some(Some(script)) => Ok(Box::new(ScriptedTransport::new(
                script,
                Arc::clone(&self.shared),
            ))),
            Some(None) | None => Err(TransportError::ConnectFailed {
                addr: format!("{host}:{port}"),
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            }),
        }
    }
}
