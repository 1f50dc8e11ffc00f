//! RPC message shapes carried inside frames.
//!
//! Outbound, a frame payload is a one-element list holding the request tuple:
//! ```text
//! [[request_id, "method.name", [args...], {kwargs...}]]
//! ```
//! Inbound, a payload is a list whose first element is the message type:
//! ```text
//! [1, request_id, result]                                   RESPONSE
//! [2, request_id, exc_type, exc_args, exc_kwargs, traceback] ERROR
//! [3, event_name, [event_args...]]                          EVENT
//! ```

use std::collections::BTreeMap;

use thiserror::Error;

use crate::codec::{deserialize, serialize, CodecError, Value};

/// Protocol version spoken by daemons of the 2.x series.
pub const PROTOCOL_VERSION: u8 = 1;

/// Keyword arguments of a call, ordered by name.
pub type Kwargs = BTreeMap<String, Value>;

/// Inbound message type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Response = 1,
    Error = 2,
    Event = 3,
}

impl TryFrom<i64> for MessageType {
    type Error = i64;

    fn try_from(v: i64) -> Result<Self, i64> {
        match v {
            1 => Ok(MessageType::Response),
            2 => Ok(MessageType::Error),
            3 => Ok(MessageType::Event),
            other => Err(other),
        }
    }
}

/// Errors raised while mapping decoded values to message shapes.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The decoded value does not have the shape of any known message.
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("unknown message type: {0}")]
    UnknownMessageType(i64),
}

// ── Request ───────────────────────────────────────────────────────────────────

/// One outbound RPC call.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: i64,
    /// Dotted method name, e.g. `core.get_torrents_status`.
    pub method: String,
    pub args: Vec<Value>,
    pub kwargs: Kwargs,
}

impl Request {
    pub fn new(id: i64, method: impl Into<String>, args: Vec<Value>, kwargs: Kwargs) -> Self {
        Self {
            id,
            method: method.into(),
            args,
            kwargs,
        }
    }

    /// The `[[id, method, args, kwargs]]` value sent on the wire.
    pub fn to_value(&self) -> Value {
        Value::List(vec![Value::List(vec![
            Value::Int(self.id),
            Value::Str(self.method.clone()),
            Value::List(self.args.clone()),
            Value::from(self.kwargs.clone()),
        ])])
    }

    /// Serializes the request into an (uncompressed) frame payload.
    pub fn encode_payload(&self) -> Vec<u8> {
        serialize(&self.to_value())
    }

    /// Parses a request payload back into a [`Request`].
    ///
    /// The client never receives requests; this exists so that test doubles
    /// standing in for the daemon can inspect what was sent.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError`] if the payload does not decode or does not
    /// have the request shape.
    pub fn decode_payload(payload: &[u8]) -> Result<Self, MessageError> {
        let value = deserialize(payload, true)?;
        let outer = value
            .as_list()
            .filter(|l| l.len() == 1)
            .ok_or_else(|| MessageError::Malformed("request batch must hold one request".into()))?;
        let fields = outer[0]
            .as_list()
            .filter(|f| f.len() == 4)
            .ok_or_else(|| MessageError::Malformed("request must have 4 fields".into()))?;

        let id = fields[0]
            .as_i64()
            .ok_or_else(|| MessageError::Malformed("request id must be an integer".into()))?;
        let method = fields[1]
            .as_str()
            .ok_or_else(|| MessageError::Malformed("method must be a string".into()))?
            .to_string();
        let args = fields[2]
            .as_list()
            .ok_or_else(|| MessageError::Malformed("args must be a list".into()))?
            .to_vec();
        let kwargs = fields[3]
            .as_dict()
            .ok_or_else(|| MessageError::Malformed("kwargs must be a dict".into()))?
            .iter()
            .map(|(k, v)| {
                k.as_str()
                    .map(|k| (k.to_string(), v.clone()))
                    .ok_or_else(|| MessageError::Malformed("kwarg names must be strings".into()))
            })
            .collect::<Result<Kwargs, _>>()?;

        Ok(Self {
            id,
            method,
            args,
            kwargs,
        })
    }
}

// ── Response ──────────────────────────────────────────────────────────────────

/// An application error raised inside the daemon.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFailure {
    /// Name of the exception type raised remotely, e.g. `AuthenticationRequired`.
    pub kind: String,
    /// Exception arguments.
    pub args: Vec<Value>,
    pub traceback: String,
}

impl RemoteFailure {
    /// Human-readable message: arguments joined by `", "`, a newline, then
    /// the remote traceback.
    pub fn message(&self) -> String {
        let joined = self
            .args
            .iter()
            .map(Value::to_text)
            .collect::<Vec<_>>()
            .join(", ");
        format!("{joined}\n{}", self.traceback)
    }
}

/// An event pushed by the daemon outside the request/response cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcEvent {
    /// Event name, e.g. `TorrentAddedEvent`.  Sits where a request id would.
    pub name: Value,
    pub payload: Vec<Value>,
}

/// One decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Result { id: i64, value: Value },
    Error { id: i64, failure: RemoteFailure },
    Event(RpcEvent),
}

impl Response {
    /// Decodes an inbound frame payload.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError`] if the payload is not valid rencode or not a
    /// `[msg_type, id, ...]` list of a known type.
    pub fn decode_payload(payload: &[u8], decode_utf8: bool) -> Result<Self, MessageError> {
        let value = deserialize(payload, decode_utf8)?;
        Self::from_value(value)
    }

    /// Maps a decoded `[msg_type, id, ...]` list to a [`Response`].
    ///
    /// # Errors
    ///
    /// Returns [`MessageError`] if the value does not have a known shape.
    pub fn from_value(value: Value) -> Result<Self, MessageError> {
        let Value::List(mut fields) = value else {
            return Err(MessageError::Malformed("message must be a list".into()));
        };
        if fields.len() < 2 {
            return Err(MessageError::Malformed(format!(
                "message needs at least 2 fields, got {}",
                fields.len()
            )));
        }
        let rest = fields.split_off(2);
        let tag = fields[0]
            .as_i64()
            .ok_or_else(|| MessageError::Malformed("message type must be an integer".into()))?;
        let msg_type = MessageType::try_from(tag).map_err(MessageError::UnknownMessageType)?;
        let second = fields.pop().unwrap_or_default();

        match msg_type {
            MessageType::Response => {
                let id = request_id(&second)?;
                let value = rest.into_iter().next().unwrap_or_default();
                Ok(Response::Result { id, value })
            }
            MessageType::Error => {
                let id = request_id(&second)?;
                if rest.len() < 4 {
                    return Err(MessageError::Malformed(format!(
                        "error message needs 4 fields after the id, got {}",
                        rest.len()
                    )));
                }
                let kind = rest[0].to_text();
                let args = match &rest[1] {
                    Value::List(items) => items.clone(),
                    Value::None => Vec::new(),
                    single => vec![single.clone()],
                };
                let traceback = match &rest[3] {
                    Value::None => String::new(),
                    other => other.to_text(),
                };
                Ok(Response::Error {
                    id,
                    failure: RemoteFailure {
                        kind,
                        args,
                        traceback,
                    },
                })
            }
            MessageType::Event => {
                let payload = match rest.into_iter().next() {
                    Some(Value::List(items)) => items,
                    Some(Value::None) | None => Vec::new(),
                    Some(single) => vec![single],
                };
                Ok(Response::Event(RpcEvent {
                    name: second,
                    payload,
                }))
            }
        }
    }

    /// The request id this message answers, if it answers one.
    pub fn request_id(&self) -> Option<i64> {
        match self {
            Response::Result { id, .. } | Response::Error { id, .. } => Some(*id),
            Response::Event(_) => None,
        }
    }
}

fn request_id(v: &Value) -> Result<i64, MessageError> {
    v.as_i64()
        .ok_or_else(|| MessageError::Malformed(format!("request id must be an integer, got {v}")))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape_is_single_element_batch() {
        // Arrange
        let mut kwargs = Kwargs::new();
        kwargs.insert("client_version".into(), Value::from("deluge-client"));
        let req = Request::new(
            3,
            "daemon.login",
            vec![Value::from("localclient"), Value::from("pw")],
            kwargs,
        );

        // Act
        let v = req.to_value();

        // Assert
        let batch = v.as_list().unwrap();
        assert_eq!(batch.len(), 1);
        let fields = batch[0].as_list().unwrap();
        assert_eq!(fields[0], Value::Int(3));
        assert_eq!(fields[1], Value::from("daemon.login"));
        assert_eq!(fields[2].as_list().unwrap().len(), 2);
        assert_eq!(
            fields[3].get("client_version"),
            Some(&Value::from("deluge-client"))
        );
    }

    #[test]
    fn test_request_payload_decodes_back() {
        let req = Request::new(7, "core.get_torrents", vec![], Kwargs::new());
        assert_eq!(Request::decode_payload(&req.encode_payload()).unwrap(), req);
    }

    #[test]
    fn test_decode_result_message() {
        // Arrange
        let payload = serialize(&Value::List(vec![
            Value::Int(1),
            Value::Int(2),
            Value::from("2.1.1"),
        ]));

        // Act
        let resp = Response::decode_payload(&payload, true).unwrap();

        // Assert
        assert_eq!(
            resp,
            Response::Result {
                id: 2,
                value: Value::from("2.1.1")
            }
        );
    }

    #[test]
    fn test_decode_error_message_builds_remote_failure() {
        // Arrange
        let payload = serialize(&Value::List(vec![
            Value::Int(2),
            Value::Int(5),
            Value::bytes("AuthenticationRequired"),
            Value::List(vec![Value::bytes("bad creds")]),
            Value::None,
            Value::bytes("trace"),
        ]));

        // Act
        let resp = Response::decode_payload(&payload, false).unwrap();

        // Assert
        let Response::Error { id, failure } = resp else {
            panic!("expected an error response");
        };
        assert_eq!(id, 5);
        assert_eq!(failure.kind, "AuthenticationRequired");
        assert_eq!(failure.message(), "bad creds\ntrace");
    }

    #[test]
    fn test_remote_failure_message_joins_args() {
        let failure = RemoteFailure {
            kind: "InvalidTorrentError".into(),
            args: vec![Value::from("a"), Value::Int(3)],
            traceback: "tb".into(),
        };
        assert_eq!(failure.message(), "a, 3\ntb");
    }

    #[test]
    fn test_decode_event_message() {
        let payload = serialize(&Value::List(vec![
            Value::Int(3),
            Value::from("TorrentAddedEvent"),
            Value::List(vec![Value::from("abc123"), Value::Bool(false)]),
        ]));

        let resp = Response::decode_payload(&payload, true).unwrap();

        assert_eq!(resp.request_id(), None);
        assert_eq!(
            resp,
            Response::Event(RpcEvent {
                name: Value::from("TorrentAddedEvent"),
                payload: vec![Value::from("abc123"), Value::Bool(false)],
            })
        );
    }

    #[test]
    fn test_unknown_message_type_is_rejected() {
        let payload = serialize(&Value::List(vec![Value::Int(9), Value::Int(1)]));
        assert!(matches!(
            Response::decode_payload(&payload, true),
            Err(MessageError::UnknownMessageType(9))
        ));
    }

    #[test]
    fn test_non_list_message_is_malformed() {
        let payload = serialize(&Value::from("hello"));
        assert!(matches!(
            Response::decode_payload(&payload, true),
            Err(MessageError::Malformed(_))
        ));
    }

    #[test]
    fn test_short_error_message_is_malformed() {
        let payload = serialize(&Value::List(vec![
            Value::Int(2),
            Value::Int(1),
            Value::from("Oops"),
        ]));
        assert!(matches!(
            Response::decode_payload(&payload, true),
            Err(MessageError::Malformed(_))
        ));
    }
}
