//! Errors surfaced by [`DelugeClient`](super::client::DelugeClient).

use deluge_core::{CodecError, FrameError, MessageError};
use thiserror::Error;

use crate::infrastructure::transport::TransportError;

/// Everything a call or connect can fail with.
///
/// The variants fall in three groups:
///
/// - **transport failures** (`ConnectionLost`, `CallTimeout`, `Transport`):
///   the stream broke; a reconnect may help.
/// - **protocol failures** (`InvalidHeader`, `UnsupportedDaemon`, `Codec`,
///   `Protocol`): the two sides disagree about the stream; never retried.
/// - **`Remote`**: the daemon ran the call and raised an error.
#[derive(Debug, Error)]
pub enum DelugeError {
    /// The daemon closed the stream while a reply was pending.
    #[error("connection to the daemon was lost")]
    ConnectionLost,

    /// No reply arrived within the socket timeout.
    #[error("timed out waiting for the daemon")]
    CallTimeout,

    #[error(transparent)]
    Transport(TransportError),

    #[error("expected protocol version {expected} as first byte in reply, got {actual}")]
    InvalidHeader { expected: u8, actual: u8 },

    /// The peer did not answer the version probe the way a 2.x daemon does.
    #[error("unsupported daemon: {0}")]
    UnsupportedDaemon(String),

    /// Automatic reconnect did not recover the call.
    #[error("failed to reconnect to the daemon: {source}")]
    FailedToReconnect {
        #[source]
        source: Box<DelugeError>,
    },

    /// An exception raised inside the daemon.
    #[error("{kind}: {message}")]
    Remote {
        /// Remote exception type name, e.g. `AuthenticationRequired`.
        kind: String,
        /// Exception arguments joined by `", "`, a newline, then the traceback.
        message: String,
        traceback: String,
    },

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A reply that decoded but made no sense in context.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A call was made without an established session.
    #[error("not connected to a daemon")]
    NotConnected,
}

impl DelugeError {
    /// `true` for failures the reconnect policy may recover from.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            DelugeError::ConnectionLost | DelugeError::CallTimeout | DelugeError::Transport(_)
        )
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, DelugeError::Remote { .. })
    }

    /// The remote exception type name, if this is a remote error.
    pub fn remote_kind(&self) -> Option<&str> {
        match self {
            DelugeError::Remote { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

impl From<TransportError> for DelugeError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Timeout => DelugeError::CallTimeout,
            other => DelugeError::Transport(other),
        }
    }
}

impl From<FrameError> for DelugeError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::InvalidHeader { expected, actual } => {
                DelugeError::InvalidHeader { expected, actual }
            }
            FrameError::Codec(c) => DelugeError::Codec(c),
            other => DelugeError::Protocol(other.to_string()),
        }
    }
}

impl From<MessageError> for DelugeError {
    fn from(e: MessageError) -> Self {
        match e {
            MessageError::Codec(c) => DelugeError::Codec(c),
            other => DelugeError::Protocol(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(DelugeError::ConnectionLost.is_transport_failure());
        assert!(DelugeError::CallTimeout.is_transport_failure());
        assert!(DelugeError::Transport(TransportError::Closed).is_transport_failure());

        assert!(!DelugeError::InvalidHeader {
            expected: 1,
            actual: 2
        }
        .is_transport_failure());
        assert!(!DelugeError::UnsupportedDaemon("x".into()).is_transport_failure());
        assert!(!DelugeError::Protocol("x".into()).is_transport_failure());
        assert!(!DelugeError::NotConnected.is_transport_failure());
    }

    #[test]
    fn test_transport_timeout_becomes_call_timeout() {
        assert!(matches!(
            DelugeError::from(TransportError::Timeout),
            DelugeError::CallTimeout
        ));
    }

    #[test]
    fn test_frame_header_error_keeps_versions() {
        let err = DelugeError::from(FrameError::InvalidHeader {
            expected: 1,
            actual: 0,
        });
        assert!(matches!(
            err,
            DelugeError::InvalidHeader {
                expected: 1,
                actual: 0
            }
        ));
    }

    #[test]
    fn test_remote_display_and_kind() {
        // Arrange
        let err = DelugeError::Remote {
            kind: "AuthenticationRequired".into(),
            message: "Username and password required\ntb".into(),
            traceback: "tb".into(),
        };

        // Act / Assert
        assert_eq!(err.remote_kind(), Some("AuthenticationRequired"));
        assert!(err.is_remote());
        assert!(err
            .to_string()
            .starts_with("AuthenticationRequired: Username and password required"));
    }
}
