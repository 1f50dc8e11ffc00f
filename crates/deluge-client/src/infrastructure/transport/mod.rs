//! Byte-stream transport to the daemon.
//!
//! The call engine never touches sockets directly.  It talks to a
//! [`Transport`] (one open, encrypted duplex stream) obtained from a
//! [`Connector`].  Production code uses [`tls::TlsConnector`]; tests plug in
//! the scripted in-memory pair from [`mock`].

pub mod mock;
pub mod tls;

use thiserror::Error;

/// Errors raised by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No resolved address accepted the TCP connection.
    #[error("failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The host name cannot be used as a TLS server name.
    #[error("invalid host name: {0}")]
    InvalidHost(String),

    /// A send or receive did not complete within the configured timeout.
    #[error("timed out")]
    Timeout,

    /// The TLS layer failed (handshake or record processing).
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Any other socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport was used after [`Transport::close`].
    #[error("transport is closed")]
    Closed,
}

/// One open, encrypted byte stream to the daemon.
pub trait Transport: Send {
    /// Writes every byte of `bytes` or fails.
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Blocks until at least one byte is available, then returns up to
    /// `max_bytes` of them.
    ///
    /// An empty vector means the peer closed the stream.  A read that waits
    /// longer than the configured timeout fails with
    /// [`TransportError::Timeout`].
    fn receive(&mut self, max_bytes: usize) -> Result<Vec<u8>, TransportError>;

    /// Releases the stream.  Idempotent; later sends and receives fail with
    /// [`TransportError::Closed`].
    fn close(&mut self);
}

/// Opens transports to a daemon.
#[cfg_attr(test, mockall::automock)]
pub trait Connector {
    fn open(&self, host: &str, port: u16) -> Result<Box<dyn Transport>, TransportError>;
}
