//! TLS-over-TCP transport using `rustls`.
//!
//! # Certificate verification (for beginners)
//!
//! A Deluge daemon generates a self-signed certificate on first start, so
//! there is no certificate authority that could vouch for it.  The client
//! therefore accepts any server certificate: the channel is encrypted, but
//! the peer is not authenticated.  The daemon's own login check is what keeps
//! strangers out.
//!
//! # Legacy fallback
//!
//! Some old daemons cannot complete a modern handshake.  When the first
//! attempt fails with a protocol-version alert, the connector retries once on
//! a fresh TCP connection with TLS 1.2 as the only offered version.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{
    AlertDescription, ClientConfig, ClientConnection, DigitallySignedStruct, SignatureScheme,
    StreamOwned,
};
use tracing::{debug, info, warn};

use super::{Connector, Transport, TransportError};

/// Default socket timeout, applied to connect, read and write.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

// ── Connector ─────────────────────────────────────────────────────────────────

/// Opens [`TlsSession`]s with a fixed socket timeout.
#[derive(Debug, Clone)]
pub struct TlsConnector {
    timeout: Duration,
}

impl TlsConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn open_with(
        &self,
        host: &str,
        port: u16,
        legacy: bool,
    ) -> Result<TlsSession, TransportError> {
        let config = client_config(legacy)?;
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| TransportError::InvalidHost(host.to_string()))?;

        let mut sock = connect_tcp(host, port, self.timeout)?;
        let mut conn = ClientConnection::new(config, server_name)?;
        while conn.is_handshaking() {
            conn.complete_io(&mut sock).map_err(classify_io)?;
        }
        debug!(
            host,
            port,
            version = ?conn.protocol_version(),
            "TLS handshake complete"
        );

        Ok(TlsSession {
            stream: Some(StreamOwned::new(conn, sock)),
        })
    }
}

impl Default for TlsConnector {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl Connector for TlsConnector {
    fn open(&self, host: &str, port: u16) -> Result<Box<dyn Transport>, TransportError> {
        let session = match self.open_with(host, port, false) {
            Err(TransportError::Tls(e)) if is_version_incompatibility(&e) => {
                warn!(host, port, error = %e, "TLS handshake rejected, retrying with TLS 1.2 only");
                self.open_with(host, port, true)?
            }
            other => other?,
        };
        info!(host, port, "TLS session established");
        Ok(Box::new(session))
    }
}

/// `true` for handshake failures caused by the two sides not sharing a
/// protocol version.
fn is_version_incompatibility(err: &rustls::Error) -> bool {
    matches!(
        err,
        rustls::Error::AlertReceived(AlertDescription::ProtocolVersion)
            | rustls::Error::PeerIncompatible(_)
    )
}

fn client_config(legacy: bool) -> Result<Arc<ClientConfig>, rustls::Error> {
    let provider = Arc::new(ring::default_provider());
    let versions: &[&'static rustls::SupportedProtocolVersion] = if legacy {
        &[&rustls::version::TLS12]
    } else {
        rustls::DEFAULT_VERSIONS
    };

    let config = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_protocol_versions(versions)?
        .dangerous()
        .with_custom_certificate_verifier(SkipServerVerification::new(provider))
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// Connects to the first resolved address that accepts, then applies the
/// read and write timeouts.
fn connect_tcp(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, TransportError> {
    let addr = format!("{host}:{port}");
    let resolved = (host, port)
        .to_socket_addrs()
        .map_err(|source| TransportError::ConnectFailed {
            addr: addr.clone(),
            source,
        })?;

    let mut last_err = None;
    for candidate in resolved {
        match TcpStream::connect_timeout(&candidate, timeout) {
            Ok(sock) => {
                sock.set_read_timeout(Some(timeout))?;
                sock.set_write_timeout(Some(timeout))?;
                sock.set_nodelay(true)?;
                debug!(%candidate, "TCP connected");
                return Ok(sock);
            }
            Err(e) => {
                debug!(%candidate, error = %e, "TCP connect failed");
                last_err = Some(e);
            }
        }
    }

    Err(TransportError::ConnectFailed {
        addr,
        source: last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
        }),
    })
}

/// Maps socket-level I/O errors onto [`TransportError`].
///
/// Timed-out reads surface as `WouldBlock` on Unix and `TimedOut` on
/// Windows.  `rustls` wraps its own errors in `io::Error` with kind
/// `InvalidData`; those are unwrapped back into [`TransportError::Tls`].
fn classify_io(err: io::Error) -> TransportError {
    if matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    ) {
        return TransportError::Timeout;
    }
    if let Some(tls) = err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
    {
        return TransportError::Tls(tls.clone());
    }
    TransportError::Io(err)
}

// ── Session ───────────────────────────────────────────────────────────────────

/// One established TLS stream.
pub struct TlsSession {
    stream: Option<StreamOwned<ClientConnection, TcpStream>>,
}

impl Transport for TlsSession {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        stream.write_all(bytes).map_err(classify_io)?;
        stream.flush().map_err(classify_io)
    }

    fn receive(&mut self, max_bytes: usize) -> Result<Vec<u8>, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        let mut buf = vec![0u8; max_bytes.max(1)];
        match stream.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            // Peer closed the TCP stream without a close_notify.
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(Vec::new()),
            Err(e) => Err(classify_io(e)),
        }
    }

    fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.conn.send_close_notify();
            // Best effort: the peer may already be gone.
            let _ = stream.conn.complete_io(&mut stream.sock);
            let _ = stream.sock.shutdown(Shutdown::Both);
            debug!("TLS session closed");
        }
    }
}

impl Drop for TlsSession {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Certificate verifier ──────────────────────────────────────────────────────

/// Accepts any server certificate while still checking handshake
/// signatures with the provider's algorithms.
#[derive(Debug)]
struct SkipServerVerification {
    provider: Arc<CryptoProvider>,
}

impl SkipServerVerification {
    fn new(provider: Arc<CryptoProvider>) -> Arc<Self> {
        Arc::new(Self { provider })
    }
}

impl ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_default_timeout_is_twenty_seconds() {
        assert_eq!(TlsConnector::default().timeout(), Duration::from_secs(20));
    }

    #[test]
    fn test_client_config_builds_for_both_modes() {
        assert!(client_config(false).is_ok());
        assert!(client_config(true).is_ok());
    }

    #[test]
    fn test_protocol_version_alert_triggers_legacy_retry() {
        assert!(is_version_incompatibility(&rustls::Error::AlertReceived(
            AlertDescription::ProtocolVersion
        )));
        assert!(!is_version_incompatibility(&rustls::Error::AlertReceived(
            AlertDescription::HandshakeFailure
        )));
        assert!(!is_version_incompatibility(&rustls::Error::DecryptError));
    }

    #[test]
    fn test_classify_io_maps_timeouts() {
        assert!(matches!(
            classify_io(io::Error::from(io::ErrorKind::WouldBlock)),
            TransportError::Timeout
        ));
        assert!(matches!(
            classify_io(io::Error::from(io::ErrorKind::TimedOut)),
            TransportError::Timeout
        ));
    }

    #[test]
    fn test_classify_io_unwraps_rustls_errors() {
        // Arrange: rustls reports record-layer failures this way
        let err = io::Error::new(io::ErrorKind::InvalidData, rustls::Error::DecryptError);

        // Act / Assert
        assert!(matches!(
            classify_io(err),
            TransportError::Tls(rustls::Error::DecryptError)
        ));
    }

    #[test]
    fn test_classify_io_keeps_other_errors() {
        let err = io::Error::from(io::ErrorKind::ConnectionReset);
        assert!(matches!(classify_io(err), TransportError::Io(_)));
    }

    #[test]
    fn test_open_refused_port_is_connect_failed() {
        // Arrange: bind then drop to find a port nothing listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let connector = TlsConnector::new(Duration::from_secs(2));

        // Act
        let result = connector.open("127.0.0.1", port);

        // Assert
        assert!(matches!(result, Err(TransportError::ConnectFailed { .. })));
    }

    #[test]
    fn test_session_handshake_timeout_against_silent_peer() {
        // Arrange: a listener that accepts but never speaks TLS
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let connector = TlsConnector::new(Duration::from_millis(200));

        // Act
        let result = connector.open("127.0.0.1", port);

        // Assert
        assert!(matches!(result, Err(TransportError::Timeout)));
        drop(listener);
    }
}
