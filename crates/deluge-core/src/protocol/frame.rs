//! Wire framing: a 5-byte header followed by a zlib-compressed payload.
//!
//! Wire format:
//! ```text
//! [version:1][payload_len:4][zlib(payload):payload_len]
//! ```
//! `payload_len` is the length of the *compressed* bytes, big-endian.
//!
//! # Streaming decode (for beginners)
//!
//! TCP (and TLS on top of it) is a byte stream: one read may return half a
//! header, or the tail of one frame and the start of the next.  The
//! [`FrameDecoder`] owns an accumulation buffer; the caller pushes whatever
//! bytes arrived and asks for the next complete frame.  Bytes past the end of
//! a frame stay in the buffer for the following call.

use thiserror::Error;
use tracing::trace;

use crate::codec::{compress, decompress, CodecError};

/// Header size: 1 version byte + 4 length bytes.
pub const HEADER_SIZE: usize = 5;

/// Errors raised while framing or unframing a message.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The first header byte is not the session's protocol version.
    #[error("invalid header: expected protocol version {expected} as first byte, got {actual}")]
    InvalidHeader { expected: u8, actual: u8 },

    /// The payload is larger than the 32-bit length field can describe.
    #[error("payload of {0} bytes does not fit in a frame")]
    PayloadTooLarge(usize),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Compresses `payload` and prefixes it with the frame header.
///
/// # Errors
///
/// Returns [`FrameError::PayloadTooLarge`] if the compressed payload exceeds
/// `u32::MAX` bytes, or [`FrameError::Codec`] if compression fails.
///
/// # Examples
///
/// ```rust
/// use deluge_core::protocol::frame::{encode_frame, FrameDecoder};
///
/// let frame = encode_frame(1, b"payload").unwrap();
/// assert_eq!(frame[0], 1);
///
/// let mut decoder = FrameDecoder::new(1);
/// decoder.push(&frame);
/// assert_eq!(decoder.next_frame().unwrap().unwrap(), b"payload");
/// ```
pub fn encode_frame(version: u8, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let body = compress(payload)?;
    let len = u32::try_from(body.len()).map_err(|_| FrameError::PayloadTooLarge(body.len()))?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
    buf.push(version);
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Incremental decoder for frames arriving over a byte stream.
#[derive(Debug)]
pub struct FrameDecoder {
    expected_version: u8,
    buffer: Vec<u8>,
}

impl FrameDecoder {
    /// Creates a decoder that accepts only frames carrying `expected_version`.
    pub fn new(expected_version: u8) -> Self {
        Self {
            expected_version,
            buffer: Vec::new(),
        }
    }

    pub fn expected_version(&self) -> u8 {
        self.expected_version
    }

    /// Appends freshly received bytes to the accumulation buffer.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Number of bytes buffered but not yet returned as part of a frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Extracts the next complete frame and returns its decompressed payload.
    ///
    /// Returns `Ok(None)` when more bytes are needed.  The version byte is
    /// checked as soon as it is available, so a bad header is reported
    /// without waiting for (or touching) the bytes that follow it.
    ///
    /// # Errors
    ///
    /// - [`FrameError::InvalidHeader`] if the first byte is not the expected
    ///   version.  The buffer is left untouched.
    /// - [`FrameError::Codec`] if the payload does not decompress.  The frame
    ///   is consumed.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let Some(&version) = self.buffer.first() else {
            return Ok(None);
        };
        if version != self.expected_version {
            return Err(FrameError::InvalidHeader {
                expected: self.expected_version,
                actual: version,
            });
        }
        if self.buffer.len() < HEADER_SIZE {
            return Ok(None);
        }

        let payload_len =
            u32::from_be_bytes([self.buffer[1], self.buffer[2], self.buffer[3], self.buffer[4]]) as usize;
        let total = HEADER_SIZE + payload_len;
        if self.buffer.len() < total {
            return Ok(None);
        }

        let frame: Vec<u8> = self.buffer.drain(..total).collect();
        let payload = decompress(&frame[HEADER_SIZE..])?;
        trace!(
            compressed = payload_len,
            decompressed = payload.len(),
            remaining = self.buffer.len(),
            "frame decoded"
        );
        Ok(Some(payload))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
