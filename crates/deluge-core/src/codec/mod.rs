//! Value codec: the [`Value`] model, rencode (de)serialization, and zlib.
//!
//! The codec knows nothing about RPC; it only turns values into bytes and
//! back.  [`crate::protocol`] builds the message shapes on top of it.

pub mod compress;
pub mod rencode;
pub mod value;

use thiserror::Error;

pub use compress::{compress, decompress};
pub use rencode::{deserialize, serialize};
pub use value::Value;

/// Errors raised while encoding, decoding, or (de)compressing payloads.
///
/// None of these are transient: they mean the byte stream is not what the
/// peer should have sent, so the caller must not retry on the same stream.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The input ended in the middle of a value.
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEnd { offset: usize },

    /// A type code that the encoding does not define.
    #[error("unknown type code: 0x{0:02X}")]
    UnknownTypeCode(u8),

    /// A `<len>:` string prefix that is not a decimal number.
    #[error("invalid string length prefix at offset {offset}")]
    InvalidLength { offset: usize },

    /// A decimal integer that is malformed or does not fit in 64 bits.
    #[error("invalid or out-of-range integer at offset {offset}")]
    InvalidInteger { offset: usize },

    /// Lists or dicts nested deeper than the decoder allows.
    #[error("values nested deeper than {0} levels")]
    TooDeep(usize),

    /// Bytes remained after the top-level value was decoded.
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),

    #[error("compression failed: {0}")]
    Compress(#[source] std::io::Error),

    #[error("decompression failed: {0}")]
    Decompress(#[source] std::io::Error),
}
