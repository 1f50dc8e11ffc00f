//! rencode: the compact, self-describing binary encoding used by the daemon.
//!
//! Every value starts with a one-byte type code.  Small integers, short
//! strings, short lists, and small mappings are packed into the type code
//! itself; everything else is a type code followed by a fixed-width big-endian
//! number or a terminated sequence.
//!
//! ```text
//! 0..=43     positive int (value = code)       66        float32
//! 44         float64                           67/68/69  true/false/none
//! '0'..'9'   "<len>:" + bytes                  70..=101  negative int (69 - code)
//! 59         list ... 127                      102..=126 dict, code - 102 entries
//! 60         dict ... 127                      128..=191 bytes, code - 128 long
//! 61         decimal int text ... 127          192..=255 list, code - 192 items
//! 62..=65    int8 / int16 / int32 / int64
//! ```

use super::value::Value;
use super::CodecError;

const CHR_LIST: u8 = 59;
const CHR_DICT: u8 = 60;
const CHR_INT: u8 = 61;
const CHR_INT1: u8 = 62;
const CHR_INT2: u8 = 63;
const CHR_INT4: u8 = 64;
const CHR_INT8: u8 = 65;
const CHR_FLOAT32: u8 = 66;
const CHR_FLOAT64: u8 = 44;
const CHR_TRUE: u8 = 67;
const CHR_FALSE: u8 = 68;
const CHR_NONE: u8 = 69;
const CHR_TERM: u8 = 127;

const INT_POS_FIXED_START: u8 = 0;
const INT_POS_FIXED_COUNT: usize = 44;
const INT_NEG_FIXED_START: u8 = 70;
const INT_NEG_FIXED_COUNT: usize = 32;
const DICT_FIXED_START: u8 = 102;
const DICT_FIXED_COUNT: usize = 25;
const STR_FIXED_START: u8 = 128;
const STR_FIXED_COUNT: usize = 64;
const LIST_FIXED_START: u8 = STR_FIXED_START + STR_FIXED_COUNT as u8;
const LIST_FIXED_COUNT: usize = 64;

/// Longest decimal integer text accepted after [`CHR_INT`].
const MAX_INT_LENGTH: usize = 64;

/// Nesting limit for lists and dicts, so hostile input cannot overflow the stack.
const MAX_DEPTH: usize = 256;

// ── Public API ────────────────────────────────────────────────────────────────

/// Serializes `value` into rencode bytes.
///
/// Floats are always written as float64 so no precision is lost.
///
/// # Examples
///
/// ```rust
/// use deluge_core::codec::{deserialize, serialize, Value};
///
/// let v = Value::List(vec![Value::Int(1), Value::from("daemon.info")]);
/// let bytes = serialize(&v);
/// assert_eq!(deserialize(&bytes, true).unwrap(), v);
/// ```
pub fn serialize(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value(&mut buf, value);
    buf
}

/// Deserializes exactly one value from `bytes`.
///
/// With `decode_utf8` set, strings that are valid UTF-8 come back as
/// [`Value::Str`] and the rest as [`Value::Bytes`]; without it every string
/// comes back as [`Value::Bytes`].
///
/// # Errors
///
/// Returns [`CodecError`] for truncated input, unknown type codes, malformed
/// lengths or integers, excessive nesting, and bytes left over after the
/// value.
pub fn deserialize(bytes: &[u8], decode_utf8: bool) -> Result<Value, CodecError> {
    let mut decoder = Decoder {
        buf: bytes,
        pos: 0,
        decode_utf8,
    };
    let value = decoder.decode_value(0)?;
    if decoder.pos != bytes.len() {
        return Err(CodecError::TrailingBytes(bytes.len() - decoder.pos));
    }
    Ok(value)
}

// ── Encoding ──────────────────────────────────────────────────────────────────

fn encode_value(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::None => buf.push(CHR_NONE),
        Value::Bool(true) => buf.push(CHR_TRUE),
        Value::Bool(false) => buf.push(CHR_FALSE),
        Value::Int(i) => encode_int(buf, *i),
        Value::Float(x) => {
            buf.push(CHR_FLOAT64);
            buf.extend_from_slice(&x.to_be_bytes());
        }
        Value::Bytes(b) => encode_str(buf, b),
        Value::Str(s) => encode_str(buf, s.as_bytes()),
        Value::List(items) => {
            if items.len() < LIST_FIXED_COUNT {
                buf.push(LIST_FIXED_START + items.len() as u8);
                for item in items {
                    encode_value(buf, item);
                }
            } else {
                buf.push(CHR_LIST);
                for item in items {
                    encode_value(buf, item);
                }
                buf.push(CHR_TERM);
            }
        }
        Value::Dict(entries) => {
            if entries.len() < DICT_FIXED_COUNT {
                buf.push(DICT_FIXED_START + entries.len() as u8);
            } else {
                buf.push(CHR_DICT);
            }
            for (k, v) in entries {
                encode_value(buf, k);
                encode_value(buf, v);
            }
            if entries.len() >= DICT_FIXED_COUNT {
                buf.push(CHR_TERM);
            }
        }
    }
}

fn encode_int(buf: &mut Vec<u8>, i: i64) {
    if (0..INT_POS_FIXED_COUNT as i64).contains(&i) {
        buf.push(INT_POS_FIXED_START + i as u8);
    } else if (-(INT_NEG_FIXED_COUNT as i64)..0).contains(&i) {
        buf.push((INT_NEG_FIXED_START as i64 - 1 - i) as u8);
    } else if let Ok(v) = i8::try_from(i) {
        buf.push(CHR_INT1);
        buf.extend_from_slice(&v.to_be_bytes());
    } else if let Ok(v) = i16::try_from(i) {
        buf.push(CHR_INT2);
        buf.extend_from_slice(&v.to_be_bytes());
    } else if let Ok(v) = i32::try_from(i) {
        buf.push(CHR_INT4);
        buf.extend_from_slice(&v.to_be_bytes());
    } else {
        buf.push(CHR_INT8);
        buf.extend_from_slice(&i.to_be_bytes());
    }
}

fn encode_str(buf: &mut Vec<u8>, bytes: &[u8]) {
    if bytes.len() < STR_FIXED_COUNT {
        buf.push(STR_FIXED_START + bytes.len() as u8);
    } else {
        buf.extend_from_slice(bytes.len().to_string().as_bytes());
        buf.push(b':');
    }
    buf.extend_from_slice(bytes);
}

// ── Decoding ──────────────────────────────────────────────────────────────────

struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
    decode_utf8: bool,
}

impl<'a> Decoder<'a> {
    fn decode_value(&mut self, depth: usize) -> Result<Value, CodecError> {
        if depth > MAX_DEPTH {
            return Err(CodecError::TooDeep(MAX_DEPTH));
        }
        let code = self.next_byte()?;
        match code {
            c if (c as usize) < INT_POS_FIXED_COUNT => Ok(Value::Int(i64::from(c - INT_POS_FIXED_START))),
            CHR_FLOAT64 => {
                let raw = self.take_array::<8>()?;
                Ok(Value::Float(f64::from_be_bytes(raw)))
            }
            CHR_FLOAT32 => {
                let raw = self.take_array::<4>()?;
                Ok(Value::Float(f64::from(f32::from_be_bytes(raw))))
            }
            b'0'..=b'9' => {
                let len = self.read_length(code)?;
                let bytes = self.take(len)?;
                Ok(self.make_str(bytes))
            }
            CHR_LIST => {
                let mut items = Vec::new();
                while self.peek_byte()? != CHR_TERM {
                    items.push(self.decode_value(depth + 1)?);
                }
                self.pos += 1;
                Ok(Value::List(items))
            }
            CHR_DICT => {
                let mut entries = Vec::new();
                while self.peek_byte()? != CHR_TERM {
                    let k = self.decode_value(depth + 1)?;
                    let v = self.decode_value(depth + 1)?;
                    entries.push((k, v));
                }
                self.pos += 1;
                Ok(Value::Dict(entries))
            }
            CHR_INT => self.read_decimal_int().map(Value::Int),
            CHR_INT1 => Ok(Value::Int(i64::from(i8::from_be_bytes(self.take_array::<1>()?)))),
            CHR_INT2 => Ok(Value::Int(i64::from(i16::from_be_bytes(self.take_array::<2>()?)))),
            CHR_INT4 => Ok(Value::Int(i64::from(i32::from_be_bytes(self.take_array::<4>()?)))),
            CHR_INT8 => Ok(Value::Int(i64::from_be_bytes(self.take_array::<8>()?))),
            CHR_TRUE => Ok(Value::Bool(true)),
            CHR_FALSE => Ok(Value::Bool(false)),
            CHR_NONE => Ok(Value::None),
            c if (INT_NEG_FIXED_START..INT_NEG_FIXED_START + INT_NEG_FIXED_COUNT as u8).contains(&c) => {
                Ok(Value::Int(i64::from(INT_NEG_FIXED_START) - 1 - i64::from(c)))
            }
            c if (DICT_FIXED_START..DICT_FIXED_START + DICT_FIXED_COUNT as u8).contains(&c) => {
                let count = (c - DICT_FIXED_START) as usize;
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    let k = self.decode_value(depth + 1)?;
                    let v = self.decode_value(depth + 1)?;
                    entries.push((k, v));
                }
                Ok(Value::Dict(entries))
            }
            c if (STR_FIXED_START..LIST_FIXED_START).contains(&c) => {
                let bytes = self.take((c - STR_FIXED_START) as usize)?;
                Ok(self.make_str(bytes))
            }
            c if c >= LIST_FIXED_START => {
                let count = (c - LIST_FIXED_START) as usize;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.decode_value(depth + 1)?);
                }
                Ok(Value::List(items))
            }
            other => Err(CodecError::UnknownTypeCode(other)),
        }
    }

    fn make_str(&self, bytes: &[u8]) -> Value {
        if self.decode_utf8 {
            if let Ok(s) = std::str::from_utf8(bytes) {
                return Value::Str(s.to_string());
            }
        }
        Value::Bytes(bytes.to_vec())
    }

    /// Reads the `<digits>:` length prefix; `first` is the already-consumed first digit.
    fn read_length(&mut self, first: u8) -> Result<usize, CodecError> {
        let start = self.pos - 1;
        let colon = self.buf[self.pos..]
            .iter()
            .position(|&b| b == b':')
            .ok_or(CodecError::UnexpectedEnd { offset: self.buf.len() })?;
        let digits = &self.buf[start..self.pos + colon];
        debug_assert_eq!(digits[0], first);
        let len = std::str::from_utf8(digits)
            .ok()
            .filter(|d| d.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|d| d.parse::<usize>().ok())
            .ok_or(CodecError::InvalidLength { offset: start })?;
        self.pos += colon + 1;
        Ok(len)
    }

    fn read_decimal_int(&mut self) -> Result<i64, CodecError> {
        let start = self.pos;
        let end = self.buf[start..]
            .iter()
            .position(|&b| b == CHR_TERM)
            .ok_or(CodecError::UnexpectedEnd { offset: self.buf.len() })?;
        if end > MAX_INT_LENGTH {
            return Err(CodecError::InvalidInteger { offset: start });
        }
        let text = std::str::from_utf8(&self.buf[start..start + end])
            .map_err(|_| CodecError::InvalidInteger { offset: start })?;
        let value = text
            .parse::<i64>()
            .map_err(|_| CodecError::InvalidInteger { offset: start })?;
        self.pos = start + end + 1;
        Ok(value)
    }

    fn next_byte(&mut self) -> Result<u8, CodecError> {
        let b = self.peek_byte()?;
        self.pos += 1;
        Ok(b)
    }

    fn peek_byte(&self) -> Result<u8, CodecError> {
        self.buf
            .get(self.pos)
            .copied()
            .ok_or(CodecError::UnexpectedEnd { offset: self.pos })
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or(CodecError::UnexpectedEnd { offset: self.buf.len() })?;
        let buf: &'a [u8] = self.buf;
        let slice = &buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let slice = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(v: &Value) -> Value {
        deserialize(&serialize(v), true).expect("decode failed")
    }

    // ── Integers ──────────────────────────────────────────────────────────────

    #[test]
    fn test_small_positive_int_is_single_byte() {
        assert_eq!(serialize(&Value::Int(0)), vec![0]);
        assert_eq!(serialize(&Value::Int(43)), vec![43]);
    }

    #[test]
    fn test_small_negative_int_is_single_byte() {
        assert_eq!(serialize(&Value::Int(-1)), vec![70]);
        assert_eq!(serialize(&Value::Int(-32)), vec![101]);
    }

    #[test]
    fn test_int_width_boundaries() {
        assert_eq!(serialize(&Value::Int(44)), vec![CHR_INT1, 44]);
        assert_eq!(serialize(&Value::Int(-33)), vec![CHR_INT1, 0xDF]);
        assert_eq!(serialize(&Value::Int(128)), vec![CHR_INT2, 0x00, 0x80]);
        assert_eq!(serialize(&Value::Int(40_000))[0], CHR_INT4);
        assert_eq!(serialize(&Value::Int(1 << 40))[0], CHR_INT8);
    }

    #[test]
    fn test_int_boundaries_round_trip() {
        for i in [
            0,
            43,
            44,
            -1,
            -32,
            -33,
            127,
            -128,
            128,
            32_767,
            -32_768,
            32_768,
            i64::from(i32::MAX),
            i64::from(i32::MIN),
            i64::MAX,
            i64::MIN,
        ] {
            assert_eq!(round_trip(&Value::Int(i)), Value::Int(i), "int {i}");
        }
    }

    #[test]
    fn test_decimal_int_text_decodes() {
        let mut bytes = vec![CHR_INT];
        bytes.extend_from_slice(b"-123456789012");
        bytes.push(CHR_TERM);
        assert_eq!(deserialize(&bytes, true).unwrap(), Value::Int(-123_456_789_012));
    }

    #[test]
    fn test_decimal_int_overflow_is_error() {
        let mut bytes = vec![CHR_INT];
        bytes.extend_from_slice(b"99999999999999999999999");
        bytes.push(CHR_TERM);
        assert!(matches!(
            deserialize(&bytes, true),
            Err(CodecError::InvalidInteger { .. })
        ));
    }

    // ── Strings ───────────────────────────────────────────────────────────────

    #[test]
    fn test_short_string_uses_fixed_code() {
        assert_eq!(serialize(&Value::from("abc")), vec![131, b'a', b'b', b'c']);
    }

    #[test]
    fn test_long_string_uses_length_prefix() {
        // Arrange
        let s = "x".repeat(64);

        // Act
        let bytes = serialize(&Value::from(s.as_str()));

        // Assert
        assert!(bytes.starts_with(b"64:"));
        assert_eq!(bytes.len(), 3 + 64);
        assert_eq!(deserialize(&bytes, true).unwrap(), Value::Str(s));
    }

    #[test]
    fn test_decode_utf8_disabled_yields_bytes() {
        let bytes = serialize(&Value::from("2.1.1"));
        assert_eq!(deserialize(&bytes, false).unwrap(), Value::bytes("2.1.1"));
    }

    #[test]
    fn test_invalid_utf8_stays_bytes_when_decoding() {
        let v = Value::bytes(vec![0xC3, 0x28]);
        assert_eq!(round_trip(&v), v);
    }

    // ── Containers ────────────────────────────────────────────────────────────

    #[test]
    fn test_nested_structure_round_trip() {
        let v = Value::List(vec![Value::List(vec![
            Value::Int(2),
            Value::from("daemon.login"),
            Value::List(vec![Value::from("localclient"), Value::from("secret")]),
            Value::dict([("client_version", "deluge-client")]),
        ])]);
        assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn test_large_list_uses_terminated_form() {
        // Arrange
        let v = Value::List((0..100).map(Value::Int).collect());

        // Act
        let bytes = serialize(&v);

        // Assert
        assert_eq!(bytes[0], CHR_LIST);
        assert_eq!(*bytes.last().unwrap(), CHR_TERM);
        assert_eq!(deserialize(&bytes, true).unwrap(), v);
    }

    #[test]
    fn test_large_dict_uses_terminated_form() {
        let v = Value::Dict((0..30).map(|i| (Value::Int(i), Value::Bool(i % 2 == 0))).collect());
        let bytes = serialize(&v);
        assert_eq!(bytes[0], CHR_DICT);
        assert_eq!(deserialize(&bytes, true).unwrap(), v);
    }

    #[test]
    fn test_dict_preserves_wire_order() {
        let v = Value::dict([("z", 1), ("a", 2), ("m", 3)]);
        assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn test_scalars_round_trip() {
        for v in [
            Value::None,
            Value::Bool(true),
            Value::Bool(false),
            Value::Float(0.5),
            Value::Float(-1234.5678),
            Value::from(""),
        ] {
            assert_eq!(round_trip(&v), v);
        }
    }

    #[test]
    fn test_float32_decodes_to_f64() {
        let mut bytes = vec![CHR_FLOAT32];
        bytes.extend_from_slice(&1.5f32.to_be_bytes());
        assert_eq!(deserialize(&bytes, true).unwrap(), Value::Float(1.5));
    }

    // ── Error conditions ──────────────────────────────────────────────────────

    #[test]
    fn test_empty_input_is_unexpected_end() {
        assert!(matches!(deserialize(&[], true), Err(CodecError::UnexpectedEnd { .. })));
    }

    #[test]
    fn test_truncated_string_is_unexpected_end() {
        assert!(matches!(
            deserialize(&[133, b'a'], true),
            Err(CodecError::UnexpectedEnd { .. })
        ));
    }

    #[test]
    fn test_unterminated_list_is_unexpected_end() {
        assert!(matches!(
            deserialize(&[CHR_LIST, 1, 2], true),
            Err(CodecError::UnexpectedEnd { .. })
        ));
    }

    #[test]
    fn test_unknown_type_code_is_error() {
        assert!(matches!(
            deserialize(&[45], true),
            Err(CodecError::UnknownTypeCode(45))
        ));
    }

    #[test]
    fn test_trailing_bytes_is_error() {
        assert!(matches!(
            deserialize(&[1, 2], true),
            Err(CodecError::TrailingBytes(1))
        ));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let bytes = vec![LIST_FIXED_START + 1; MAX_DEPTH + 2];
        assert!(matches!(deserialize(&bytes, true), Err(CodecError::TooDeep(_))));
    }
}
