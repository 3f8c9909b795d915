//! Column codec: typed values to and from bytes.
//!
//! Encoding is little-endian and fixed width per type except `utf8`, which is
//! a `u32` length prefix followed by the UTF-8 payload. Nulls are written as
//! the reserved sentinels in [`fill`]; a non-null value that would encode to
//! a sentinel is rejected with [`CodecError::ReservedValue`], so decoding a
//! sentinel always means null.
//!
//! Single values go through [`encode`]/[`decode`]; tile columns go through
//! [`encode_column`]/[`decode_column`], which pack values back to back.

pub mod fill;

pub use fill::FillValues;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use snafu::prelude::*;

use crate::{schema::ColumnType, value::Value};

use fill::{BOOL_NULL, FLOAT64_NULL_BITS, INT64_NULL, UTF8_NULL_LEN};

/// Errors raised while encoding or decoding column values.
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum CodecError {
    /// The value's runtime type differs from the column type.
    #[snafu(display("Type mismatch: expected {expected}, found {found}"))]
    TypeMismatch {
        /// Declared column type.
        expected: ColumnType,
        /// Runtime type of the offending value.
        found: &'static str,
    },

    /// A non-null value collides with the null sentinel of its type.
    #[snafu(display("Value {value} is reserved as the {column_type} null sentinel"))]
    ReservedValue {
        /// Column type whose sentinel was hit.
        column_type: ColumnType,
        /// Rendering of the rejected value.
        value: String,
    },

    /// A string longer than the length prefix can describe.
    #[snafu(display("String of {len} bytes exceeds the utf8 length limit"))]
    StringTooLong {
        /// Payload length in bytes.
        len: usize,
    },

    /// The buffer ended before a complete value was read.
    #[snafu(display("Truncated {column_type} data: need {needed} bytes, {remaining} left"))]
    Truncated {
        /// Column type being decoded.
        column_type: ColumnType,
        /// Bytes required for the next value.
        needed: usize,
        /// Bytes remaining in the buffer.
        remaining: usize,
    },

    /// A bool byte other than 0, 1 or the sentinel.
    #[snafu(display("Invalid bool byte {byte:#04x}"))]
    InvalidBool {
        /// The byte that was found.
        byte: u8,
    },

    /// String payload is not UTF-8.
    #[snafu(display("Invalid utf8 payload: {source}"))]
    InvalidUtf8 {
        /// Underlying conversion error.
        source: std::string::FromUtf8Error,
    },

    /// Bytes remained after the expected number of values.
    #[snafu(display("{remaining} trailing bytes after {count} {column_type} values"))]
    TrailingBytes {
        /// Column type being decoded.
        column_type: ColumnType,
        /// Number of values decoded.
        count: usize,
        /// Bytes left over.
        remaining: usize,
    },
}

impl CodecError {
    /// True for errors caused by malformed stored bytes rather than by the
    /// caller's values.
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            CodecError::Truncated { .. }
                | CodecError::InvalidBool { .. }
                | CodecError::InvalidUtf8 { .. }
                | CodecError::TrailingBytes { .. }
        )
    }
}

/// Check that `value` can be stored in a column of type `column_type`.
///
/// Null always passes; nullability is a schema concern, not a codec one.
pub fn check(column_type: ColumnType, value: &Value) -> Result<(), CodecError> {
    match (column_type, value) {
        (_, Value::Null) => Ok(()),
        (ColumnType::Int64, Value::Int64(v)) => {
            ensure!(
                *v != INT64_NULL,
                ReservedValueSnafu {
                    column_type,
                    value: v.to_string(),
                }
            );
            Ok(())
        }
        (ColumnType::Float64, Value::Float64(v)) => {
            ensure!(
                v.to_bits() != FLOAT64_NULL_BITS,
                ReservedValueSnafu {
                    column_type,
                    value: format!("NaN({:#018x})", v.to_bits()),
                }
            );
            Ok(())
        }
        (ColumnType::Utf8, Value::Utf8(s)) => {
            ensure!(
                u32::try_from(s.len()).is_ok_and(|len| len != UTF8_NULL_LEN),
                StringTooLongSnafu { len: s.len() }
            );
            Ok(())
        }
        (ColumnType::Bool, Value::Bool(_)) => Ok(()),
        (expected, other) => TypeMismatchSnafu {
            expected,
            found: other.type_name(),
        }
        .fail(),
    }
}

/// Append the encoding of `value` to `buf`.
pub fn encode_into(
    column_type: ColumnType,
    value: &Value,
    buf: &mut impl BufMut,
) -> Result<(), CodecError> {
    check(column_type, value)?;
    match (column_type, value) {
        (ColumnType::Int64, Value::Null) => buf.put_i64_le(INT64_NULL),
        (ColumnType::Float64, Value::Null) => buf.put_u64_le(FLOAT64_NULL_BITS),
        (ColumnType::Bool, Value::Null) => buf.put_u8(BOOL_NULL),
        (ColumnType::Utf8, Value::Null) => buf.put_u32_le(UTF8_NULL_LEN),
        (_, Value::Int64(v)) => buf.put_i64_le(*v),
        (_, Value::Float64(v)) => buf.put_u64_le(v.to_bits()),
        (_, Value::Bool(v)) => buf.put_u8(u8::from(*v)),
        (_, Value::Utf8(s)) => {
            // `check` guarantees the length fits below the sentinel.
            buf.put_u32_le(s.len() as u32);
            buf.put_slice(s.as_bytes());
        }
    }
    Ok(())
}

/// Encode a single value.
pub fn encode(column_type: ColumnType, value: &Value) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::with_capacity(column_type.fixed_width().unwrap_or(4));
    encode_into(column_type, value, &mut buf)?;
    Ok(buf)
}

fn need(column_type: ColumnType, remaining: usize, needed: usize) -> Result<(), CodecError> {
    ensure!(
        remaining >= needed,
        TruncatedSnafu {
            column_type,
            needed,
            remaining,
        }
    );
    Ok(())
}

/// Decode one value from the front of `buf`, advancing it.
pub fn decode_from(column_type: ColumnType, buf: &mut impl Buf) -> Result<Value, CodecError> {
    match column_type {
        ColumnType::Int64 => {
            need(column_type, buf.remaining(), 8)?;
            let v = buf.get_i64_le();
            Ok(if v == INT64_NULL {
                Value::Null
            } else {
                Value::Int64(v)
            })
        }
        ColumnType::Float64 => {
            need(column_type, buf.remaining(), 8)?;
            let bits = buf.get_u64_le();
            Ok(if bits == FLOAT64_NULL_BITS {
                Value::Null
            } else {
                Value::Float64(f64::from_bits(bits))
            })
        }
        ColumnType::Bool => {
            need(column_type, buf.remaining(), 1)?;
            match buf.get_u8() {
                0 => Ok(Value::Bool(false)),
                1 => Ok(Value::Bool(true)),
                BOOL_NULL => Ok(Value::Null),
                byte => InvalidBoolSnafu { byte }.fail(),
            }
        }
        ColumnType::Utf8 => {
            need(column_type, buf.remaining(), 4)?;
            let len = buf.get_u32_le();
            if len == UTF8_NULL_LEN {
                return Ok(Value::Null);
            }
            let len = len as usize;
            need(column_type, buf.remaining(), len)?;
            let mut payload = vec![0u8; len];
            buf.copy_to_slice(&mut payload);
            let s = String::from_utf8(payload).context(InvalidUtf8Snafu)?;
            Ok(Value::Utf8(s))
        }
    }
}

/// Decode a single value; `bytes` must hold exactly one encoding.
pub fn decode(column_type: ColumnType, bytes: &[u8]) -> Result<Value, CodecError> {
    let mut buf = bytes;
    let value = decode_from(column_type, &mut buf)?;
    ensure!(
        !buf.has_remaining(),
        TrailingBytesSnafu {
            column_type,
            count: 1usize,
            remaining: buf.remaining(),
        }
    );
    Ok(value)
}

/// Encode a column of values back to back.
pub fn encode_column<'a, I>(column_type: ColumnType, values: I) -> Result<Bytes, CodecError>
where
    I: IntoIterator<Item = &'a Value>,
{
    let values = values.into_iter();
    let width = column_type.fixed_width().unwrap_or(8);
    let mut buf = BytesMut::with_capacity(values.size_hint().0 * width);
    for value in values {
        encode_into(column_type, value, &mut buf)?;
    }
    Ok(buf.freeze())
}

/// Decode exactly `count` values; missing or leftover bytes are errors.
pub fn decode_column(
    column_type: ColumnType,
    bytes: &[u8],
    count: usize,
) -> Result<Vec<Value>, CodecError> {
    if let Some(width) = column_type.fixed_width() {
        let expected = width.saturating_mul(count);
        ensure!(
            bytes.len() >= expected,
            TruncatedSnafu {
                column_type,
                needed: expected,
                remaining: bytes.len(),
            }
        );
    }

    let mut buf = bytes;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(decode_from(column_type, &mut buf)?);
    }
    ensure!(
        !buf.has_remaining(),
        TrailingBytesSnafu {
            column_type,
            count,
            remaining: buf.remaining(),
        }
    );
    Ok(out)
}
