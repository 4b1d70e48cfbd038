//! RESP (Redis Serialization Protocol) value model.
//!
//! Every protocol value starts with a one-byte type tag and ends with CRLF:
//!
//! - `+` Simple String: `+OK\r\n`
//! - `-` Error: `-ERR unknown command\r\n`
//! - `:` Integer: `:1000\r\n`
//! - `$` Bulk String: `$5\r\nhello\r\n`
//! - `*` Array: `*2\r\n$3\r\nGET\r\n$4\r\nname\r\n`
//!
//! Bulk strings are binary safe; simple strings and errors are short text
//! lines that must not contain CR or LF. The null sentinel `$-1\r\n` is only
//! ever produced as a response; see [`RespValue::Null`].

use bytes::Bytes;
use std::fmt;

/// The CRLF line terminator.
pub const CRLF: &[u8] = b"\r\n";

/// RESP type tag bytes.
pub mod tag {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A single RESP protocol value.
///
/// This is a closed sum dispatched by tag. Values are cheap to move: line
/// payloads are `String`s, bulk payloads are reference-counted [`Bytes`],
/// and arrays own their element vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Non-binary-safe text line, e.g. `+OK\r\n`. No embedded CR/LF.
    SimpleString(String),

    /// Same shape as a simple string, semantically a failure marker.
    Error(String),

    /// Signed 64-bit integer, e.g. `:42\r\n`.
    Integer(i64),

    /// Binary-safe byte sequence of known length, e.g. `$5\r\nhello\r\n`.
    BulkString(Bytes),

    /// The "no value" response sentinel, encoded `$-1\r\n`.
    ///
    /// The decoder never yields this: a negative length on input cancels the
    /// parse. It exists so handlers can signal absence on the wire.
    Null,

    /// Ordered sequence of values, possibly empty or nested.
    Array(Vec<RespValue>),
}

impl RespValue {
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(values)
    }

    /// Canonical `+OK\r\n` reply.
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    /// Canonical `+PONG\r\n` reply.
    pub fn pong() -> Self {
        RespValue::SimpleString("PONG".to_string())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// The payload bytes if this is a bulk string.
    pub fn as_bulk(&self) -> Option<&Bytes> {
        match self {
            RespValue::BulkString(b) => Some(b),
            _ => None,
        }
    }

    /// The elements if this is an array.
    pub fn as_array(&self) -> Option<&[RespValue]> {
        match self {
            RespValue::Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<RespValue>> {
        match self {
            RespValue::Array(values) => Some(values),
            _ => None,
        }
    }
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "\"{}\"", s),
            RespValue::Error(s) => write!(f, "(error) {}", s),
            RespValue::Integer(n) => write!(f, "(integer) {}", n),
            RespValue::BulkString(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            RespValue::Null => write!(f, "(nil)"),
            RespValue::Array(values) => {
                if values.is_empty() {
                    return write!(f, "(empty array)");
                }
                writeln!(f)?;
                for (i, v) in values.iter().enumerate() {
                    writeln!(f, "{}) {}", i + 1, v)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors() {
        assert_eq!(RespValue::ok(), RespValue::SimpleString("OK".into()));
        assert_eq!(RespValue::pong(), RespValue::SimpleString("PONG".into()));
        assert_eq!(RespValue::integer(-7), RespValue::Integer(-7));
        assert_eq!(
            RespValue::bulk_string("hi"),
            RespValue::BulkString(Bytes::from("hi"))
        );
    }

    #[test]
    fn accessors() {
        let bulk = RespValue::bulk_string("x");
        assert_eq!(bulk.as_bulk(), Some(&Bytes::from("x")));
        assert!(bulk.as_array().is_none());

        let arr = RespValue::array(vec![RespValue::integer(1)]);
        assert_eq!(arr.as_array().map(<[RespValue]>::len), Some(1));
        assert!(RespValue::error("ERR boom").is_error());
    }
}
