//! RESP serializer.
//!
//! Serialization runs in two passes: [`encoded_len`] computes the exact wire
//! size of a value, then [`serialize_into`] reserves that many bytes once and
//! appends. A batch of pipelined replies therefore grows its output buffer
//! at most once per reply.

use crate::protocol::types::{tag, RespValue, CRLF};
use bytes::{BufMut, Bytes, BytesMut};

const NULL_BULK: &[u8] = b"$-1\r\n";

/// Exact number of bytes [`serialize_into`] will append for `value`.
pub fn encoded_len(value: &RespValue) -> usize {
    match value {
        RespValue::SimpleString(s) | RespValue::Error(s) => 1 + s.len() + 2,
        RespValue::Integer(n) => 1 + count_digits_signed(*n) + 2,
        RespValue::BulkString(data) => {
            let len = data.len();
            1 + count_digits(len as u64) + 2 + len + 2
        }
        RespValue::Null => NULL_BULK.len(),
        RespValue::Array(values) => {
            let mut size = 1 + count_digits(values.len() as u64) + 2;
            for v in values {
                size += encoded_len(v);
            }
            size
        }
    }
}

/// Appends the wire encoding of `value` to `buf` after a single reserve.
pub fn serialize_into(value: &RespValue, buf: &mut BytesMut) {
    buf.reserve(encoded_len(value));
    append(value, buf);
}

/// Encodes `value` into a fresh buffer.
pub fn serialize(value: &RespValue) -> Bytes {
    let mut buf = BytesMut::with_capacity(encoded_len(value));
    append(value, &mut buf);
    buf.freeze()
}

fn append(value: &RespValue, buf: &mut BytesMut) {
    match value {
        RespValue::SimpleString(s) => {
            buf.put_u8(tag::SIMPLE_STRING);
            buf.extend_from_slice(s.as_bytes());
            buf.extend_from_slice(CRLF);
        }
        RespValue::Error(s) => {
            buf.put_u8(tag::ERROR);
            buf.extend_from_slice(s.as_bytes());
            buf.extend_from_slice(CRLF);
        }
        RespValue::Integer(n) => {
            buf.put_u8(tag::INTEGER);
            append_decimal(*n, buf);
            buf.extend_from_slice(CRLF);
        }
        RespValue::BulkString(data) => {
            buf.put_u8(tag::BULK_STRING);
            append_decimal(data.len() as i64, buf);
            buf.extend_from_slice(CRLF);
            buf.extend_from_slice(data);
            buf.extend_from_slice(CRLF);
        }
        RespValue::Null => buf.extend_from_slice(NULL_BULK),
        RespValue::Array(values) => {
            buf.put_u8(tag::ARRAY);
            append_decimal(values.len() as i64, buf);
            buf.extend_from_slice(CRLF);
            for v in values {
                append(v, buf);
            }
        }
    }
}

/// Writes `n` in base 10 without heap allocation.
fn append_decimal(n: i64, buf: &mut BytesMut) {
    let mut tmp = [0u8; 20];
    let mut value = n.unsigned_abs();
    let mut at = tmp.len();
    loop {
        at -= 1;
        tmp[at] = b'0' + (value % 10) as u8;
        value /= 10;
        if value == 0 {
            break;
        }
    }
    if n < 0 {
        buf.put_u8(b'-');
    }
    buf.extend_from_slice(&tmp[at..]);
}

/// Digit count of `n` via the bit-width log10 approximation
/// (`(bit_width - 1) * 1233 >> 12`), corrected against a powers-of-ten
/// table. Branchless apart from the zero case.
fn count_digits(n: u64) -> usize {
    const POWERS_OF_10: [u64; 20] = [
        0,
        10,
        100,
        1_000,
        10_000,
        100_000,
        1_000_000,
        10_000_000,
        100_000_000,
        1_000_000_000,
        10_000_000_000,
        100_000_000_000,
        1_000_000_000_000,
        10_000_000_000_000,
        100_000_000_000_000,
        1_000_000_000_000_000,
        10_000_000_000_000_000,
        100_000_000_000_000_000,
        1_000_000_000_000_000_000,
        10_000_000_000_000_000_000,
    ];

    if n == 0 {
        return 1;
    }
    let bit_width = 64 - n.leading_zeros() as usize;
    let digits = ((bit_width - 1) * 1233 >> 12) + 1;
    digits + usize::from(n >= POWERS_OF_10[digits])
}

fn count_digits_signed(n: i64) -> usize {
    count_digits(n.unsigned_abs()) + usize::from(n < 0)
}
