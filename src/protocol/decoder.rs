//! Incremental RESP decoder.
//!
//! TCP delivers arbitrary byte chunks, so the decoder is a resumable state
//! machine: [`RespDecoder::feed`] consumes a slice and reports how many bytes
//! it took together with one of three outcomes:
//!
//! - [`Outcome::Value`]: a complete value. `consumed` covers exactly the
//!   bytes of that value within the current input; leftover bytes stay with
//!   the caller to re-feed after [`RespDecoder::reset`].
//! - [`Outcome::NeedMore`]: the value is incomplete. The whole input has
//!   been absorbed into internal buffers (`consumed == input.len()`) and the
//!   decoder resumes where it left off on the next call.
//! - [`Outcome::Cancelled`]: the stream violates the protocol. Decoder state
//!   is unspecified until the caller resets.
//!
//! Arrays are parsed without recursion over whole decoder trees: the array
//! state owns a single nested decoder for the element currently in flight
//! and resets it after each completed element.

use crate::protocol::types::{tag, RespValue};
use bytes::Bytes;

/// Upper bound on a single bulk string payload (512 MiB, as Redis).
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Upper bound on a declared array element count.
pub const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// Upper bound on one accumulated text line (lengths, integers, simple
/// strings). Anything longer is not a plausible frame.
const MAX_LINE_LEN: usize = 64 * 1024;

/// Maximum array nesting depth.
const MAX_NESTING_DEPTH: u32 = 32;

/// What a single [`RespDecoder::feed`] call produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// One complete value was decoded.
    Value(RespValue),
    /// The input ran out mid-value; feed more bytes to continue.
    NeedMore,
    /// Protocol violation; reset before feeding again.
    Cancelled,
}

/// Result of one [`RespDecoder::feed`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedResult {
    /// Bytes of the input consumed by this call.
    pub consumed: usize,
    pub outcome: Outcome,
}

impl FeedResult {
    fn value(consumed: usize, value: RespValue) -> Self {
        Self {
            consumed,
            outcome: Outcome::Value(value),
        }
    }

    fn need_more(consumed: usize) -> Self {
        Self {
            consumed,
            outcome: Outcome::NeedMore,
        }
    }

    fn cancelled(consumed: usize) -> Self {
        Self {
            consumed,
            outcome: Outcome::Cancelled,
        }
    }
}

/// Which value a text line terminates into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Simple,
    Error,
    Integer,
    BulkLength,
    ArrayLength,
}

/// Accumulates one CRLF-terminated line across chunk boundaries.
///
/// A CR followed by anything but LF is literal content; a CR at the end of a
/// chunk is remembered so the terminator is never committed on a lone CR.
#[derive(Debug, Default)]
struct LineBuffer {
    bytes: Vec<u8>,
    seen_cr: bool,
}

enum LineStatus {
    Done,
    Pending,
    TooLong,
}

impl LineBuffer {
    /// Consumes from `input` until the line terminates, the input runs out,
    /// or the line exceeds [`MAX_LINE_LEN`]. Returns bytes consumed.
    fn feed(&mut self, input: &[u8]) -> (usize, LineStatus) {
        for (i, &b) in input.iter().enumerate() {
            if self.seen_cr {
                if b == b'\n' {
                    return (i + 1, LineStatus::Done);
                }
                self.bytes.push(b'\r');
                self.seen_cr = false;
            }
            if b == b'\r' {
                self.seen_cr = true;
            } else {
                self.bytes.push(b);
            }
            if self.bytes.len() > MAX_LINE_LEN {
                return (i + 1, LineStatus::TooLong);
            }
        }
        (input.len(), LineStatus::Pending)
    }

    fn take(&mut self) -> Vec<u8> {
        self.seen_cr = false;
        std::mem::take(&mut self.bytes)
    }
}

/// Decoder state. One variant per sub-parser; transitions happen inside
/// [`RespDecoder::feed`] without yielding until an outcome is decided.
#[derive(Debug)]
enum State {
    /// Expecting the type tag byte of the next value.
    AwaitTag,
    /// Accumulating a CRLF line for `kind`.
    Line { kind: LineKind, line: LineBuffer },
    /// Reading a bulk payload of known length.
    BulkPayload { remaining: usize, data: Vec<u8> },
    /// Reading the CRLF that closes a bulk payload.
    BulkTerminator { data: Vec<u8>, seen_cr: bool },
    /// Reading array elements through a nested decoder.
    ArrayElements {
        expected: usize,
        elements: Vec<RespValue>,
        element: Box<RespDecoder>,
    },
}

/// A resumable decoder for one RESP value at a time.
///
/// After an [`Outcome::Value`] the decoder is back in the expect-tag state;
/// [`RespDecoder::reset`] is idempotent and also recovers from
/// [`Outcome::Cancelled`].
#[derive(Debug)]
pub struct RespDecoder {
    state: State,
    depth: u32,
}

impl Default for RespDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RespDecoder {
    pub fn new() -> Self {
        Self::with_depth(0)
    }

    fn with_depth(depth: u32) -> Self {
        Self {
            state: State::AwaitTag,
            depth,
        }
    }

    /// Returns the decoder to the initial expect-tag state.
    pub fn reset(&mut self) {
        self.state = State::AwaitTag;
    }

    /// True when no partial value is buffered. The connection layer uses
    /// this to decide whether per-batch scratch memory may be reclaimed.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::AwaitTag)
    }

    /// Consumes bytes from `input`, advancing the state machine until a
    /// value completes, the input runs out, or the stream is invalid.
    pub fn feed(&mut self, input: &[u8]) -> FeedResult {
        let mut consumed = 0;

        loop {
            match &mut self.state {
                State::AwaitTag => {
                    let Some(&b) = input.get(consumed) else {
                        return FeedResult::need_more(consumed);
                    };
                    let kind = match b {
                        tag::SIMPLE_STRING => LineKind::Simple,
                        tag::ERROR => LineKind::Error,
                        tag::INTEGER => LineKind::Integer,
                        tag::BULK_STRING => LineKind::BulkLength,
                        tag::ARRAY => LineKind::ArrayLength,
                        _ => return FeedResult::cancelled(consumed),
                    };
                    consumed += 1;
                    self.state = State::Line {
                        kind,
                        line: LineBuffer::default(),
                    };
                }

                State::Line { kind, line } => {
                    let (n, status) = line.feed(&input[consumed..]);
                    consumed += n;
                    match status {
                        LineStatus::Pending => return FeedResult::need_more(consumed),
                        LineStatus::TooLong => return FeedResult::cancelled(consumed),
                        LineStatus::Done => {}
                    }

                    let kind = *kind;
                    let bytes = line.take();
                    match kind {
                        LineKind::Simple | LineKind::Error => {
                            let Ok(text) = String::from_utf8(bytes) else {
                                return FeedResult::cancelled(consumed);
                            };
                            let value = if kind == LineKind::Simple {
                                RespValue::SimpleString(text)
                            } else {
                                RespValue::Error(text)
                            };
                            self.state = State::AwaitTag;
                            return FeedResult::value(consumed, value);
                        }
                        LineKind::Integer => {
                            let Some(n) = parse_decimal(&bytes) else {
                                return FeedResult::cancelled(consumed);
                            };
                            self.state = State::AwaitTag;
                            return FeedResult::value(consumed, RespValue::Integer(n));
                        }
                        LineKind::BulkLength => {
                            let Some(len) = parse_decimal(&bytes) else {
                                return FeedResult::cancelled(consumed);
                            };
                            if len < 0 || len as usize > MAX_BULK_LEN {
                                return FeedResult::cancelled(consumed);
                            }
                            let len = len as usize;
                            self.state = State::BulkPayload {
                                remaining: len,
                                data: Vec::with_capacity(len.min(4096)),
                            };
                        }
                        LineKind::ArrayLength => {
                            let Some(count) = parse_decimal(&bytes) else {
                                return FeedResult::cancelled(consumed);
                            };
                            if count < 0 || count as usize > MAX_ARRAY_LEN {
                                return FeedResult::cancelled(consumed);
                            }
                            if count == 0 {
                                self.state = State::AwaitTag;
                                return FeedResult::value(consumed, RespValue::Array(Vec::new()));
                            }
                            if self.depth >= MAX_NESTING_DEPTH {
                                return FeedResult::cancelled(consumed);
                            }
                            let expected = count as usize;
                            self.state = State::ArrayElements {
                                expected,
                                elements: Vec::with_capacity(expected.min(8)),
                                element: Box::new(RespDecoder::with_depth(self.depth + 1)),
                            };
                        }
                    }
                }

                State::BulkPayload { remaining, data } => {
                    let take = (*remaining).min(input.len() - consumed);
                    data.extend_from_slice(&input[consumed..consumed + take]);
                    consumed += take;
                    *remaining -= take;
                    if *remaining > 0 {
                        return FeedResult::need_more(consumed);
                    }
                    let data = std::mem::take(data);
                    self.state = State::BulkTerminator {
                        data,
                        seen_cr: false,
                    };
                }

                State::BulkTerminator { data, seen_cr } => {
                    loop {
                        let Some(&b) = input.get(consumed) else {
                            return FeedResult::need_more(consumed);
                        };
                        if !*seen_cr {
                            if b != b'\r' {
                                return FeedResult::cancelled(consumed);
                            }
                            *seen_cr = true;
                            consumed += 1;
                            continue;
                        }
                        if b != b'\n' {
                            return FeedResult::cancelled(consumed);
                        }
                        consumed += 1;
                        break;
                    }
                    let value = RespValue::BulkString(Bytes::from(std::mem::take(data)));
                    self.state = State::AwaitTag;
                    return FeedResult::value(consumed, value);
                }

                State::ArrayElements {
                    expected,
                    elements,
                    element,
                } => {
                    if consumed == input.len() {
                        return FeedResult::need_more(consumed);
                    }
                    let result = element.feed(&input[consumed..]);
                    consumed += result.consumed;
                    match result.outcome {
                        Outcome::Cancelled => return FeedResult::cancelled(consumed),
                        Outcome::NeedMore => return FeedResult::need_more(consumed),
                        Outcome::Value(v) => {
                            elements.push(v);
                            element.reset();
                            if elements.len() == *expected {
                                let values = std::mem::take(elements);
                                self.state = State::AwaitTag;
                                return FeedResult::value(consumed, RespValue::Array(values));
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Strict base-10 parse: optional leading `-`, at least one digit, nothing
/// else. Rejects what `from_chars` would reject in the reference framing.
fn parse_decimal(bytes: &[u8]) -> Option<i64> {
    let text = std::str::from_utf8(bytes).ok()?;
    if text.is_empty() || text == "-" {
        return None;
    }
    let digits = text.strip_prefix('-').unwrap_or(text);
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}
