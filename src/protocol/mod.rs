//! RESP protocol support: the value model, an incremental decoder, and a
//! size-precomputed serializer.
//!
//! The decoder is resumable across arbitrary chunk boundaries — the
//! connection layer feeds it whatever the socket produced and gets back
//! complete values, a request for more bytes, or a cancellation. The
//! serializer computes the exact encoded size up front so a whole batch of
//! pipelined replies can be written with one buffer growth per reply.

pub mod decoder;
pub mod encoder;
pub mod types;

pub use decoder::{FeedResult, Outcome, RespDecoder};
pub use encoder::{encoded_len, serialize, serialize_into};
pub use types::RespValue;
