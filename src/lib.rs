//! # EmberKV — an in-memory RESP key-value server
//!
//! EmberKV speaks the RESP wire format over TCP and serves a typed keyspace
//! of strings, lists, and sets with per-key TTL expiration. Any RESP client
//! can talk to it on the usual port.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   bytes    ┌─────────────┐   values   ┌───────────────┐
//! │ TCP socket │ ─────────> │ RespDecoder │ ─────────> │ command table │
//! └────────────┘            └─────────────┘            └───────┬───────┘
//!       ▲                                                      │
//!       │          one write per read iteration                ▼
//!       │          ┌──────────────┐   replies   ┌──────────────────────┐
//!       └───────── │ batch buffer │ <────────── │ Keyspace (Mutex'd)   │
//!                  └──────────────┘             └──────────────────────┘
//! ```
//!
//! Bytes from a client feed a resumable decoder that survives arbitrary
//! chunk boundaries. Complete requests dispatch through a compile-time
//! validated command table against the shared keyspace; replies are
//! size-precomputed, batched, and flushed in a single write so pipelined
//! clients get pipelined answers.
//!
//! The keyspace lives behind one mutex and commands never await while
//! holding it, so command execution is strictly serial — there is no
//! cross-connection visibility hazard to reason about. Expired keys are
//! removed lazily on touch plus by a bounded random sweep that piggybacks
//! on traffic.
//!
//! ## Supported commands
//!
//! - Strings: `GET`, `SET`
//! - Keys: `DEL`, `KEYS`, `FLUSHDB`, `EXPIRE`, `TTL`
//! - Lists: `LPUSH`, `RPUSH`, `LPOP`, `RPOP`, `LLEN`, `LRANGE`
//! - Sets: `SADD`, `SREM`, `SCARD`, `SMEMBERS`, `SISMEMBER`, `SINTER`
//! - Server: `PING`
//!
//! Command names are matched case-sensitively in uppercase, and a missing
//! value is reported as the literal bulk string `(nil)`.

pub mod commands;
pub mod connection;
pub mod protocol;
pub mod storage;

pub use connection::{handle_connection, ConnectionStats, SharedKeyspace};
pub use protocol::{RespDecoder, RespValue};
pub use storage::Keyspace;

/// The default port, shared with the protocol this server emulates.
pub const DEFAULT_PORT: u16 = 6379;

/// The default bind address.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Crate version, surfaced by the binary.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
