//! Command dispatch and execution.
//!
//! Requests arrive as RESP arrays of bulk strings: the uppercase command
//! name followed by its arguments. [`registry::execute`] validates that
//! envelope, looks the name up in a compile-time-checked table, and runs the
//! handler against the keyspace. Handlers are pure functions — args in,
//! reply value out — and every failure a client can cause comes back as a
//! RESP error value.

pub mod handlers;
pub mod registry;

pub use registry::{dispatch, execute, CommandEntry, HandlerFn, COMMANDS};
