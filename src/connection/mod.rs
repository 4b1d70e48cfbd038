//! Client connection management.
//!
//! One task per accepted socket. The handler owns the connection's decoder
//! and reply batch buffer, executes commands against the shared keyspace,
//! and answers each read's worth of pipelined requests with a single write.

pub mod handler;

pub use handler::{
    handle_connection, ConnectionError, ConnectionHandler, ConnectionStats, SharedKeyspace,
};
