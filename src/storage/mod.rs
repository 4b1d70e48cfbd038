//! Keyspace storage: a typed map with lazy and amortized TTL expiration.
//!
//! Entries are heap-owned and outlive any single request; command handlers
//! copy whatever must survive a batch out of the wire buffers and into the
//! keyspace. The keyspace itself does no locking — the server shares one
//! instance behind a mutex and every command runs against it serially.

pub mod keyspace;

pub use keyspace::{Keyspace, List, LookupError, Set, Str, StoredType, Value};
