//! Command dispatch table.
//!
//! The table is a `const` slice validated at compile time: names must be
//! uppercase ASCII and unique, so a typo in a handler registration fails the
//! build rather than a request. Lookup is a linear, case-sensitive scan —
//! the table is ~20 entries and frequency-ordered, which beats hashing at
//! this size.

use crate::commands::handlers;
use crate::protocol::RespValue;
use crate::storage::Keyspace;

/// A command handler: validated args (everything after the name), the shared
/// keyspace, and a reply value out. Handlers never retain references into
/// `args` past the call.
pub type HandlerFn = fn(&[RespValue], &mut Keyspace) -> RespValue;

pub struct CommandEntry {
    pub name: &'static str,
    pub handler: HandlerFn,
}

/// Frequency-ordered: most common commands first.
pub const COMMANDS: &[CommandEntry] = &[
    CommandEntry { name: "GET", handler: handlers::get },
    CommandEntry { name: "SET", handler: handlers::set },
    CommandEntry { name: "DEL", handler: handlers::del },
    CommandEntry { name: "PING", handler: handlers::ping },
    CommandEntry { name: "KEYS", handler: handlers::keys },
    CommandEntry { name: "FLUSHDB", handler: handlers::flushdb },
    CommandEntry { name: "LPUSH", handler: handlers::lpush },
    CommandEntry { name: "RPUSH", handler: handlers::rpush },
    CommandEntry { name: "LPOP", handler: handlers::lpop },
    CommandEntry { name: "RPOP", handler: handlers::rpop },
    CommandEntry { name: "LLEN", handler: handlers::llen },
    CommandEntry { name: "LRANGE", handler: handlers::lrange },
    CommandEntry { name: "SADD", handler: handlers::sadd },
    CommandEntry { name: "SREM", handler: handlers::srem },
    CommandEntry { name: "SCARD", handler: handlers::scard },
    CommandEntry { name: "SMEMBERS", handler: handlers::smembers },
    CommandEntry { name: "SISMEMBER", handler: handlers::sismember },
    CommandEntry { name: "SINTER", handler: handlers::sinter },
    CommandEntry { name: "EXPIRE", handler: handlers::expire },
    CommandEntry { name: "TTL", handler: handlers::ttl },
];

const _: () = validate(COMMANDS);

const fn validate(table: &[CommandEntry]) {
    let mut i = 0;
    while i < table.len() {
        let name = table[i].name.as_bytes();
        assert!(!name.is_empty(), "command name must not be empty");
        let mut j = 0;
        while j < name.len() {
            assert!(
                name[j].is_ascii_uppercase(),
                "command names must be uppercase ASCII"
            );
            j += 1;
        }
        let mut k = i + 1;
        while k < table.len() {
            assert!(
                !bytes_eq(table[k].name.as_bytes(), name),
                "duplicate command name"
            );
            k += 1;
        }
        i += 1;
    }
}

const fn bytes_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

/// Looks up `name` (case-sensitive; clients send uppercase) and runs the
/// handler. Unknown names get an error value, not a closed connection.
pub fn dispatch(name: &[u8], args: &[RespValue], store: &mut Keyspace) -> RespValue {
    for entry in COMMANDS {
        if entry.name.as_bytes() == name {
            return (entry.handler)(args, store);
        }
    }
    RespValue::Error(format!(
        "ERR unknown command '{}'",
        String::from_utf8_lossy(name)
    ))
}

/// Validates the request envelope and dispatches.
///
/// Requests are arrays of bulk strings whose first element is the command
/// name; anything else is reported to the client as an error value.
pub fn execute(request: &RespValue, store: &mut Keyspace) -> RespValue {
    let Some(parts) = request.as_array() else {
        return RespValue::error("ERR invalid command format");
    };
    let Some((name, args)) = parts.split_first() else {
        return RespValue::error("ERR invalid command format");
    };
    let Some(name) = name.as_bulk() else {
        return RespValue::error("ERR command name must be a bulk string");
    };
    dispatch(name, args, store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn request(parts: &[&str]) -> RespValue {
        RespValue::Array(
            parts
                .iter()
                .map(|p| RespValue::BulkString(Bytes::copy_from_slice(p.as_bytes())))
                .collect(),
        )
    }

    #[test]
    fn dispatches_known_commands() {
        let mut ks = Keyspace::new();
        assert_eq!(execute(&request(&["PING"]), &mut ks), RespValue::pong());
    }

    #[test]
    fn unknown_command_names_the_offender() {
        let mut ks = Keyspace::new();
        assert_eq!(
            execute(&request(&["NOSUCH"]), &mut ks),
            RespValue::error("ERR unknown command 'NOSUCH'")
        );
    }

    #[test]
    fn dispatch_is_case_sensitive() {
        let mut ks = Keyspace::new();
        assert_eq!(
            execute(&request(&["ping"]), &mut ks),
            RespValue::error("ERR unknown command 'ping'")
        );
    }

    #[test]
    fn rejects_non_array_requests() {
        let mut ks = Keyspace::new();
        assert_eq!(
            execute(&RespValue::simple_string("PING"), &mut ks),
            RespValue::error("ERR invalid command format")
        );
        assert_eq!(
            execute(&RespValue::Array(vec![]), &mut ks),
            RespValue::error("ERR invalid command format")
        );
    }

    #[test]
    fn rejects_non_bulk_command_names() {
        let mut ks = Keyspace::new();
        let bad = RespValue::Array(vec![RespValue::Integer(1)]);
        assert_eq!(
            execute(&bad, &mut ks),
            RespValue::error("ERR command name must be a bulk string")
        );
    }

    #[test]
    fn table_names_are_unique_uppercase() {
        for entry in COMMANDS {
            assert!(entry.name.bytes().all(|b| b.is_ascii_uppercase()));
        }
        for (i, a) in COMMANDS.iter().enumerate() {
            for b in &COMMANDS[i + 1..] {
                assert_ne!(a.name, b.name);
            }
        }
    }
}
