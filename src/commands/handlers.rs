//! The command handlers.
//!
//! Each handler validates argument count and shape up front, then runs
//! against the keyspace and builds a reply value. Every user-visible failure
//! is an error *value*; handlers never return a Rust error.
//!
//! Missing values reply with the literal bulk string `(nil)` rather than the
//! RESP null bulk. That is deliberate wire-level compatibility with the
//! servers this one is drop-in for; see `nil()`.

use crate::protocol::RespValue;
use crate::storage::{Keyspace, List, LookupError, Set, Str};
use bytes::Bytes;
use std::time::Duration;

fn wrong_type() -> RespValue {
    RespValue::error("WRONGTYPE Operation against a key holding the wrong kind of value")
}

fn wrong_arg_count(cmd: &str) -> RespValue {
    RespValue::Error(format!("ERR wrong number of arguments for '{cmd}' command"))
}

fn not_bulk_string() -> RespValue {
    RespValue::error("ERR value is not a bulk string")
}

fn not_integer() -> RespValue {
    RespValue::error("ERR value is not an integer")
}

/// The "no value" reply: a five-byte bulk spelling `(nil)`.
fn nil() -> RespValue {
    RespValue::bulk_string("(nil)")
}

fn as_bulk(arg: &RespValue) -> Option<&Bytes> {
    arg.as_bulk()
}

/// Strict base-10 parse of an argument: optional sign, digits, nothing else.
fn parse_int(bytes: &[u8]) -> Option<i64> {
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

/// GET key
pub(crate) fn get(args: &[RespValue], store: &mut Keyspace) -> RespValue {
    if args.len() != 1 {
        return wrong_arg_count("GET");
    }
    let Some(key) = as_bulk(&args[0]) else {
        return not_bulk_string();
    };
    match store.find::<Str>(key) {
        Ok(value) => RespValue::BulkString(value.clone()),
        Err(LookupError::WrongType) => wrong_type(),
        Err(LookupError::NotFound) => nil(),
    }
}

/// SET key value — overwrite always wins; an existing deadline survives.
pub(crate) fn set(args: &[RespValue], store: &mut Keyspace) -> RespValue {
    if args.len() != 2 {
        return wrong_arg_count("SET");
    }
    let (Some(key), Some(value)) = (as_bulk(&args[0]), as_bulk(&args[1])) else {
        return not_bulk_string();
    };
    match store.find_or_create::<Str>(key) {
        Ok(slot) => {
            *slot = value.clone();
            RespValue::ok()
        }
        Err(_) => wrong_type(),
    }
}

/// DEL key [key ...]
pub(crate) fn del(args: &[RespValue], store: &mut Keyspace) -> RespValue {
    if args.is_empty() {
        return wrong_arg_count("DEL");
    }
    let mut deleted = 0i64;
    for arg in args {
        let Some(key) = as_bulk(arg) else {
            return not_bulk_string();
        };
        if store.erase(key) {
            deleted += 1;
        }
    }
    RespValue::Integer(deleted)
}

/// PING [message]
pub(crate) fn ping(args: &[RespValue], _store: &mut Keyspace) -> RespValue {
    if args.len() > 1 {
        return wrong_arg_count("PING");
    }
    match args.first() {
        None => RespValue::pong(),
        Some(arg) => match as_bulk(arg) {
            Some(msg) => RespValue::BulkString(msg.clone()),
            None => not_bulk_string(),
        },
    }
}

/// KEYS
pub(crate) fn keys(args: &[RespValue], store: &mut Keyspace) -> RespValue {
    if !args.is_empty() {
        return wrong_arg_count("KEYS");
    }
    let keys = store.keys();
    RespValue::Array(keys.into_iter().map(RespValue::BulkString).collect())
}

/// FLUSHDB
pub(crate) fn flushdb(args: &[RespValue], store: &mut Keyspace) -> RespValue {
    if !args.is_empty() {
        return wrong_arg_count("FLUSHDB");
    }
    store.clear();
    RespValue::ok()
}

/// LPUSH key value [value ...] — values land at the head in argument order,
/// so the last argument ends up first.
pub(crate) fn lpush(args: &[RespValue], store: &mut Keyspace) -> RespValue {
    push(args, store, "LPUSH", true)
}

/// RPUSH key value [value ...]
pub(crate) fn rpush(args: &[RespValue], store: &mut Keyspace) -> RespValue {
    push(args, store, "RPUSH", false)
}

fn push(args: &[RespValue], store: &mut Keyspace, cmd: &str, front: bool) -> RespValue {
    if args.len() < 2 {
        return wrong_arg_count(cmd);
    }
    let Some(key) = as_bulk(&args[0]) else {
        return not_bulk_string();
    };
    let list = match store.find_or_create::<List>(key) {
        Ok(list) => list,
        Err(_) => return wrong_type(),
    };
    for arg in &args[1..] {
        let Some(value) = as_bulk(arg) else {
            return not_bulk_string();
        };
        if front {
            list.push_front(value.clone());
        } else {
            list.push_back(value.clone());
        }
    }
    RespValue::Integer(list.len() as i64)
}

/// LPOP key [count]
pub(crate) fn lpop(args: &[RespValue], store: &mut Keyspace) -> RespValue {
    pop(args, store, "LPOP", true)
}

/// RPOP key [count] — with a count, elements arrive most recent first.
pub(crate) fn rpop(args: &[RespValue], store: &mut Keyspace) -> RespValue {
    pop(args, store, "RPOP", false)
}

fn pop(args: &[RespValue], store: &mut Keyspace, cmd: &str, front: bool) -> RespValue {
    if args.is_empty() || args.len() > 2 {
        return wrong_arg_count(cmd);
    }
    let Some(key) = as_bulk(&args[0]) else {
        return not_bulk_string();
    };

    let mut count = 1i64;
    if args.len() == 2 {
        let Some(raw) = as_bulk(&args[1]) else {
            return not_bulk_string();
        };
        match parse_int(raw) {
            Some(n) if n >= 0 => count = n,
            _ => return not_integer(),
        }
    }

    let list = match store.find::<List>(key) {
        Ok(list) => list,
        Err(LookupError::WrongType) => return wrong_type(),
        Err(LookupError::NotFound) => return nil(),
    };

    // Bare form replies with a single bulk; any explicit count means an
    // array reply, even for count 1.
    if args.len() == 1 {
        let value = if front {
            list.pop_front()
        } else {
            list.pop_back()
        };
        return match value {
            Some(value) => RespValue::BulkString(value),
            None => nil(),
        };
    }

    let mut popped = Vec::new();
    for _ in 0..count {
        let value = if front {
            list.pop_front()
        } else {
            list.pop_back()
        };
        match value {
            Some(value) => popped.push(RespValue::BulkString(value)),
            None => break,
        }
    }
    RespValue::Array(popped)
}

/// LLEN key
pub(crate) fn llen(args: &[RespValue], store: &mut Keyspace) -> RespValue {
    if args.len() != 1 {
        return wrong_arg_count("LLEN");
    }
    let Some(key) = as_bulk(&args[0]) else {
        return not_bulk_string();
    };
    match store.find::<List>(key) {
        Ok(list) => RespValue::Integer(list.len() as i64),
        Err(LookupError::WrongType) => wrong_type(),
        Err(LookupError::NotFound) => RespValue::Integer(0),
    }
}

/// LRANGE key start stop — inclusive, negative indices count from the end.
pub(crate) fn lrange(args: &[RespValue], store: &mut Keyspace) -> RespValue {
    if args.len() != 3 {
        return wrong_arg_count("LRANGE");
    }
    let (Some(key), Some(start_raw), Some(stop_raw)) = (
        as_bulk(&args[0]),
        as_bulk(&args[1]),
        as_bulk(&args[2]),
    ) else {
        return not_bulk_string();
    };
    let (Some(start), Some(stop)) = (parse_int(start_raw), parse_int(stop_raw)) else {
        return not_integer();
    };

    let list = match store.find::<List>(key) {
        Ok(list) => list,
        Err(LookupError::WrongType) => return wrong_type(),
        Err(LookupError::NotFound) => return RespValue::array(Vec::new()),
    };

    let len = list.len() as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = (if stop < 0 { len + stop } else { stop }).min(len - 1);
    if start > stop {
        return RespValue::array(Vec::new());
    }

    let elements = (start..=stop)
        .map(|i| RespValue::BulkString(list[i as usize].clone()))
        .collect();
    RespValue::Array(elements)
}

/// SADD key member [member ...]
pub(crate) fn sadd(args: &[RespValue], store: &mut Keyspace) -> RespValue {
    if args.len() < 2 {
        return wrong_arg_count("SADD");
    }
    let Some(key) = as_bulk(&args[0]) else {
        return not_bulk_string();
    };
    let set = match store.find_or_create::<Set>(key) {
        Ok(set) => set,
        Err(_) => return wrong_type(),
    };
    let mut added = 0i64;
    for arg in &args[1..] {
        let Some(member) = as_bulk(arg) else {
            return not_bulk_string();
        };
        if set.insert(member.clone()) {
            added += 1;
        }
    }
    RespValue::Integer(added)
}

/// SREM key member [member ...]
pub(crate) fn srem(args: &[RespValue], store: &mut Keyspace) -> RespValue {
    if args.len() < 2 {
        return wrong_arg_count("SREM");
    }
    let Some(key) = as_bulk(&args[0]) else {
        return not_bulk_string();
    };
    let set = match store.find::<Set>(key) {
        Ok(set) => set,
        Err(LookupError::WrongType) => return wrong_type(),
        Err(LookupError::NotFound) => return RespValue::Integer(0),
    };
    let mut removed = 0i64;
    for arg in &args[1..] {
        let Some(member) = as_bulk(arg) else {
            return not_bulk_string();
        };
        if set.remove(&member[..]) {
            removed += 1;
        }
    }
    RespValue::Integer(removed)
}

/// SCARD key
pub(crate) fn scard(args: &[RespValue], store: &mut Keyspace) -> RespValue {
    if args.len() != 1 {
        return wrong_arg_count("SCARD");
    }
    let Some(key) = as_bulk(&args[0]) else {
        return not_bulk_string();
    };
    match store.find::<Set>(key) {
        Ok(set) => RespValue::Integer(set.len() as i64),
        Err(LookupError::WrongType) => wrong_type(),
        Err(LookupError::NotFound) => RespValue::Integer(0),
    }
}

/// SMEMBERS key — unspecified order.
pub(crate) fn smembers(args: &[RespValue], store: &mut Keyspace) -> RespValue {
    if args.len() != 1 {
        return wrong_arg_count("SMEMBERS");
    }
    let Some(key) = as_bulk(&args[0]) else {
        return not_bulk_string();
    };
    match store.find::<Set>(key) {
        Ok(set) => RespValue::Array(
            set.iter()
                .cloned()
                .map(RespValue::BulkString)
                .collect(),
        ),
        Err(LookupError::WrongType) => wrong_type(),
        Err(LookupError::NotFound) => RespValue::array(Vec::new()),
    }
}

/// SISMEMBER key member
pub(crate) fn sismember(args: &[RespValue], store: &mut Keyspace) -> RespValue {
    if args.len() != 2 {
        return wrong_arg_count("SISMEMBER");
    }
    let (Some(key), Some(member)) = (as_bulk(&args[0]), as_bulk(&args[1])) else {
        return not_bulk_string();
    };
    match store.find::<Set>(key) {
        Ok(set) => RespValue::Integer(i64::from(set.contains(&member[..]))),
        Err(LookupError::WrongType) => wrong_type(),
        Err(LookupError::NotFound) => RespValue::Integer(0),
    }
}

/// SINTER key [key ...] — a missing operand empties the result.
pub(crate) fn sinter(args: &[RespValue], store: &mut Keyspace) -> RespValue {
    if args.is_empty() {
        return wrong_arg_count("SINTER");
    }
    let Some(first_key) = as_bulk(&args[0]) else {
        return not_bulk_string();
    };
    let mut members: Vec<Bytes> = match store.find::<Set>(first_key) {
        Ok(set) => set.iter().cloned().collect(),
        Err(LookupError::WrongType) => return wrong_type(),
        Err(LookupError::NotFound) => return RespValue::array(Vec::new()),
    };
    for arg in &args[1..] {
        let Some(key) = as_bulk(arg) else {
            return not_bulk_string();
        };
        match store.find::<Set>(key) {
            Ok(set) => members.retain(|m| set.contains(&m[..])),
            Err(LookupError::WrongType) => return wrong_type(),
            Err(LookupError::NotFound) => return RespValue::array(Vec::new()),
        }
    }
    RespValue::Array(members.into_iter().map(RespValue::BulkString).collect())
}

/// EXPIRE key seconds — negative seconds are rejected like non-numbers.
pub(crate) fn expire(args: &[RespValue], store: &mut Keyspace) -> RespValue {
    if args.len() != 2 {
        return wrong_arg_count("EXPIRE");
    }
    let (Some(key), Some(secs_raw)) = (as_bulk(&args[0]), as_bulk(&args[1])) else {
        return not_bulk_string();
    };
    let secs = match parse_int(secs_raw) {
        Some(n) if n >= 0 => n as u64,
        _ => return not_integer(),
    };
    let applied = store.set_expiry(key, Duration::from_secs(secs));
    RespValue::Integer(i64::from(applied))
}

/// TTL key
pub(crate) fn ttl(args: &[RespValue], store: &mut Keyspace) -> RespValue {
    if args.len() != 1 {
        return wrong_arg_count("TTL");
    }
    let Some(key) = as_bulk(&args[0]) else {
        return not_bulk_string();
    };
    RespValue::Integer(store.get_ttl(key))
}
