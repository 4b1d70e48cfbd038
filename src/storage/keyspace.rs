//! Typed keyspace with TTL expiration.
//!
//! A single map from owned key bytes to a tagged value (string, list, or
//! set) plus an optional expiration deadline on a monotonic clock. A key
//! holds exactly one type at a time: an operation that needs a different
//! type gets [`LookupError::WrongType`] back, never a coercion.
//!
//! Expired entries are conceptually absent. They are removed two ways:
//! lazily, whenever a lookup touches one, and amortized, by [`Keyspace::sweep`]
//! probing random deadline-carrying keys with bounded work. Nothing ever
//! walks the whole map on the request path.
//!
//! Lookups take `&[u8]` and hash identically to the owned `Bytes` keys
//! (`Bytes: Borrow<[u8]>`), so no temporary key is allocated per lookup.

use bytes::Bytes;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};
use thiserror::Error;

/// String payload of a key.
pub type Str = Bytes;

/// List payload: O(1) push/pop at both ends, O(1) indexing.
pub type List = VecDeque<Bytes>;

/// Set payload: unique members, O(1) membership.
pub type Set = HashSet<Bytes>;

/// Why a typed lookup failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("key not found")]
    NotFound,
    #[error("key holds a value of another type")]
    WrongType,
}

/// The tagged payload of one keyspace entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(Str),
    List(List),
    Set(Set),
}

/// Types that can live in the keyspace and be looked up generically.
pub trait StoredType: Sized {
    /// A default-constructed payload for `find_or_create`.
    fn empty() -> Value;

    /// Projects the tagged payload onto this type, if the tags match.
    fn from_value(value: &mut Value) -> Option<&mut Self>;
}

impl StoredType for Str {
    fn empty() -> Value {
        Value::Str(Bytes::new())
    }

    fn from_value(value: &mut Value) -> Option<&mut Self> {
        match value {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl StoredType for List {
    fn empty() -> Value {
        Value::List(List::new())
    }

    fn from_value(value: &mut Value) -> Option<&mut Self> {
        match value {
            Value::List(l) => Some(l),
            _ => None,
        }
    }
}

impl StoredType for Set {
    fn empty() -> Value {
        Value::Set(Set::new())
    }

    fn from_value(value: &mut Value) -> Option<&mut Self> {
        match value {
            Value::Set(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// The shared keyspace. All access is serialized by the caller; no
/// interior locking here.
#[derive(Debug)]
pub struct Keyspace {
    data: HashMap<Bytes, Entry>,

    // Dense view of the keys that currently carry a deadline, so sweep can
    // probe uniformly in O(1) per check. `expiring_idx` maps key -> slot.
    expiring: Vec<Bytes>,
    expiring_idx: HashMap<Bytes, usize>,

    rng: SmallRng,
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyspace {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            expiring: Vec::new(),
            expiring_idx: HashMap::new(),
            rng: SmallRng::from_entropy(),
        }
    }

    /// Looks up a live entry, purging it first if it has expired.
    fn find_entry(&mut self, key: &[u8]) -> Option<&mut Entry> {
        let now = Instant::now();
        let expired = self.data.get(key)?.expired(now);
        if expired {
            self.purge(key);
            return None;
        }
        self.data.get_mut(key)
    }

    /// Typed lookup. `NotFound` covers both absent and expired entries.
    pub fn find<T: StoredType>(&mut self, key: &[u8]) -> Result<&mut T, LookupError> {
        let entry = self.find_entry(key).ok_or(LookupError::NotFound)?;
        T::from_value(&mut entry.value).ok_or(LookupError::WrongType)
    }

    /// Typed lookup that creates a default-constructed, deadline-free entry
    /// when the key is absent. An existing entry of another type is left
    /// untouched and reported as `WrongType`.
    pub fn find_or_create<T: StoredType>(&mut self, key: &[u8]) -> Result<&mut T, LookupError> {
        if self.find_entry(key).is_none() {
            self.data
                .insert(Bytes::copy_from_slice(key), Entry::new(T::empty()));
        }
        match self.data.get_mut(key) {
            Some(entry) => T::from_value(&mut entry.value).ok_or(LookupError::WrongType),
            // unreachable: the insert above guarantees presence
            None => Err(LookupError::NotFound),
        }
    }

    /// Removes a key. True iff an entry existed, expired or not.
    pub fn erase(&mut self, key: &[u8]) -> bool {
        if self.data.remove(key).is_none() {
            return false;
        }
        self.forget_deadline(key);
        true
    }

    /// True iff the key exists and has not expired.
    pub fn exists(&mut self, key: &[u8]) -> bool {
        self.find_entry(key).is_some()
    }

    /// All live keys, in unspecified order. Expired entries met along the
    /// way are purged.
    pub fn keys(&mut self) -> Vec<Bytes> {
        let now = Instant::now();
        let mut live = Vec::with_capacity(self.data.len());
        let mut dead = Vec::new();
        for (key, entry) in &self.data {
            if entry.expired(now) {
                dead.push(key.clone());
            } else {
                live.push(key.clone());
            }
        }
        for key in dead {
            self.purge(&key);
        }
        live
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.data.clear();
        self.expiring.clear();
        self.expiring_idx.clear();
    }

    /// Number of live-or-expired entries currently stored.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Sets the deadline to now + `ttl`, replacing any previous deadline.
    /// False iff the key is missing or already expired.
    pub fn set_expiry(&mut self, key: &[u8], ttl: Duration) -> bool {
        let now = Instant::now();
        let Some(entry) = self.find_entry(key) else {
            return false;
        };
        entry.expires_at = Some(now + ttl);
        self.track_deadline(key);
        true
    }

    /// Remaining time to live in whole seconds: `-2` missing or expired,
    /// `-1` present without a deadline, otherwise clamped at 0.
    pub fn get_ttl(&mut self, key: &[u8]) -> i64 {
        let now = Instant::now();
        let Some(entry) = self.find_entry(key) else {
            return -2;
        };
        let Some(deadline) = entry.expires_at else {
            return -1;
        };
        deadline.saturating_duration_since(now).as_secs() as i64
    }

    /// Amortized expiration: probes up to `max_checks` random
    /// deadline-carrying keys and removes the expired ones. Bounded work
    /// regardless of keyspace size.
    pub fn sweep(&mut self, max_checks: usize) {
        let now = Instant::now();
        for _ in 0..max_checks {
            if self.expiring.is_empty() {
                break;
            }
            let probe = self.rng.gen_range(0..self.expiring.len());
            let key = self.expiring[probe].clone();
            let expired = self
                .data
                .get(&key[..])
                .map_or(true, |entry| entry.expired(now));
            if expired {
                self.purge(&key);
            }
        }
    }

    fn purge(&mut self, key: &[u8]) {
        self.data.remove(key);
        self.forget_deadline(key);
    }

    fn track_deadline(&mut self, key: &[u8]) {
        if self.expiring_idx.contains_key(key) {
            return;
        }
        let Some((owned, _)) = self.data.get_key_value(key) else {
            return;
        };
        let owned = owned.clone();
        self.expiring_idx.insert(owned.clone(), self.expiring.len());
        self.expiring.push(owned);
    }

    fn forget_deadline(&mut self, key: &[u8]) {
        let Some(at) = self.expiring_idx.remove(key) else {
            return;
        };
        self.expiring.swap_remove(at);
        if at < self.expiring.len() {
            let moved = self.expiring[at].clone();
            self.expiring_idx.insert(moved, at);
        }
    }
}
