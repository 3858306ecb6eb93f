//! Result tables for a memoized callable.
//!
//! Two independent tables are kept per memoizer:
//!
//! - the **identity table**, keyed by instance ids. Each entry holds weak
//!   handles to the instances it is keyed by, so entries whose keys are no
//!   longer reachable anywhere else can be dropped with
//!   [`CacheStore::purge_unreachable`];
//! - the **canonical table**, keyed by canonical encodings. Entries live as
//!   long as the store.
//!
//! There is no eviction and no size bound.
//!
//! A self-referential key (an array or object that contains itself) keeps
//! itself alive through its own cycle, so its identity entry stays
//! reachable until the caller breaks the cycle, e.g. with `clear` or
//! `remove` on the key.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use memora_core::WeakValue;

use crate::classify::Table;
use crate::keys::{CacheKey, CanonicalKey, IdentityKey};

/// A stored result with access bookkeeping.
#[derive(Clone, Debug)]
pub struct CacheEntry<R> {
    value: R,
    created_at: Instant,
    last_accessed: Instant,
    /// Number of lookups served by this entry.
    pub hit_count: u64,
}

impl<R> CacheEntry<R> {
    #[must_use]
    pub fn new(value: R) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            last_accessed: now,
            hit_count: 0,
        }
    }

    #[must_use]
    pub fn value(&self) -> &R {
        &self.value
    }

    /// Record an access to this entry.
    pub fn record_access(&mut self) {
        self.last_accessed = Instant::now();
        self.hit_count += 1;
    }

    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    #[must_use]
    pub fn time_since_access(&self) -> Duration {
        self.last_accessed.elapsed()
    }
}

struct IdentityEntry<R> {
    entry: CacheEntry<R>,
    anchors: Vec<WeakValue>,
}

impl<R> IdentityEntry<R> {
    fn is_reachable(&self) -> bool {
        self.anchors.iter().all(WeakValue::is_alive)
    }
}

/// Identity and canonical result tables.
///
/// # Example
///
/// ```
/// use memora_core::{MapValue, Value};
/// use memora_memo::config::TupleKeying;
/// use memora_memo::keys::resolve;
/// use memora_memo::store::CacheStore;
///
/// let mut store = CacheStore::new();
/// let map = MapValue::new();
///
/// let resolved = resolve(&[Value::from(map.clone())], TupleKeying::SingleArgument);
/// store.store(resolved.key.clone(), 42, resolved.anchors);
/// assert_eq!(store.lookup(&resolved.key), Some(42));
///
/// // The key instance is gone: the entry can be reclaimed.
/// drop(map);
/// assert_eq!(store.purge_unreachable(), 1);
/// assert!(store.is_empty());
/// ```
pub struct CacheStore<R> {
    identity: HashMap<IdentityKey, IdentityEntry<R>>,
    canonical: HashMap<CanonicalKey, CacheEntry<R>>,
}

impl<R> CacheStore<R> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            identity: HashMap::new(),
            canonical: HashMap::new(),
        }
    }

    /// Look at an entry without counting an access.
    #[must_use]
    pub fn peek(&self, key: &CacheKey) -> Option<&CacheEntry<R>> {
        match key {
            CacheKey::Identity(k) => self.identity.get(k).map(|e| &e.entry),
            CacheKey::Canonical(k) => self.canonical.get(k),
        }
    }

    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.peek(key).is_some()
    }

    /// Store a result. An existing entry under the same key is replaced.
    ///
    /// `anchors` are the instances an identity key was built from; they are
    /// ignored for canonical keys.
    pub fn store(&mut self, key: CacheKey, value: R, anchors: Vec<WeakValue>) {
        match key {
            CacheKey::Identity(k) => {
                self.identity.insert(
                    k,
                    IdentityEntry {
                        entry: CacheEntry::new(value),
                        anchors,
                    },
                );
            }
            CacheKey::Canonical(k) => {
                self.canonical.insert(k, CacheEntry::new(value));
            }
        }
    }

    /// Drop identity entries keyed by an instance that no longer exists.
    ///
    /// Returns the number of entries dropped. Canonical entries are never
    /// touched. Entries keyed by a value that still contains itself are
    /// reachable and are kept.
    pub fn purge_unreachable(&mut self) -> usize {
        let before = self.identity.len();
        self.identity.retain(|_, e| e.is_reachable());
        before - self.identity.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.identity.len() + self.canonical.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.identity.is_empty() && self.canonical.is_empty()
    }

    /// Number of entries in one table.
    #[must_use]
    pub fn table_len(&self, table: Table) -> usize {
        match table {
            Table::Identity => self.identity.len(),
            Table::Canonical => self.canonical.len(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let identity_hits: u64 = self.identity.values().map(|e| e.entry.hit_count).sum();
        let canonical_hits: u64 = self.canonical.values().map(|e| e.hit_count).sum();

        StoreStats {
            identity_entries: self.identity.len(),
            canonical_entries: self.canonical.len(),
            unreachable_entries: self
                .identity
                .values()
                .filter(|e| !e.is_reachable())
                .count(),
            total_hits: identity_hits + canonical_hits,
        }
    }
}

impl<R: Clone> CacheStore<R> {
    /// Look up a result, counting the access on a hit.
    pub fn lookup(&mut self, key: &CacheKey) -> Option<R> {
        let entry = match key {
            CacheKey::Identity(k) => self.identity.get_mut(k).map(|e| &mut e.entry),
            CacheKey::Canonical(k) => self.canonical.get_mut(k),
        }?;
        entry.record_access();
        Some(entry.value.clone())
    }
}

impl<R> Default for CacheStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Store statistics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreStats {
    /// Entries in the identity table.
    pub identity_entries: usize,
    /// Entries in the canonical table.
    pub canonical_entries: usize,
    /// Identity entries whose key instance is gone but not yet purged.
    pub unreachable_entries: usize,
    /// Lookups served across all entries.
    pub total_hits: u64,
}
