use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

/// How long token lists and balances stay fresh.
pub const CACHE_DURATION: Duration = Duration::from_millis(60_000);

/// A cached payload and the moment it was fetched.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub payload: T,
    pub fetched_at: Instant,
}

impl<T> CacheEntry<T> {
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            fetched_at: Instant::now(),
        }
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// Lookup result that keeps expired entries visible to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cached<T> {
    Fresh(T),
    Expired(T),
    Missing,
}

/// Time-boxed map. Expired entries are kept until replaced so callers can
/// fall back to them when an upstream refresh fails.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: HashMap<K, CacheEntry<V>>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, key: &K) -> Cached<V> {
        match self.entries.get(key) {
            Some(entry) if entry.is_fresh(self.ttl) => Cached::Fresh(entry.payload.clone()),
            Some(entry) => Cached::Expired(entry.payload.clone()),
            None => Cached::Missing,
        }
    }

    pub fn get_fresh(&self, key: &K) -> Option<V> {
        match self.get(key) {
            Cached::Fresh(value) => Some(value),
            _ => None,
        }
    }

    /// Last known value, fresh or not.
    pub fn last_known(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|entry| entry.payload.clone())
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.entries.insert(key, CacheEntry::new(value));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
