//! Process-lifetime key/value cache with per-entry expiry.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// In-memory map whose entries expire after a per-insert TTL.
///
/// One mutex guards the whole map, so at most one caller mutates it at a time.
/// Expired entries are dropped when a lookup touches them, and swept from the
/// whole map by inserts once it holds `prune_threshold` entries.
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, (V, Instant)>>,
    prune_threshold: usize,
}

const DEFAULT_PRUNE_THRESHOLD: usize = 256;

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self::with_prune_threshold(DEFAULT_PRUNE_THRESHOLD)
    }

    /// Sweep expired entries on insert once the map holds `threshold` entries
    pub fn with_prune_threshold(threshold: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            prune_threshold: threshold.max(1),
        }
    }

    /// Live value for `key`, if any.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if entries.len() >= self.prune_threshold {
            entries.retain(|_, (_, expires_at)| *expires_at > now);
        }
        entries.insert(key, (value, now + ttl));
    }

    /// Number of stored entries, expired ones included until touched.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
