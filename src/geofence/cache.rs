use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Expiry-aware key/value store.
///
/// Entries are served for `ttl` after insertion and dropped once older than
/// `purge_after`. Dropping happens in an opportunistic sweep on insert, at
/// most once per `ttl`.
pub struct TtlCache<K, V> {
    ttl: Duration,
    purge_after: Duration,
    inner: Mutex<CacheInner<K, V>>,
}

struct CacheInner<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    last_sweep: Instant,
}

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration, purge_after: Duration) -> Self {
        Self {
            ttl,
            purge_after: purge_after.max(ttl),
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    /// Fresh value for `key`, if one was stored less than `ttl` ago
    pub fn get(&self, key: &K) -> Option<V> {
        let inner = self.inner.lock();
        inner
            .entries
            .get(key)
            .filter(|entry| entry.inserted_at.elapsed() < self.ttl)
            .map(|entry| entry.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.inner.lock();
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );

        if inner.last_sweep.elapsed() >= self.ttl {
            Self::sweep(&mut inner, self.purge_after);
        }
    }

    /// Drop every entry whose key matches
    pub fn invalidate_where<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&K) -> bool,
    {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|key, _| !predicate(key));
        before - inner.entries.len()
    }

    /// Drop entries older than the purge window; returns how many went
    pub fn purge_expired(&self) -> usize {
        let mut inner = self.inner.lock();
        Self::sweep(&mut inner, self.purge_after)
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    /// Stored entries, including stale ones not yet purged
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sweep(inner: &mut CacheInner<K, V>, purge_after: Duration) -> usize {
        let before = inner.entries.len();
        inner
            .entries
            .retain(|_, entry| entry.inserted_at.elapsed() < purge_after);
        inner.last_sweep = Instant::now();

        let purged = before - inner.entries.len();
        if purged > 0 {
            debug!("Purged {} expired cache entries", purged);
        }
        purged
    }
}
