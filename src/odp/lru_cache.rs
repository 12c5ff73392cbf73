//! Bounded LRU cache with per-entry TTL (spec §4.6), grounded on
//! `optimizely/odp/lru_cache.py`. Keyed by the composite string
//! `"{user_key}-$-{user_value}"` at the call site (see `segment_manager.rs`).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct CacheElement<V> {
    value: V,
    inserted_at: Instant,
}

impl<V> CacheElement<V> {
    fn is_stale(&self, timeout: Duration) -> bool {
        if timeout.is_zero() {
            return false;
        }
        self.inserted_at.elapsed() >= timeout
    }
}

struct Inner<V> {
    map: HashMap<String, CacheElement<V>>,
    /// Most-recently-used order, back = MRU. A linear scan on move-to-end is
    /// fine at the cache sizes this subsystem holds (segment lookups).
    order: Vec<String>,
}

/// Spec §4.6: capacity `<= 0` disables the cache entirely (every op is a
/// no-op / miss); timeout `<= 0` means entries never expire.
pub struct LruTtlCache<V> {
    capacity: usize,
    timeout: Duration,
    inner: Mutex<Inner<V>>,
}

impl<V: Clone> LruTtlCache<V> {
    pub fn new(capacity: usize, timeout: Duration) -> Self {
        LruTtlCache {
            capacity,
            timeout,
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                order: Vec::new(),
            }),
        }
    }

    fn touch(order: &mut Vec<String>, key: &str) {
        if let Some(pos) = order.iter().position(|k| k == key) {
            order.remove(pos);
        }
        order.push(key.to_string());
    }

    /// Returns the value if present and not stale, moving it to MRU. A
    /// stale entry is removed (only that entry, not the whole cache — see
    /// spec's resolution of Open Question #3) and treated as a miss.
    pub fn lookup(&self, key: &str) -> Option<V> {
        if self.capacity == 0 {
            return None;
        }
        let mut inner = self.inner.lock().expect("lru cache lock poisoned");
        let stale = match inner.map.get(key) {
            Some(element) => element.is_stale(self.timeout),
            None => return None,
        };
        if stale {
            inner.map.remove(key);
            inner.order.retain(|k| k != key);
            return None;
        }
        Self::touch(&mut inner.order, key);
        inner.map.get(key).map(|e| e.value.clone())
    }

    /// Inserts or moves `key` to MRU; evicts the LRU entry once capacity is
    /// exceeded.
    pub fn save(&self, key: &str, value: V) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock().expect("lru cache lock poisoned");
        inner.map.insert(
            key.to_string(),
            CacheElement {
                value,
                inserted_at: Instant::now(),
            },
        );
        Self::touch(&mut inner.order, key);
        if inner.map.len() > self.capacity {
            if let Some(lru_key) = (!inner.order.is_empty()).then(|| inner.order.remove(0)) {
                inner.map.remove(&lru_key);
            }
        }
    }

    pub fn reset(&self) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock().expect("lru cache lock poisoned");
        inner.map.clear();
        inner.order.clear();
    }

    /// Returns the value without touching recency or staleness.
    pub fn peek(&self, key: &str) -> Option<V> {
        if self.capacity == 0 {
            return None;
        }
        let inner = self.inner.lock().expect("lru cache lock poisoned");
        inner.map.get(key).map(|e| e.value.clone())
    }
}

/// Composite cache key for the ODP segment cache (spec §4.6).
pub fn segment_cache_key(user_key: &str, user_value: &str) -> String {
    format!("{user_key}-$-{user_value}")
}
