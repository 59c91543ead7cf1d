//! Time-bounded, invalidate-on-write read cache.
//!
//! Sits strictly in front of the query interface: mutating commands never
//! read through it, they only invalidate affected keys after commit.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|d| Instant::now() + d),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() > at)
    }
}

/// In-memory cache keyed by string, JSON-serialized values.
#[derive(Debug, Clone)]
pub struct QueryCache {
    store: Arc<DashMap<String, CacheEntry>>,
    capacity: usize,
    default_ttl: Option<Duration>,
}

impl QueryCache {
    pub fn new(capacity: usize, default_ttl: Option<Duration>) -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            capacity,
            default_ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let expired = match self.store.get(key) {
            Some(entry) if entry.is_expired() => true,
            Some(entry) => return Some(entry.value.clone()),
            None => return None,
        };
        if expired {
            self.store.remove(key);
        }
        None
    }

    pub fn put(&self, key: &str, value: String) {
        if self.store.len() >= self.capacity {
            self.store.retain(|_, entry| !entry.is_expired());
        }
        if self.store.len() >= self.capacity {
            // Still full after purging: drop an arbitrary entry.
            if let Some(victim) = self.store.iter().next().map(|e| e.key().clone()) {
                self.store.remove(&victim);
            }
        }
        self.store
            .insert(key.to_string(), CacheEntry::new(value, self.default_ttl));
    }

    pub fn invalidate(&self, key: &str) {
        self.store.remove(key);
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

/// Cache key for a stock record lookup.
pub fn stock_record_key(
    tenant_id: uuid::Uuid,
    warehouse_id: uuid::Uuid,
    product_id: uuid::Uuid,
) -> String {
    format!("stock:{tenant_id}:{warehouse_id}:{product_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_invalidate() {
        let cache = QueryCache::new(8, None);
        cache.put("a", "1".into());
        assert_eq!(cache.get("a").as_deref(), Some("1"));
        cache.invalidate("a");
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn entries_expire() {
        let cache = QueryCache::new(8, Some(Duration::from_millis(0)));
        cache.put("a", "1".into());
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn capacity_is_respected() {
        let cache = QueryCache::new(2, None);
        cache.put("a", "1".into());
        cache.put("b", "2".into());
        cache.put("c", "3".into());
        assert!(cache.len() <= 2);
    }
}
