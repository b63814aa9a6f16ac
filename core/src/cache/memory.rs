//! In-memory cache backend.

use super::{Cache, CacheError};
use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// TTL-based in-memory key-value cache. Expired entries are evicted
/// lazily on read.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > Instant::now() {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.entries
            .remove_if(key, |_, entry| entry.expires_at <= Instant::now());
        Ok(None)
    }

    fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }
}

/// Backend double that always fails; proves the pass-through posture.
#[derive(Debug, Default)]
pub struct FailingCache;

impl Cache for FailingCache {
    fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::backend("cache backend unreachable"))
    }

    fn put(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::backend("cache backend unreachable"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_put_get_round_trip() {
        let cache = MemoryCache::new();
        cache.put("a", "1", Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get("a").unwrap(), Some("1".to_string()));
        assert_eq!(cache.get("b").unwrap(), None);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = MemoryCache::new();
        cache.put("a", "1", Duration::from_millis(20)).unwrap();
        thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.get("a").unwrap(), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_failing_cache_fails() {
        let cache = FailingCache;
        assert!(cache.get("a").is_err());
        assert!(cache.put("a", "1", Duration::from_secs(1)).is_err());
    }
}
