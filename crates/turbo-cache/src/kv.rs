//! Key-value store with automatic serialization and expiry.

use crate::CacheError;
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Entry {
    bytes: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map(|at| now < at).unwrap_or(true)
    }
}

/// Type-safe in-process cache.
///
/// Cheap to clone; clones share entries. Provides automatic JSON
/// serialization for any type that implements `Serialize` and
/// `DeserializeOwned`.
#[derive(Debug, Clone)]
pub struct Cache {
    entries: Arc<DashMap<String, Entry>>,
    default_ttl: Option<Duration>,
}

impl Default for Cache {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl Cache {
    /// Create a cache whose entries expire after `default_ttl`.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            default_ttl: Some(default_ttl),
        }
    }

    /// Create a cache whose entries never expire.
    pub fn unbounded() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            default_ttl: None,
        }
    }

    /// Get a value from the cache.
    ///
    /// Returns `None` if the key doesn't exist or has expired.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let now = Instant::now();
        // Release the shard guard before removing.
        let found = self
            .entries
            .get(key)
            .map(|e| e.is_live(now).then(|| e.bytes.clone()));
        let bytes = match found {
            Some(Some(bytes)) => bytes,
            Some(None) => {
                self.entries.remove_if(key, |_, e| !e.is_live(now));
                return Ok(None);
            }
            None => return Ok(None),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Get a value that must be present.
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T, CacheError> {
        self.get(key)?
            .ok_or_else(|| CacheError::NotFound(key.to_string()))
    }

    /// Set a value with the default TTL.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        self.insert(key, value, self.default_ttl)
    }

    /// Set a value with an explicit TTL.
    pub fn set_with_ttl<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.insert(key, value, Some(ttl))
    }

    fn insert<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(value)?;
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .insert(key.to_string(), Entry { bytes, expires_at });
        Ok(())
    }

    /// Delete a value. Returns whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Delete every key starting with `prefix`. Returns how many were removed.
    pub fn delete_prefix(&self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, _| !k.starts_with(prefix));
        before.saturating_sub(self.entries.len())
    }

    /// Check if a live key exists.
    pub fn exists(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .get(key)
            .map(|e| e.is_live(now))
            .unwrap_or(false)
    }

    /// Get all live keys.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|e| e.value().is_live(now))
            .map(|e| e.key().clone())
            .collect()
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_live(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::trace!(removed, "Purged expired cache entries");
        }
        removed
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Helper to build cache keys with namespacing.
///
/// # Example
///
/// ```rust
/// use turbo_cache::cache_key;
///
/// let key = cache_key!("cart", "user123");
/// assert_eq!(key, "cart:user123");
/// ```
#[macro_export]
macro_rules! cache_key {
    ($prefix:expr, $($part:expr),+) => {{
        let mut key = String::from($prefix);
        $(
            key.push(':');
            key.push_str(&$part.to_string());
        )+
        key
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_delete() {
        let cache = Cache::unbounded();
        cache.set("a", &42u32).unwrap();
        assert_eq!(cache.get::<u32>("a").unwrap(), Some(42));
        assert!(cache.delete("a"));
        assert_eq!(cache.get::<u32>("a").unwrap(), None);
        assert!(matches!(cache.require::<u32>("a"), Err(CacheError::NotFound(_))));
    }

    #[test]
    fn test_expired_entries_are_invisible() {
        let cache = Cache::unbounded();
        cache.set_with_ttl("a", &1u8, Duration::ZERO).unwrap();
        cache.set("b", &2u8).unwrap();

        assert_eq!(cache.get::<u8>("a").unwrap(), None);
        assert!(!cache.exists("a"));
        assert_eq!(cache.keys(), vec!["b".to_string()]);
        cache.purge_expired();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_delete_prefix() {
        let cache = Cache::unbounded();
        cache.set(&cache_key!("cart", "u1"), &1).unwrap();
        cache.set(&cache_key!("cart", "u2"), &2).unwrap();
        cache.set(&cache_key!("order", "u1"), &3).unwrap();

        assert_eq!(cache.delete_prefix("cart:"), 2);
        assert!(cache.exists("order:u1"));
    }

    #[test]
    fn test_type_mismatch_is_serialize_error() {
        let cache = Cache::unbounded();
        cache.set("a", &"text").unwrap();
        assert!(matches!(cache.get::<u32>("a"), Err(CacheError::SerializeError(_))));
    }
}
