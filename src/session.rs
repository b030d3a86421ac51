//! Tiered session token storage.
//!
//! Established connections can export a resumption blob (see
//! `session_blob()` on [`Client`](crate::Client) and
//! [`Server`](crate::Server)). This module stores such blobs across a fast
//! best-effort cache tier and a durable tier.
//!
//! Cache operations report success as a `bool` and never fail the call;
//! durable tier faults are real errors. A failed cache write is followed by
//! a cache delete so a stale entry can never shadow the durable value. If
//! even the delete fails, the write is abandoned before touching the durable
//! tier and reported as not stored.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("durable store failure: {0}")]
    Durable(String),
}

/// Fast, lossy tier. Entries can vanish at any time.
pub trait CacheStore {
    fn get(&mut self, key: &str) -> Option<Vec<u8>>;

    /// Returns `false` when the value could not be stored.
    fn set(&mut self, key: &str, value: &[u8]) -> bool;

    /// Returns `false` when the entry could not be removed.
    fn delete(&mut self, key: &str) -> bool;
}

/// Authoritative tier.
pub trait DurableStore {
    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

/// Cache in front of a durable store.
pub struct TieredStore<C, D> {
    cache: C,
    durable: D,
}

impl<C: CacheStore, D: DurableStore> TieredStore<C, D> {
    pub fn new(cache: C, durable: D) -> Self {
        TieredStore { cache, durable }
    }

    /// Look a token up, cache first. A durable hit is written back to the
    /// cache best-effort.
    pub fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(value) = self.cache.get(key) {
            return Ok(Some(value));
        }

        let Some(value) = self.durable.get(key)? else {
            return Ok(None);
        };

        if !self.cache.set(key, &value) {
            self.cache.delete(key);
        }
        Ok(Some(value))
    }

    /// Store a token in both tiers.
    ///
    /// Returns `Ok(false)` when the cache ended up in an unknown state (set
    /// and the cleanup delete both failed); the durable tier is then left
    /// untouched so the two tiers cannot disagree.
    pub fn set(&mut self, key: &str, value: &[u8]) -> Result<bool, StoreError> {
        if !self.cache.set(key, value) {
            warn!("Cache set failed for {}, evicting", key);
            if !self.cache.delete(key) {
                return Ok(false);
            }
        }

        self.durable.put(key, value)?;
        Ok(true)
    }

    /// Remove a token from both tiers. The cache delete is best-effort.
    pub fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.cache.delete(key);
        self.durable.remove(key)
    }
}

/// In-memory cache tier with failure injection for tests.
#[derive(Default)]
pub struct MemoryCache {
    entries: HashMap<String, Vec<u8>>,
    pub fail_set: bool,
    pub fail_delete: bool,
}

impl CacheStore for MemoryCache {
    fn get(&mut self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &[u8]) -> bool {
        if self.fail_set {
            return false;
        }
        self.entries.insert(key.to_string(), value.to_vec());
        true
    }

    fn delete(&mut self, key: &str) -> bool {
        if self.fail_delete {
            return false;
        }
        self.entries.remove(key);
        true
    }
}

/// In-memory durable tier with failure injection for tests.
#[derive(Default)]
pub struct MemoryDurable {
    entries: HashMap<String, Vec<u8>>,
    pub fail: bool,
}

impl DurableStore for MemoryDurable {
    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if self.fail {
            return Err(StoreError::Durable("injected failure".into()));
        }
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        if self.fail {
            return Err(StoreError::Durable("injected failure".into()));
        }
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        if self.fail {
            return Err(StoreError::Durable("injected failure".into()));
        }
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> TieredStore<MemoryCache, MemoryDurable> {
        TieredStore::new(MemoryCache::default(), MemoryDurable::default())
    }

    #[test]
    fn set_then_get_hits_cache() {
        let mut s = store();
        assert_eq!(s.set("k", b"blob").unwrap(), true);
        assert_eq!(s.get("k").unwrap(), Some(b"blob".to_vec()));
    }

    #[test]
    fn cache_miss_falls_through_and_backfills() {
        let mut s = store();
        s.durable.put("k", b"blob").unwrap();

        assert_eq!(s.get("k").unwrap(), Some(b"blob".to_vec()));
        // Now served from cache.
        assert_eq!(s.cache.get("k"), Some(b"blob".to_vec()));
    }

    #[test]
    fn failed_cache_set_still_reaches_durable() {
        let mut s = store();
        s.cache.fail_set = true;

        assert_eq!(s.set("k", b"blob").unwrap(), true);
        assert_eq!(s.durable.get("k").unwrap(), Some(b"blob".to_vec()));
        assert_eq!(s.cache.entries.get("k"), None);
    }

    #[test]
    fn failed_cache_set_and_delete_abandons_write() {
        let mut s = store();
        s.cache.fail_set = true;
        s.cache.fail_delete = true;

        assert_eq!(s.set("k", b"blob").unwrap(), false);
        // The durable tier was never touched and lookups stay absent.
        assert_eq!(s.durable.get("k").unwrap(), None);
        assert_eq!(s.get("k").unwrap(), None);
    }

    #[test]
    fn durable_fault_propagates() {
        let mut s = store();
        s.durable.fail = true;

        assert!(s.set("k", b"blob").is_err());
        assert!(s.get("missing").is_err());
    }

    #[test]
    fn remove_clears_both_tiers() {
        let mut s = store();
        s.set("k", b"blob").unwrap();
        s.remove("k").unwrap();

        assert_eq!(s.get("k").unwrap(), None);
    }
}
