//! Provider response cache keyed by signal-set fingerprint.
//!
//! Least-recently-used eviction past `capacity`, per-entry TTL. Concurrent
//! identical misses may both populate a key; the later write simply wins.

use crate::config::CacheConfig;
use crate::domain::Evidence;
use crate::error::ConfigError;
use lru::LruCache;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

struct CacheEntry {
    evidence: Arc<Vec<Evidence>>,
    inserted_at: Instant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

pub struct EvidenceCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EvidenceCache {
    pub fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Result<Self, ConfigError> {
        let capacity = NonZeroUsize::new(config.capacity).ok_or(ConfigError::ZeroValue("cache.capacity"))?;
        Ok(Self::new(capacity, Duration::from_secs(config.ttl_secs)))
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<Arc<Vec<Evidence>>> {
        let mut entries = self.lock();
        let fresh = match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() <= self.ttl => {
                Some(Arc::clone(&entry.evidence))
            }
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        };
        drop(entries);

        let counter = if fresh.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        fresh
    }

    pub fn insert(&self, key: String, evidence: Vec<Evidence>) -> Arc<Vec<Evidence>> {
        let evidence = Arc::new(evidence);
        let entry = CacheEntry { evidence: Arc::clone(&evidence), inserted_at: Instant::now() };
        self.lock().put(key, entry);
        evidence
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.lock();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.inserted_at.elapsed() > self.ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}
