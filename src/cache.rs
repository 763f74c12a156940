//! Memoization of expensive upstream requests
//!
//! Results are stored as JSON under a [`Fingerprint`] of whatever determines
//! them. Concurrent requests for a missing key may all compute the result:
//! since results are pure functions of their key, this only wastes work.

use crate::{
    config::CacheConfig,
    error::{ApiError, ApiResult},
};
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::{
    fmt,
    future::Future,
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

/// Version of the cache key format, to be bumped whenever the serialized form
/// of cache keys or values changes
const KEY_VERSION: u32 = 1;

/// Deterministic cache key
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Fingerprint(Box<str>);
//
impl Fingerprint {
    /// Fingerprint some parameters within a namespace
    ///
    /// Parameters must serialize deterministically, which rules out hash-based
    /// collections.
    pub fn new(namespace: &str, params: &impl Serialize) -> ApiResult<Self> {
        let json = serde_json::to_vec(params).map_err(|e| {
            ApiError::Internal(format!("failed to fingerprint {namespace} parameters: {e}"))
        })?;
        let digest = Sha256::digest(&json);
        Ok(Self(format!("{namespace}:v{KEY_VERSION}:{digest:x}").into()))
    }

    /// Textual form of this key
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
//
impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key-value store that cached results are kept in
///
/// Stores own their eviction policy. Values are opaque bytes.
pub trait CacheStore: Send + Sync {
    /// Look up a value, if it is (still) there
    fn get(&self, key: &str) -> Option<Arc<[u8]>>;

    /// Insert or replace a value
    fn set(&self, key: &str, value: Arc<[u8]>);
}

/// In-process [`CacheStore`] with optional entry expiration and a bounded
/// number of entries
#[derive(Debug)]
pub struct MemoryStore {
    /// Stored entries
    entries: DashMap<Box<str>, StoredValue>,

    /// Time after which entries expire, if any
    ttl: Option<Duration>,

    /// Max number of entries
    capacity: NonZeroUsize,

    /// Insertion counter, used to find the oldest entries
    insertions: AtomicU64,
}
//
impl MemoryStore {
    /// Set up an empty store
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: config.ttl,
            capacity: config.capacity,
            insertions: AtomicU64::new(0),
        }
    }

    /// Number of stored entries, including expired ones not yet evicted
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Truth that an entry stored at a certain time has expired
    fn is_expired(&self, stored_at: Instant) -> bool {
        self.ttl.is_some_and(|ttl| stored_at.elapsed() >= ttl)
    }

    /// Make room for one more entry
    fn evict(&self) {
        self.entries.retain(|_key, value| !self.is_expired(value.stored_at));
        while self.entries.len() >= self.capacity.get() {
            let oldest = (self.entries.iter())
                .min_by_key(|entry| entry.value().insertion)
                .map(|entry| entry.key().clone());
            let Some(oldest) = oldest else {
                break;
            };
            log::trace!("Evicting cache entry {oldest}");
            self.entries.remove(&oldest);
        }
    }
}
//
impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Arc<[u8]>> {
        {
            let entry = self.entries.get(key)?;
            if !self.is_expired(entry.stored_at) {
                return Some(entry.value.clone());
            }
        }
        self.entries
            .remove_if(key, |_key, value| self.is_expired(value.stored_at));
        None
    }

    fn set(&self, key: &str, value: Arc<[u8]>) {
        if !self.entries.contains_key(key) && self.entries.len() >= self.capacity.get() {
            self.evict();
        }
        let insertion = self.insertions.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(
            key.into(),
            StoredValue {
                value,
                stored_at: Instant::now(),
                insertion,
            },
        );
    }
}

/// Value from a [`MemoryStore`] and associated metadata
#[derive(Debug)]
struct StoredValue {
    /// Serialized value
    value: Arc<[u8]>,

    /// When the value was stored
    stored_at: Instant,

    /// Value of the store's insertion counter when the value was stored
    insertion: u64,
}

/// Shared handle to the result cache
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn CacheStore>,
}
//
impl Cache {
    /// Use a certain cache store
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Use an in-process cache store
    pub fn in_memory(config: CacheConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new(config)))
    }

    /// Get a cached result, or compute and cache it
    ///
    /// Errors are propagated and never cached.
    pub async fn get_or_compute<T, F, Fut>(&self, key: &Fingerprint, compute: F) -> ApiResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        self.get_or_compute_if(key, compute, |_| true).await
    }

    /// Like [`get_or_compute()`](Self::get_or_compute), but only cache
    /// computed results that `should_store` accepts
    pub async fn get_or_compute_if<T, F, Fut>(
        &self,
        key: &Fingerprint,
        compute: F,
        should_store: impl FnOnce(&T) -> bool,
    ) -> ApiResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        if let Some(bytes) = self.store.get(key.as_str()) {
            match serde_json::from_slice(&bytes) {
                Ok(value) => {
                    log::trace!("Cache hit for {key}");
                    return Ok(value);
                }
                Err(e) => log::warn!("Ignoring undecodable cache entry {key}: {e}"),
            }
        }
        log::debug!("Cache miss for {key}, computing it");
        let value = compute().await?;
        if !should_store(&value) {
            log::debug!("Not caching {key}");
            return Ok(value);
        }
        match serde_json::to_vec(&value) {
            Ok(bytes) => self.store.set(key.as_str(), bytes.into()),
            Err(e) => log::warn!("Failed to serialize cache entry {key}: {e}"),
        }
        Ok(value)
    }
}
