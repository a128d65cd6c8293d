//! Memoises expensive derivations (OCR, transcripts, summaries) of content.
//!
//! An entry is keyed by the content fingerprint together with every
//! parameter that influences the output. Leaving a parameter out of the key
//! would serve stale output when that parameter changes, so callers add each
//! one explicitly with [`CacheKey::with`].

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::CacheConfig;
use crate::error::{RecallError, Result};

/// SHA-256 of `content`, hex encoded.
pub fn fingerprint(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

/// Content fingerprint plus the full set of output-affecting parameters.
///
/// Parameters are kept sorted, so insertion order never changes the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    fingerprint: String,
    params: BTreeMap<String, String>,
}

impl CacheKey {
    pub fn new(fingerprint: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(name.into(), value.to_string());
        self
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.fingerprint)?;
        for (name, value) in &self.params {
            write!(f, "|{name}={value}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedEntry<V> {
    pub value: V,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Calls answered from a stored entry.
    pub hits: u64,
    /// Calls that found no entry on first lookup.
    pub misses: u64,
    /// Times a compute function was invoked.
    pub computations: u64,
    /// Compute invocations that returned an error (never stored).
    pub failures: u64,
    pub entries: usize,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    computations: AtomicU64,
    failures: AtomicU64,
}

type KeyLock = Arc<tokio::sync::Mutex<()>>;

/// Per-key lock plus the number of callers currently registered for it.
struct Slot {
    lock: KeyLock,
    callers: usize,
}

type InFlightMap = Mutex<HashMap<CacheKey, Slot>>;

/// One caller's registration for a key. Dropping it unregisters the caller,
/// whether the call finished or its future was abandoned mid-await, and the
/// last caller out removes the slot.
struct InFlight<'a> {
    registry: &'a InFlightMap,
    key: &'a CacheKey,
    lock: KeyLock,
}

impl<'a> InFlight<'a> {
    fn join(registry: &'a InFlightMap, key: &'a CacheKey) -> Result<Self> {
        let mut slots = lock(registry)?;
        let slot = slots.entry(key.clone()).or_insert_with(|| Slot {
            lock: KeyLock::default(),
            callers: 0,
        });
        slot.callers += 1;
        Ok(Self {
            registry,
            key,
            lock: Arc::clone(&slot.lock),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut slots = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get_mut(self.key) {
            slot.callers = slot.callers.saturating_sub(1);
            if slot.callers == 0 {
                slots.remove(self.key);
            }
        }
    }
}

/// Thread-safe, LRU-bounded store of computed payloads.
///
/// Entries are insert-once: a stored value is never overwritten, only evicted.
/// Concurrent misses on the same key wait on a per-key lock, so at most one
/// computation per key runs at a time.
#[derive(Clone)]
pub struct ExtractionCache<V> {
    entries: Arc<Mutex<LruCache<CacheKey, CachedEntry<V>>>>,
    in_flight: Arc<InFlightMap>,
    counters: Arc<Counters>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| RecallError::Internal("extraction cache lock poisoned".to_string()))
}

impl<V: Clone + Send + Sync + 'static> ExtractionCache<V> {
    /// A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Arc::new(Mutex::new(LruCache::new(capacity))),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.capacity)
    }

    /// Maximum number of stored entries.
    pub fn capacity(&self) -> usize {
        self.entries
            .lock()
            .map(|entries| entries.cap().get())
            .unwrap_or(0)
    }

    pub fn get(&self, key: &CacheKey) -> Result<Option<CachedEntry<V>>> {
        Ok(lock(&self.entries)?.get(key).cloned())
    }

    /// Returns the stored payload for `key`, or runs `compute`, stores its
    /// output and returns it. Errors from `compute` are returned unchanged
    /// and leave no entry behind.
    pub async fn get_or_compute<F, Fut>(&self, key: CacheKey, compute: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(entry) = self.get(&key)? {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(entry.value);
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        let slot = InFlight::join(&self.in_flight, &key)?;
        let _turn = slot.lock.lock().await;
        self.compute_locked(&key, compute).await
    }

    async fn compute_locked<F, Fut>(&self, key: &CacheKey, compute: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        // Another caller may have finished while we waited for the lock.
        if let Some(entry) = self.get(key)? {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(entry.value);
        }

        self.counters.computations.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();

        match compute().await {
            Ok(value) => {
                let mut entries = lock(&self.entries)?;
                if !entries.contains(key) {
                    entries.put(
                        key.clone(),
                        CachedEntry {
                            value: value.clone(),
                            created_at: Utc::now(),
                        },
                    );
                }
                tracing::info!(
                    key = %key,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Computed extraction"
                );
                Ok(value)
            }
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key = %key, error = %e, "Extraction failed, not caching");
                Err(e)
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            computations: self.counters.computations.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            entries: self.entries.lock().map(|e| e.len()).unwrap_or(0),
        }
    }
}
