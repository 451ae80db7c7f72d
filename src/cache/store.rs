use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Transient cache store failure. Never fatal to a request.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Store could not be reached
    #[error("Cache store unavailable: {0}")]
    Unavailable(String),

    /// Store call did not complete before the request deadline
    #[error("Cache store call timed out")]
    Timeout,

    /// In-process store lock was poisoned by a panicking writer
    #[error("Cache store lock poisoned")]
    Poisoned,

    /// Any other backend-specific failure
    #[error("Cache store error: {0}")]
    Backend(String),
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Key-value store contract used by the cache-aside layer.
///
/// Implementations must be safe for concurrent use. Entries expire purely by
/// the TTL supplied at write time; nothing sweeps them from outside.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read a value. `Ok(None)` is a miss.
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Write a value with a TTL in seconds.
    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> CacheResult<()>;

    async fn delete(&self, key: &str) -> CacheResult<()>;

    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Remaining TTL of a live entry in whole seconds, `None` if absent.
    async fn remaining_ttl(&self, key: &str) -> CacheResult<Option<u64>>;

    /// Short name for log lines.
    fn name(&self) -> &'static str;
}

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Thread-safe in-process LRU store with per-entry expiry.
///
/// Bounded by entry count; expired entries read as misses and are dropped on
/// the read that notices them.
pub struct MemoryCacheStore {
    cache: Mutex<LruCache<String, Entry>>,
}

impl MemoryCacheStore {
    /// Create a new store holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);

        Self {
            cache: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Number of entries held, including ones that expired but were not read since.
    pub fn len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_cache<T>(&self, f: impl FnOnce(&mut LruCache<String, Entry>) -> T) -> CacheResult<T> {
        let mut guard = self.cache.lock().map_err(|_| CacheError::Poisoned)?;
        Ok(f(&mut guard))
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let now = Instant::now();
        self.with_cache(|cache| {
            let found = cache.get(key).map(|e| (e.is_live(now), e.value.clone()));
            match found {
                Some((true, value)) => Some(value),
                Some((false, _)) => {
                    cache.pop(key);
                    None
                }
                None => None,
            }
        })
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> CacheResult<()> {
        let expires_at = Instant::now() + Duration::from_secs(ttl_secs);
        self.with_cache(|cache| {
            cache.put(key.to_string(), Entry { value, expires_at });
        })
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.with_cache(|cache| {
            cache.pop(key);
        })
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let now = Instant::now();
        self.with_cache(|cache| cache.peek(key).is_some_and(|e| e.is_live(now)))
    }

    async fn remaining_ttl(&self, key: &str) -> CacheResult<Option<u64>> {
        let now = Instant::now();
        self.with_cache(|cache| {
            cache.peek(key).filter(|e| e.is_live(now)).map(|e| {
                let left = e.expires_at - now;
                // Round up so a live entry never reports 0
                left.as_secs() + u64::from(left.subsec_nanos() > 0)
            })
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
