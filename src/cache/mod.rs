pub mod decorator;
pub mod key;
pub mod metadata;
pub mod noop;
pub mod store;

pub use decorator::{Cacheable, CachedRepository};
pub use key::{canonicalize_search_text, CacheKeys, CacheOperation, TtlClass};
pub use metadata::{CacheMetadata, TTL_UNKNOWN};
pub use noop::{build_cache_store, select_store, NoopCacheStore};
pub use store::{CacheError, CacheResult, CacheStore, MemoryCacheStore};
