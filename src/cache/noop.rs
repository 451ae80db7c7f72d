//! Cache store that never stores anything, plus startup store selection.

use async_trait::async_trait;
use std::sync::Arc;

use super::store::{CacheResult, CacheStore, MemoryCacheStore};
use crate::config::{CacheBackendKind, CacheConfig};

/// Store used when caching is disabled or the real store is unreachable.
///
/// Reads always miss, writes and deletes succeed without effect, and nothing
/// ever exists, so a decorated repository behaves exactly like the undecorated one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCacheStore;

#[async_trait]
impl CacheStore for NoopCacheStore {
    async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl_secs: u64) -> CacheResult<()> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> CacheResult<()> {
        Ok(())
    }

    async fn exists(&self, _key: &str) -> CacheResult<bool> {
        Ok(false)
    }

    async fn remaining_ttl(&self, _key: &str) -> CacheResult<Option<u64>> {
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

const HEALTH_PROBE_KEY: &str = "__lineage_cache_probe__";

/// Round-trip a probe key to check the store is usable.
pub async fn probe(store: &dyn CacheStore) -> CacheResult<()> {
    store.set(HEALTH_PROBE_KEY, b"1".to_vec(), 1).await?;
    store.exists(HEALTH_PROBE_KEY).await?;
    store.delete(HEALTH_PROBE_KEY).await
}

/// Pick the cache store for this process.
///
/// Falls back to [`NoopCacheStore`] when caching is disabled, the configured
/// backend is `none`, or the configured store fails its health probe.
pub async fn build_cache_store(config: &CacheConfig) -> Arc<dyn CacheStore> {
    if !config.enabled || config.backend == CacheBackendKind::None {
        log::info!("Caching disabled, using no-op cache store");
        return Arc::new(NoopCacheStore);
    }

    let store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new(config.capacity));
    select_store(store).await
}

/// Keep `store` if it passes the health probe, otherwise degrade to no-op.
pub async fn select_store(store: Arc<dyn CacheStore>) -> Arc<dyn CacheStore> {
    match probe(store.as_ref()).await {
        Ok(()) => {
            log::info!("Using {} cache store", store.name());
            store
        }
        Err(e) => {
            log::warn!(
                "Cache store {} unavailable ({}), falling back to no-op cache",
                store.name(),
                e
            );
            Arc::new(NoopCacheStore)
        }
    }
}
