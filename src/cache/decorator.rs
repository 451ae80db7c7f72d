//! Cache-aside decoration of the catalog repository.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

use super::key::{CacheKeys, CacheOperation};
use super::store::{CacheError, CacheResult, CacheStore};
use crate::config::{CacheConfig, TtlConfig};
use crate::context::RequestContext;
use crate::error::Result;
use crate::graph::Graph;
use crate::model::{
    Dataset, DatasetSchema, DirectedEdge, Direction, Field, FieldRef, Job, LineageStatistics,
    Namespace, Page, Run,
};
use crate::repository::CatalogRepository;

/// Results that have a "nothing found" form which must never be cached.
pub trait Cacheable: Serialize + DeserializeOwned + Send + Sync {
    fn is_not_found(&self) -> bool;
}

impl<T> Cacheable for Vec<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn is_not_found(&self) -> bool {
        self.is_empty()
    }
}

impl Cacheable for Option<DatasetSchema> {
    fn is_not_found(&self) -> bool {
        self.is_none()
    }
}

/// A seed-only graph means the column has no lineage yet.
///
/// Such graphs are never written, so every request for a column without
/// lineage runs the full traversal against the store and reports no cache
/// status. Lineage recorded later shows up on the next request instead of
/// after a TTL.
impl Cacheable for Option<Graph> {
    fn is_not_found(&self) -> bool {
        self.as_ref().map_or(true, Graph::is_seed_only)
    }
}

impl Cacheable for LineageStatistics {
    fn is_not_found(&self) -> bool {
        false
    }
}

/// Repository decorator that serves the read endpoints' operations from a
/// key-value cache and falls back to the wrapped repository on a miss.
///
/// Only the operations listed in [`CacheOperation`] go through the cache;
/// everything else forwards straight to the inner repository. Cache faults
/// never reach the caller: a failing read is a miss and a failing write is
/// logged and dropped.
pub struct CachedRepository<R> {
    inner: R,
    store: Arc<dyn CacheStore>,
    keys: CacheKeys,
    ttl: TtlConfig,
}

impl<R: CatalogRepository> CachedRepository<R> {
    pub fn new(inner: R, store: Arc<dyn CacheStore>, config: &CacheConfig) -> Self {
        Self {
            inner,
            store,
            keys: CacheKeys::new(config.key_prefix.clone()),
            ttl: config.ttl.clone(),
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn keys(&self) -> &CacheKeys {
        &self.keys
    }

    /// Run a store call under the request deadline.
    async fn store_call<T, F>(&self, ctx: &RequestContext, fut: F) -> CacheResult<T>
    where
        F: Future<Output = CacheResult<T>>,
    {
        match ctx.deadline() {
            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                .await
                .map_err(|_| CacheError::Timeout)?,
            None => fut.await,
        }
    }

    /// Serve `key` from the cache. `None` means the caller must fetch.
    async fn lookup<T: Cacheable>(&self, ctx: &mut RequestContext, key: &str) -> Option<T> {
        if ctx.bypass_cache() {
            log::debug!("Cache bypass for {}", key);
            return None;
        }

        let bytes = match self.store_call(ctx, self.store.get(key)).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                log::debug!("Cache miss for {}", key);
                return None;
            }
            Err(e) => {
                log::warn!("Cache read failed for {}: {}", key, e);
                return None;
            }
        };

        let value: T = match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Discarding undecodable cache entry {}: {}", key, e);
                return None;
            }
        };
        if value.is_not_found() {
            return None;
        }

        let ttl = match self.store_call(ctx, self.store.remaining_ttl(key)).await {
            Ok(ttl) => ttl,
            Err(e) => {
                log::debug!("Could not read remaining TTL for {}: {}", key, e);
                None
            }
        };
        log::debug!("Cache hit for {}", key);
        ctx.metadata_mut().record_hit(ttl);
        Some(value)
    }

    /// Write a freshly fetched value back, unless it is a not-found result.
    async fn populate<T: Cacheable>(
        &self,
        ctx: &mut RequestContext,
        op: CacheOperation,
        key: &str,
        value: &T,
    ) {
        if value.is_not_found() {
            log::debug!("Not caching empty result for {}", key);
            return;
        }

        let ttl = op.ttl_class().ttl_secs(&self.ttl);
        match serde_json::to_vec(value) {
            Ok(bytes) => {
                if let Err(e) = self.store_call(ctx, self.store.set(key, bytes, ttl)).await {
                    log::warn!("Cache write failed for {}: {}", key, e);
                }
            }
            Err(e) => log::warn!("Could not encode {} for caching: {}", key, e),
        }
        ctx.metadata_mut().record_miss(ttl);
    }
}

#[async_trait]
impl<R: CatalogRepository> CatalogRepository for CachedRepository<R> {
    async fn get_namespace(&self, ctx: &mut RequestContext, id: i64) -> Result<Option<Namespace>> {
        self.inner.get_namespace(ctx, id).await
    }

    async fn list_namespaces(&self, ctx: &mut RequestContext, page: Page) -> Result<Vec<Namespace>> {
        let key = self.keys.namespace_list(page);
        if let Some(hit) = self.lookup(ctx, &key).await {
            return Ok(hit);
        }
        let value = self.inner.list_namespaces(ctx, page).await?;
        self.populate(ctx, CacheOperation::NamespaceList, &key, &value).await;
        Ok(value)
    }

    async fn get_dataset(&self, ctx: &mut RequestContext, id: i64) -> Result<Option<Dataset>> {
        self.inner.get_dataset(ctx, id).await
    }

    async fn list_datasets(
        &self,
        ctx: &mut RequestContext,
        namespace_id: i64,
        page: Page,
    ) -> Result<Vec<Dataset>> {
        let key = self.keys.dataset_list(namespace_id, page);
        if let Some(hit) = self.lookup(ctx, &key).await {
            return Ok(hit);
        }
        let value = self.inner.list_datasets(ctx, namespace_id, page).await?;
        self.populate(ctx, CacheOperation::DatasetList, &key, &value).await;
        Ok(value)
    }

    async fn search_datasets(
        &self,
        ctx: &mut RequestContext,
        text: &str,
        limit: usize,
    ) -> Result<Vec<Dataset>> {
        let key = self.keys.dataset_search(text, limit);
        if let Some(hit) = self.lookup(ctx, &key).await {
            return Ok(hit);
        }
        let value = self.inner.search_datasets(ctx, text, limit).await?;
        self.populate(ctx, CacheOperation::DatasetSearch, &key, &value).await;
        Ok(value)
    }

    async fn get_dataset_schema(
        &self,
        ctx: &mut RequestContext,
        dataset_id: i64,
    ) -> Result<Option<DatasetSchema>> {
        let key = self.keys.dataset_schema(dataset_id);
        if let Some(hit) = self.lookup(ctx, &key).await {
            return Ok(hit);
        }
        let value = self.inner.get_dataset_schema(ctx, dataset_id).await?;
        self.populate(ctx, CacheOperation::DatasetSchema, &key, &value).await;
        Ok(value)
    }

    async fn get_field(&self, ctx: &mut RequestContext, id: i64) -> Result<Option<Field>> {
        self.inner.get_field(ctx, id).await
    }

    async fn list_fields(&self, ctx: &mut RequestContext, dataset_id: i64) -> Result<Vec<Field>> {
        self.inner.list_fields(ctx, dataset_id).await
    }

    async fn get_job(&self, ctx: &mut RequestContext, id: i64) -> Result<Option<Job>> {
        self.inner.get_job(ctx, id).await
    }

    async fn list_jobs(
        &self,
        ctx: &mut RequestContext,
        namespace_id: i64,
        page: Page,
    ) -> Result<Vec<Job>> {
        self.inner.list_jobs(ctx, namespace_id, page).await
    }

    async fn get_run(&self, ctx: &mut RequestContext, id: i64) -> Result<Option<Run>> {
        self.inner.get_run(ctx, id).await
    }

    async fn list_runs(&self, ctx: &mut RequestContext, job_id: i64, page: Page) -> Result<Vec<Run>> {
        self.inner.list_runs(ctx, job_id, page).await
    }

    async fn get_lineage_edges(
        &self,
        ctx: &mut RequestContext,
        seed: &FieldRef,
        direction: Direction,
        max_depth: usize,
    ) -> Result<Vec<DirectedEdge>> {
        self.inner.get_lineage_edges(ctx, seed, direction, max_depth).await
    }

    async fn get_lineage_statistics(&self, ctx: &mut RequestContext) -> Result<LineageStatistics> {
        let key = self.keys.lineage_statistics();
        if let Some(hit) = self.lookup(ctx, &key).await {
            return Ok(hit);
        }
        let value = self.inner.get_lineage_statistics(ctx).await?;
        self.populate(ctx, CacheOperation::LineageStatistics, &key, &value).await;
        Ok(value)
    }

    /// The key leaves out `max_depth`: a graph cached for one depth answers
    /// every depth for the same seed and direction until it expires.
    async fn get_column_lineage_graph(
        &self,
        ctx: &mut RequestContext,
        dataset_id: i64,
        field: &str,
        direction: Direction,
        max_depth: usize,
    ) -> Result<Option<Graph>> {
        let key = self.keys.lineage_graph(dataset_id, field, direction);
        if let Some(hit) = self.lookup(ctx, &key).await {
            return Ok(hit);
        }
        let value = self
            .inner
            .get_column_lineage_graph(ctx, dataset_id, field, direction, max_depth)
            .await?;
        self.populate(ctx, CacheOperation::LineageGraph, &key, &value).await;
        Ok(value)
    }
}
