//! Test doubles shared by the cache, repository and HTTP tests.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::cache::{canonicalize_search_text, CacheError, CacheResult, CacheStore, MemoryCacheStore};
use crate::context::RequestContext;
use crate::error::{LineageError, Result};
use crate::graph::collect_lineage_edges;
use crate::model::{
    Dataset, DatasetSchema, DirectedEdge, Direction, Field, FieldRef, Job, LineageStatistics,
    Namespace, Page, Run, TransformationSubtype, TransformationType,
};
use crate::repository::CatalogRepository;

pub fn edge(source: FieldRef, target: FieldRef) -> DirectedEdge {
    DirectedEdge {
        source,
        target,
        transformation_type: TransformationType::Direct,
        transformation_subtype: TransformationSubtype::Identity,
        confidence: 1.0,
        active: true,
        discovered_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
    }
}

pub fn wh(dataset: &str, field: &str) -> FieldRef {
    FieldRef::new("warehouse", dataset, field)
}

/// In-memory catalog that counts calls per operation and can be told to fail.
///
/// Holds one namespace "warehouse" (id 1) with datasets `raw` (1), `stage` (2)
/// and `mart` (3), each with a single `id` column, and lineage
/// `raw.id -> stage.id -> mart.id`.
pub struct FakeRepository {
    namespaces: Vec<Namespace>,
    datasets: Vec<Dataset>,
    edges: Vec<DirectedEdge>,
    calls: Mutex<HashMap<&'static str, usize>>,
    fail: AtomicBool,
    hop_delay: Option<Duration>,
}

impl Default for FakeRepository {
    fn default() -> Self {
        let namespaces = vec![Namespace {
            id: 1,
            name: "warehouse".to_string(),
            description: None,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }];
        let datasets = ["raw", "stage", "mart"]
            .iter()
            .enumerate()
            .map(|(i, name)| Dataset {
                id: i as i64 + 1,
                namespace_id: 1,
                namespace: "warehouse".to_string(),
                name: name.to_string(),
                description: None,
                source_type: Some("table".to_string()),
            })
            .collect();
        let edges = vec![
            edge(wh("raw", "id"), wh("stage", "id")),
            edge(wh("stage", "id"), wh("mart", "id")),
        ];
        Self {
            namespaces,
            datasets,
            edges,
            calls: Mutex::new(HashMap::new()),
            fail: AtomicBool::new(false),
            hop_delay: None,
        }
    }
}

impl FakeRepository {
    /// Make every single-hop edge lookup take `delay`.
    pub fn with_hop_delay(mut self, delay: Duration) -> Self {
        self.hop_delay = Some(delay);
        self
    }

    pub fn calls(&self, op: &str) -> usize {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn enter(&self, op: &'static str) -> Result<()> {
        *self.calls.lock().unwrap().entry(op).or_default() += 1;
        if self.fail.load(Ordering::SeqCst) {
            return Err(LineageError::Database(rusqlite::Error::InvalidQuery));
        }
        Ok(())
    }

    fn field(&self, dataset: &Dataset) -> Field {
        Field {
            id: dataset.id * 10,
            dataset_id: dataset.id,
            name: "id".to_string(),
            data_type: Some("BIGINT".to_string()),
            nullable: false,
            ordinal: 0,
        }
    }
}

fn paged<T: Clone>(items: &[T], page: Page) -> Vec<T> {
    items.iter().skip(page.offset).take(page.limit).cloned().collect()
}

#[async_trait]
impl CatalogRepository for FakeRepository {
    async fn get_namespace(&self, _ctx: &mut RequestContext, id: i64) -> Result<Option<Namespace>> {
        self.enter("get_namespace")?;
        Ok(self.namespaces.iter().find(|n| n.id == id).cloned())
    }

    async fn list_namespaces(&self, _ctx: &mut RequestContext, page: Page) -> Result<Vec<Namespace>> {
        self.enter("list_namespaces")?;
        Ok(paged(&self.namespaces, page))
    }

    async fn get_dataset(&self, _ctx: &mut RequestContext, id: i64) -> Result<Option<Dataset>> {
        self.enter("get_dataset")?;
        Ok(self.datasets.iter().find(|d| d.id == id).cloned())
    }

    async fn list_datasets(
        &self,
        _ctx: &mut RequestContext,
        namespace_id: i64,
        page: Page,
    ) -> Result<Vec<Dataset>> {
        self.enter("list_datasets")?;
        let matching: Vec<_> = self
            .datasets
            .iter()
            .filter(|d| d.namespace_id == namespace_id)
            .cloned()
            .collect();
        Ok(paged(&matching, page))
    }

    async fn search_datasets(
        &self,
        _ctx: &mut RequestContext,
        text: &str,
        limit: usize,
    ) -> Result<Vec<Dataset>> {
        self.enter("search_datasets")?;
        let needle = canonicalize_search_text(text);
        Ok(self
            .datasets
            .iter()
            .filter(|d| d.name.to_ascii_uppercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_dataset_schema(
        &self,
        _ctx: &mut RequestContext,
        dataset_id: i64,
    ) -> Result<Option<DatasetSchema>> {
        self.enter("get_dataset_schema")?;
        Ok(self
            .datasets
            .iter()
            .find(|d| d.id == dataset_id)
            .map(|d| DatasetSchema {
                dataset: d.clone(),
                fields: vec![self.field(d)],
            }))
    }

    async fn get_field(&self, _ctx: &mut RequestContext, id: i64) -> Result<Option<Field>> {
        self.enter("get_field")?;
        Ok(self.datasets.iter().map(|d| self.field(d)).find(|f| f.id == id))
    }

    async fn list_fields(&self, _ctx: &mut RequestContext, dataset_id: i64) -> Result<Vec<Field>> {
        self.enter("list_fields")?;
        Ok(self
            .datasets
            .iter()
            .filter(|d| d.id == dataset_id)
            .map(|d| self.field(d))
            .collect())
    }

    async fn get_job(&self, _ctx: &mut RequestContext, _id: i64) -> Result<Option<Job>> {
        self.enter("get_job")?;
        Ok(None)
    }

    async fn list_jobs(
        &self,
        _ctx: &mut RequestContext,
        _namespace_id: i64,
        _page: Page,
    ) -> Result<Vec<Job>> {
        self.enter("list_jobs")?;
        Ok(Vec::new())
    }

    async fn get_run(&self, _ctx: &mut RequestContext, _id: i64) -> Result<Option<Run>> {
        self.enter("get_run")?;
        Ok(None)
    }

    async fn list_runs(&self, _ctx: &mut RequestContext, _job_id: i64, _page: Page) -> Result<Vec<Run>> {
        self.enter("list_runs")?;
        Ok(Vec::new())
    }

    async fn get_lineage_edges(
        &self,
        ctx: &mut RequestContext,
        seed: &FieldRef,
        direction: Direction,
        max_depth: usize,
    ) -> Result<Vec<DirectedEdge>> {
        self.enter("get_lineage_edges")?;
        let delay = self.hop_delay;
        let lookups = collect_lineage_edges(seed, direction, max_depth, |node, hop| {
            let found: Vec<_> = self
                .edges
                .iter()
                .filter(|e| {
                    let near = match hop {
                        crate::graph::Hop::Upstream => &e.target,
                        crate::graph::Hop::Downstream => &e.source,
                    };
                    *near == node
                })
                .cloned()
                .collect();
            async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Ok::<_, LineageError>(found)
            }
        });
        ctx.run(lookups).await
    }

    async fn get_lineage_statistics(&self, _ctx: &mut RequestContext) -> Result<LineageStatistics> {
        self.enter("get_lineage_statistics")?;
        let mut edges_by_subtype = BTreeMap::new();
        edges_by_subtype.insert("IDENTITY".to_string(), self.edges.len() as i64);
        Ok(LineageStatistics {
            namespaces: self.namespaces.len() as i64,
            datasets: self.datasets.len() as i64,
            fields: self.datasets.len() as i64,
            jobs: 0,
            runs: 0,
            active_edges: self.edges.len() as i64,
            edges_by_subtype,
        })
    }
}

/// Memory store that counts reads and writes.
pub struct RecordingCacheStore {
    inner: MemoryCacheStore,
    gets: AtomicUsize,
    sets: AtomicUsize,
    written: Mutex<Vec<(String, u64)>>,
}

impl Default for RecordingCacheStore {
    fn default() -> Self {
        Self {
            inner: MemoryCacheStore::new(1000),
            gets: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
            written: Mutex::new(Vec::new()),
        }
    }
}

impl RecordingCacheStore {
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    /// (key, ttl) of every write, in order.
    pub fn written(&self) -> Vec<(String, u64)> {
        self.written.lock().unwrap().clone()
    }
}

#[async_trait]
impl CacheStore for RecordingCacheStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> CacheResult<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.written.lock().unwrap().push((key.to_string(), ttl_secs));
        self.inner.set(key, value, ttl_secs).await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.inner.exists(key).await
    }

    async fn remaining_ttl(&self, key: &str) -> CacheResult<Option<u64>> {
        self.inner.remaining_ttl(key).await
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Store whose every call fails, standing in for an unreachable backend.
#[derive(Default)]
pub struct FailingCacheStore {
    calls: AtomicUsize,
}

impl FailingCacheStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> CacheResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Unavailable("connection refused".to_string()))
    }
}

#[async_trait]
impl CacheStore for FailingCacheStore {
    async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.fail()
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl_secs: u64) -> CacheResult<()> {
        self.fail()
    }

    async fn delete(&self, _key: &str) -> CacheResult<()> {
        self.fail()
    }

    async fn exists(&self, _key: &str) -> CacheResult<bool> {
        self.fail()
    }

    async fn remaining_ttl(&self, _key: &str) -> CacheResult<Option<u64>> {
        self.fail()
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}
