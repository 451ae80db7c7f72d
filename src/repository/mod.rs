//! Read contract over the catalog and its column lineage.
//!
//! Every operation takes the request's [`RequestContext`] so implementations
//! can honour its deadline and the cache-aside layer can record its outcome.
//! Not-found is a value (`None` or an empty list), never an error.

mod sqlite;

pub use sqlite::SqliteRepository;

#[cfg(test)]
pub(crate) use sqlite::fixtures;

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::error::Result;
use crate::graph::{build_graph, Graph};
use crate::model::{
    Dataset, DatasetSchema, DirectedEdge, Direction, Field, FieldRef, Job, LineageStatistics,
    Namespace, Page, Run,
};

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn get_namespace(&self, ctx: &mut RequestContext, id: i64) -> Result<Option<Namespace>>;

    async fn list_namespaces(&self, ctx: &mut RequestContext, page: Page) -> Result<Vec<Namespace>>;

    async fn get_dataset(&self, ctx: &mut RequestContext, id: i64) -> Result<Option<Dataset>>;

    async fn list_datasets(
        &self,
        ctx: &mut RequestContext,
        namespace_id: i64,
        page: Page,
    ) -> Result<Vec<Dataset>>;

    /// Case-insensitive substring match on dataset names.
    async fn search_datasets(
        &self,
        ctx: &mut RequestContext,
        text: &str,
        limit: usize,
    ) -> Result<Vec<Dataset>>;

    async fn get_dataset_schema(
        &self,
        ctx: &mut RequestContext,
        dataset_id: i64,
    ) -> Result<Option<DatasetSchema>>;

    async fn get_field(&self, ctx: &mut RequestContext, id: i64) -> Result<Option<Field>>;

    async fn list_fields(&self, ctx: &mut RequestContext, dataset_id: i64) -> Result<Vec<Field>>;

    async fn get_job(&self, ctx: &mut RequestContext, id: i64) -> Result<Option<Job>>;

    async fn list_jobs(
        &self,
        ctx: &mut RequestContext,
        namespace_id: i64,
        page: Page,
    ) -> Result<Vec<Job>>;

    async fn get_run(&self, ctx: &mut RequestContext, id: i64) -> Result<Option<Run>>;

    async fn list_runs(&self, ctx: &mut RequestContext, job_id: i64, page: Page) -> Result<Vec<Run>>;

    /// Active edges reachable from `seed` within `max_depth` hops, flat and
    /// deduplicated.
    async fn get_lineage_edges(
        &self,
        ctx: &mut RequestContext,
        seed: &FieldRef,
        direction: Direction,
        max_depth: usize,
    ) -> Result<Vec<DirectedEdge>>;

    async fn get_lineage_statistics(&self, ctx: &mut RequestContext) -> Result<LineageStatistics>;

    /// Lineage graph of one column. `None` when the dataset does not exist; a
    /// seed-only graph when the column has no lineage.
    async fn get_column_lineage_graph(
        &self,
        ctx: &mut RequestContext,
        dataset_id: i64,
        field: &str,
        direction: Direction,
        max_depth: usize,
    ) -> Result<Option<Graph>> {
        let Some(dataset) = self.get_dataset(ctx, dataset_id).await? else {
            return Ok(None);
        };
        let seed = FieldRef::new(dataset.namespace, dataset.name, field);
        let edges = self.get_lineage_edges(ctx, &seed, direction, max_depth).await?;
        Ok(Some(build_graph(&seed, &edges, direction, max_depth)))
    }
}
