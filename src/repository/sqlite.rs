//! SQLite-backed catalog repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;

use super::CatalogRepository;
use crate::cache::canonicalize_search_text;
use crate::context::RequestContext;
use crate::db::Db;
use crate::error::Result;
use crate::graph::{collect_lineage_edges, Hop};
use crate::model::{
    Dataset, DatasetSchema, DirectedEdge, Direction, Field, FieldRef, Job, LineageStatistics,
    Namespace, Page, Run,
};

const DATASET_COLUMNS: &str = "d.id, d.namespace_id, n.name, d.name, d.description, d.source_type";

const EDGE_COLUMNS: &str = "source_namespace, source_dataset, source_field, \
     target_namespace, target_dataset, target_field, \
     transformation_type, transformation_subtype, confidence, is_active, discovered_at";

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_optional_timestamp(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_timestamp(idx, &s)).transpose()
}

fn namespace_from_row(row: &Row<'_>) -> rusqlite::Result<Namespace> {
    let created_at: String = row.get(3)?;
    Ok(Namespace {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: parse_timestamp(3, &created_at)?,
    })
}

fn dataset_from_row(row: &Row<'_>) -> rusqlite::Result<Dataset> {
    Ok(Dataset {
        id: row.get(0)?,
        namespace_id: row.get(1)?,
        namespace: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        source_type: row.get(5)?,
    })
}

fn field_from_row(row: &Row<'_>) -> rusqlite::Result<Field> {
    Ok(Field {
        id: row.get(0)?,
        dataset_id: row.get(1)?,
        name: row.get(2)?,
        data_type: row.get(3)?,
        nullable: row.get(4)?,
        ordinal: row.get(5)?,
    })
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<Job> {
    Ok(Job {
        id: row.get(0)?,
        namespace_id: row.get(1)?,
        name: row.get(2)?,
        job_type: row.get(3)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<Run> {
    Ok(Run {
        id: row.get(0)?,
        job_id: row.get(1)?,
        state: row.get(2)?,
        started_at: parse_optional_timestamp(3, row.get(3)?)?,
        ended_at: parse_optional_timestamp(4, row.get(4)?)?,
    })
}

fn edge_from_row(row: &Row<'_>) -> rusqlite::Result<DirectedEdge> {
    let transformation_type: String = row.get(6)?;
    let transformation_subtype: String = row.get(7)?;
    let discovered_at: String = row.get(10)?;
    Ok(DirectedEdge {
        source: FieldRef::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?),
        target: FieldRef::new(row.get::<_, String>(3)?, row.get::<_, String>(4)?, row.get::<_, String>(5)?),
        transformation_type: transformation_type
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?,
        transformation_subtype: transformation_subtype
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?,
        confidence: row.get(8)?,
        active: row.get(9)?,
        discovered_at: parse_timestamp(10, &discovered_at)?,
    })
}

/// Escape LIKE wildcards so user text matches literally.
fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn to_sql_int(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn collect_rows<T>(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, map)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn single_hop_edges(conn: &Connection, node: &FieldRef, hop: Hop) -> Result<Vec<DirectedEdge>> {
    let side = match hop {
        Hop::Upstream => "target",
        Hop::Downstream => "source",
    };
    let sql = format!(
        "SELECT {EDGE_COLUMNS} FROM column_lineage \
         WHERE is_active = 1 AND {side}_namespace = ?1 AND {side}_dataset = ?2 AND {side}_field = ?3 \
         ORDER BY id"
    );
    collect_rows(
        conn,
        &sql,
        params![node.namespace, node.dataset, node.field],
        edge_from_row,
    )
}

/// Catalog repository over the SQLite store.
///
/// Lineage traversal runs in the application tier, one single-hop query per
/// frontier column, under the request deadline.
#[derive(Debug, Clone)]
pub struct SqliteRepository {
    db: Db,
}

impl SqliteRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    async fn query<F, T>(&self, ctx: &RequestContext, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        ctx.check_deadline()?;
        ctx.run(self.db.with_connection(f)).await
    }
}

#[async_trait]
impl CatalogRepository for SqliteRepository {
    async fn get_namespace(&self, ctx: &mut RequestContext, id: i64) -> Result<Option<Namespace>> {
        self.query(ctx, move |conn| {
            Ok(conn
                .query_row(
                    "SELECT id, name, description, created_at FROM namespaces WHERE id = ?1",
                    [id],
                    namespace_from_row,
                )
                .optional()?)
        })
        .await
    }

    async fn list_namespaces(&self, ctx: &mut RequestContext, page: Page) -> Result<Vec<Namespace>> {
        self.query(ctx, move |conn| {
            collect_rows(
                conn,
                "SELECT id, name, description, created_at FROM namespaces \
                 ORDER BY name LIMIT ?1 OFFSET ?2",
                params![to_sql_int(page.limit), to_sql_int(page.offset)],
                namespace_from_row,
            )
        })
        .await
    }

    async fn get_dataset(&self, ctx: &mut RequestContext, id: i64) -> Result<Option<Dataset>> {
        self.query(ctx, move |conn| {
            let sql = format!(
                "SELECT {DATASET_COLUMNS} FROM datasets d \
                 JOIN namespaces n ON n.id = d.namespace_id WHERE d.id = ?1"
            );
            Ok(conn.query_row(&sql, [id], dataset_from_row).optional()?)
        })
        .await
    }

    async fn list_datasets(
        &self,
        ctx: &mut RequestContext,
        namespace_id: i64,
        page: Page,
    ) -> Result<Vec<Dataset>> {
        self.query(ctx, move |conn| {
            let sql = format!(
                "SELECT {DATASET_COLUMNS} FROM datasets d \
                 JOIN namespaces n ON n.id = d.namespace_id \
                 WHERE d.namespace_id = ?1 ORDER BY d.name LIMIT ?2 OFFSET ?3"
            );
            collect_rows(
                conn,
                &sql,
                params![namespace_id, to_sql_int(page.limit), to_sql_int(page.offset)],
                dataset_from_row,
            )
        })
        .await
    }

    async fn search_datasets(
        &self,
        ctx: &mut RequestContext,
        text: &str,
        limit: usize,
    ) -> Result<Vec<Dataset>> {
        // SQLite's UPPER folds ASCII only; fold the needle the same way
        let pattern = format!("%{}%", escape_like(&canonicalize_search_text(text)));
        self.query(ctx, move |conn| {
            let sql = format!(
                "SELECT {DATASET_COLUMNS} FROM datasets d \
                 JOIN namespaces n ON n.id = d.namespace_id \
                 WHERE UPPER(d.name) LIKE ?1 ESCAPE '\\' \
                 ORDER BY d.name, d.id LIMIT ?2"
            );
            collect_rows(conn, &sql, params![pattern, to_sql_int(limit)], dataset_from_row)
        })
        .await
    }

    async fn get_dataset_schema(
        &self,
        ctx: &mut RequestContext,
        dataset_id: i64,
    ) -> Result<Option<DatasetSchema>> {
        self.query(ctx, move |conn| {
            let sql = format!(
                "SELECT {DATASET_COLUMNS} FROM datasets d \
                 JOIN namespaces n ON n.id = d.namespace_id WHERE d.id = ?1"
            );
            let Some(dataset) = conn.query_row(&sql, [dataset_id], dataset_from_row).optional()? else {
                return Ok(None);
            };
            let fields = collect_rows(
                conn,
                "SELECT id, dataset_id, name, data_type, nullable, ordinal FROM fields \
                 WHERE dataset_id = ?1 ORDER BY ordinal, id",
                [dataset_id],
                field_from_row,
            )?;
            Ok(Some(DatasetSchema { dataset, fields }))
        })
        .await
    }

    async fn get_field(&self, ctx: &mut RequestContext, id: i64) -> Result<Option<Field>> {
        self.query(ctx, move |conn| {
            Ok(conn
                .query_row(
                    "SELECT id, dataset_id, name, data_type, nullable, ordinal FROM fields WHERE id = ?1",
                    [id],
                    field_from_row,
                )
                .optional()?)
        })
        .await
    }

    async fn list_fields(&self, ctx: &mut RequestContext, dataset_id: i64) -> Result<Vec<Field>> {
        self.query(ctx, move |conn| {
            collect_rows(
                conn,
                "SELECT id, dataset_id, name, data_type, nullable, ordinal FROM fields \
                 WHERE dataset_id = ?1 ORDER BY ordinal, id",
                [dataset_id],
                field_from_row,
            )
        })
        .await
    }

    async fn get_job(&self, ctx: &mut RequestContext, id: i64) -> Result<Option<Job>> {
        self.query(ctx, move |conn| {
            Ok(conn
                .query_row(
                    "SELECT id, namespace_id, name, job_type FROM jobs WHERE id = ?1",
                    [id],
                    job_from_row,
                )
                .optional()?)
        })
        .await
    }

    async fn list_jobs(
        &self,
        ctx: &mut RequestContext,
        namespace_id: i64,
        page: Page,
    ) -> Result<Vec<Job>> {
        self.query(ctx, move |conn| {
            collect_rows(
                conn,
                "SELECT id, namespace_id, name, job_type FROM jobs \
                 WHERE namespace_id = ?1 ORDER BY name LIMIT ?2 OFFSET ?3",
                params![namespace_id, to_sql_int(page.limit), to_sql_int(page.offset)],
                job_from_row,
            )
        })
        .await
    }

    async fn get_run(&self, ctx: &mut RequestContext, id: i64) -> Result<Option<Run>> {
        self.query(ctx, move |conn| {
            Ok(conn
                .query_row(
                    "SELECT id, job_id, state, started_at, ended_at FROM runs WHERE id = ?1",
                    [id],
                    run_from_row,
                )
                .optional()?)
        })
        .await
    }

    async fn list_runs(&self, ctx: &mut RequestContext, job_id: i64, page: Page) -> Result<Vec<Run>> {
        self.query(ctx, move |conn| {
            collect_rows(
                conn,
                "SELECT id, job_id, state, started_at, ended_at FROM runs \
                 WHERE job_id = ?1 ORDER BY id DESC LIMIT ?2 OFFSET ?3",
                params![job_id, to_sql_int(page.limit), to_sql_int(page.offset)],
                run_from_row,
            )
        })
        .await
    }

    async fn get_lineage_edges(
        &self,
        ctx: &mut RequestContext,
        seed: &FieldRef,
        direction: Direction,
        max_depth: usize,
    ) -> Result<Vec<DirectedEdge>> {
        let ctx: &RequestContext = ctx;
        collect_lineage_edges(seed, direction, max_depth, |node, hop| async move {
            self.query(ctx, move |conn| single_hop_edges(conn, &node, hop)).await
        })
        .await
    }

    async fn get_lineage_statistics(&self, ctx: &mut RequestContext) -> Result<LineageStatistics> {
        self.query(ctx, |conn| {
            let mut stats = conn.query_row(
                "SELECT \
                    (SELECT COUNT(*) FROM namespaces), \
                    (SELECT COUNT(*) FROM datasets), \
                    (SELECT COUNT(*) FROM fields), \
                    (SELECT COUNT(*) FROM jobs), \
                    (SELECT COUNT(*) FROM runs), \
                    (SELECT COUNT(*) FROM column_lineage WHERE is_active = 1)",
                [],
                |row| {
                    Ok(LineageStatistics {
                        namespaces: row.get(0)?,
                        datasets: row.get(1)?,
                        fields: row.get(2)?,
                        jobs: row.get(3)?,
                        runs: row.get(4)?,
                        active_edges: row.get(5)?,
                        edges_by_subtype: BTreeMap::new(),
                    })
                },
            )?;

            let mut stmt = conn.prepare(
                "SELECT transformation_subtype, COUNT(*) FROM column_lineage \
                 WHERE is_active = 1 GROUP BY transformation_subtype",
            )?;
            let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
            for row in rows {
                let (subtype, count) = row?;
                stats.edges_by_subtype.insert(subtype, count);
            }
            Ok(stats)
        })
        .await
    }
}

/// Row-level seeding helpers for tests across the crate.
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::db::migrate;
    use std::path::Path;
    use tempfile::TempDir;

    pub async fn migrated_db() -> (Db, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("catalog.db"));
        let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
        db.with_connection(move |conn| migrate::run_migrations(conn, &migrations_dir))
            .await
            .unwrap();
        (db, temp_dir)
    }

    /// Catalog used by repository, decorator and HTTP tests:
    ///
    /// namespace 1 "warehouse": datasets 1 "raw_customers" (id, email),
    /// 2 "customers" (customer_id, email), 3 "orders" (customer_id, total),
    /// job 1 "build_customers" with two runs.
    ///
    /// Lineage: raw_customers.id -> customers.customer_id -> orders.customer_id,
    /// raw_customers.email -> customers.email, plus an inactive
    /// orders.total -> customers.email edge.
    pub async fn seeded_db() -> (Db, TempDir) {
        let (db, temp_dir) = migrated_db().await;
        db.with_connection(|conn| {
            conn.execute_batch(
                "INSERT INTO namespaces (id, name, description, created_at) VALUES
                    (1, 'warehouse', 'Analytics warehouse', '2026-01-01T00:00:00Z'),
                    (2, 'lake', NULL, '2026-01-02T00:00:00Z');
                 INSERT INTO datasets (id, namespace_id, name, description, source_type) VALUES
                    (1, 1, 'raw_customers', NULL, 'table'),
                    (2, 1, 'customers', 'Cleaned customers', 'table'),
                    (3, 1, 'orders', NULL, 'view');
                 INSERT INTO fields (dataset_id, name, data_type, nullable, ordinal) VALUES
                    (1, 'id', 'BIGINT', 0, 0),
                    (1, 'email', 'TEXT', 1, 1),
                    (2, 'customer_id', 'BIGINT', 0, 0),
                    (2, 'email', 'TEXT', 1, 1),
                    (3, 'customer_id', 'BIGINT', 0, 0),
                    (3, 'total', 'DECIMAL', 1, 1);
                 INSERT INTO jobs (id, namespace_id, name, job_type) VALUES
                    (1, 1, 'build_customers', 'BATCH');
                 INSERT INTO runs (job_id, state, started_at, ended_at) VALUES
                    (1, 'COMPLETED', '2026-01-03T00:00:00Z', '2026-01-03T00:05:00Z'),
                    (1, 'RUNNING', '2026-01-04T00:00:00Z', NULL);
                 INSERT INTO column_lineage (
                    source_namespace, source_dataset, source_field,
                    target_namespace, target_dataset, target_field,
                    transformation_type, transformation_subtype, confidence, is_active, discovered_at
                 ) VALUES
                    ('warehouse', 'raw_customers', 'id', 'warehouse', 'customers', 'customer_id',
                     'DIRECT', 'IDENTITY', 1.0, 1, '2026-01-03T00:05:00Z'),
                    ('warehouse', 'customers', 'customer_id', 'warehouse', 'orders', 'customer_id',
                     'DIRECT', 'JOIN', 0.9, 1, '2026-01-03T00:05:00Z'),
                    ('warehouse', 'raw_customers', 'email', 'warehouse', 'customers', 'email',
                     'DIRECT', 'TRANSFORMATION', 0.8, 1, '2026-01-03T00:05:00Z'),
                    ('warehouse', 'orders', 'total', 'warehouse', 'customers', 'email',
                     'INDIRECT', 'FILTER', 0.5, 0, '2026-01-03T00:05:00Z');",
            )?;
            Ok(())
        })
        .await
        .unwrap();
        (db, temp_dir)
    }

    pub async fn add_edge(db: &Db, source: FieldRef, target: FieldRef) {
        db.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO column_lineage (
                    source_namespace, source_dataset, source_field,
                    target_namespace, target_dataset, target_field,
                    transformation_type, transformation_subtype
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'DIRECT', 'IDENTITY')",
                params![
                    source.namespace,
                    source.dataset,
                    source.field,
                    target.namespace,
                    target.dataset,
                    target.field
                ],
            )?;
            Ok(())
        })
        .await
        .unwrap();
    }
}
