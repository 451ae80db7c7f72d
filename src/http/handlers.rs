use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use super::response::{respond, ApiError};
use super::AppState;
use crate::model::{Direction, Page};

type HandlerResult = std::result::Result<Response, ApiError>;

/// Paging parameters. Cached listings read `refresh` separately through
/// [`RefreshQuery`]; uncached listings ignore it.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshQuery {
    #[serde(default)]
    refresh: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    q: Option<String>,
    limit: Option<usize>,
    #[serde(default)]
    refresh: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct LineageQuery {
    dataset_id: Option<i64>,
    field: Option<String>,
    direction: Option<String>,
    max_depth: Option<usize>,
    #[serde(default)]
    refresh: bool,
}

impl AppState {
    fn page(&self, query: &PageQuery) -> Result<Page, ApiError> {
        let lineage = &self.config.lineage;
        let limit = query.limit.unwrap_or(lineage.default_page_size);
        if limit == 0 || limit > lineage.max_page_size {
            return Err(ApiError::invalid(format!(
                "limit must be between 1 and {}",
                lineage.max_page_size
            )));
        }
        Ok(Page::new(limit, query.offset.unwrap_or(0)))
    }

    fn max_depth(&self, requested: Option<usize>) -> Result<usize, ApiError> {
        let lineage = &self.config.lineage;
        let depth = requested.unwrap_or(lineage.default_max_depth);
        if depth == 0 || depth > lineage.max_depth_limit {
            return Err(ApiError::invalid(format!(
                "max_depth must be between 1 and {}",
                lineage.max_depth_limit
            )));
        }
        Ok(depth)
    }

    fn search_limit(&self, requested: Option<usize>) -> Result<usize, ApiError> {
        let lineage = &self.config.lineage;
        let limit = requested.unwrap_or(lineage.default_page_size.min(lineage.max_search_limit));
        if limit == 0 || limit > lineage.max_search_limit {
            return Err(ApiError::invalid(format!(
                "limit must be between 1 and {}",
                lineage.max_search_limit
            )));
        }
        Ok(limit)
    }
}

fn required_text(value: Option<String>, name: &str) -> Result<String, ApiError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ApiError::invalid(format!("{} is required", name))),
    }
}

pub async fn health() -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "service": "lineage-cache",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
        .into_response()
}

pub async fn list_namespaces(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
    Query(refresh): Query<RefreshQuery>,
) -> HandlerResult {
    let page = state.page(&query)?;
    let mut ctx = state.request_context(refresh.refresh);
    let namespaces = state.repo.list_namespaces(&mut ctx, page).await?;
    Ok(respond(ctx, namespaces))
}

pub async fn get_namespace(State(state): State<AppState>, Path(id): Path<i64>) -> HandlerResult {
    let mut ctx = state.request_context(false);
    let namespace = state
        .repo
        .get_namespace(&mut ctx, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("namespace {}", id)))?;
    Ok(respond(ctx, namespace))
}

pub async fn list_namespace_datasets(
    State(state): State<AppState>,
    Path(namespace_id): Path<i64>,
    Query(query): Query<PageQuery>,
    Query(refresh): Query<RefreshQuery>,
) -> HandlerResult {
    let page = state.page(&query)?;
    let mut ctx = state.request_context(refresh.refresh);
    let datasets = state.repo.list_datasets(&mut ctx, namespace_id, page).await?;
    Ok(respond(ctx, datasets))
}

pub async fn list_namespace_jobs(
    State(state): State<AppState>,
    Path(namespace_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> HandlerResult {
    let page = state.page(&query)?;
    let mut ctx = state.request_context(false);
    let jobs = state.repo.list_jobs(&mut ctx, namespace_id, page).await?;
    Ok(respond(ctx, jobs))
}

pub async fn search_datasets(State(state): State<AppState>, Query(query): Query<SearchQuery>) -> HandlerResult {
    let text = required_text(query.q, "q")?;
    let limit = state.search_limit(query.limit)?;
    let mut ctx = state.request_context(query.refresh);
    let datasets = state.repo.search_datasets(&mut ctx, &text, limit).await?;
    Ok(respond(ctx, datasets))
}

pub async fn get_dataset(State(state): State<AppState>, Path(id): Path<i64>) -> HandlerResult {
    let mut ctx = state.request_context(false);
    let dataset = state
        .repo
        .get_dataset(&mut ctx, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("dataset {}", id)))?;
    Ok(respond(ctx, dataset))
}

pub async fn get_dataset_schema(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<RefreshQuery>,
) -> HandlerResult {
    let mut ctx = state.request_context(query.refresh);
    let schema = state
        .repo
        .get_dataset_schema(&mut ctx, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("dataset {}", id)))?;
    Ok(respond(ctx, schema))
}

pub async fn list_dataset_fields(State(state): State<AppState>, Path(id): Path<i64>) -> HandlerResult {
    let mut ctx = state.request_context(false);
    let fields = state.repo.list_fields(&mut ctx, id).await?;
    Ok(respond(ctx, fields))
}

pub async fn get_job(State(state): State<AppState>, Path(id): Path<i64>) -> HandlerResult {
    let mut ctx = state.request_context(false);
    let job = state
        .repo
        .get_job(&mut ctx, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("job {}", id)))?;
    Ok(respond(ctx, job))
}

pub async fn list_job_runs(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> HandlerResult {
    let page = state.page(&query)?;
    let mut ctx = state.request_context(false);
    let runs = state.repo.list_runs(&mut ctx, job_id, page).await?;
    Ok(respond(ctx, runs))
}

pub async fn get_run(State(state): State<AppState>, Path(id): Path<i64>) -> HandlerResult {
    let mut ctx = state.request_context(false);
    let run = state
        .repo
        .get_run(&mut ctx, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("run {}", id)))?;
    Ok(respond(ctx, run))
}

pub async fn column_lineage(State(state): State<AppState>, Query(query): Query<LineageQuery>) -> HandlerResult {
    let dataset_id = query
        .dataset_id
        .ok_or_else(|| ApiError::invalid("dataset_id is required"))?;
    let field = required_text(query.field, "field")?;
    let direction = match query.direction.as_deref() {
        Some(raw) => raw.parse::<Direction>()?,
        None => Direction::Both,
    };
    let max_depth = state.max_depth(query.max_depth)?;

    let mut ctx = state.request_context(query.refresh);
    let graph = state
        .repo
        .get_column_lineage_graph(&mut ctx, dataset_id, &field, direction, max_depth)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("dataset {}", dataset_id)))?;
    Ok(respond(ctx, graph))
}

pub async fn lineage_statistics(State(state): State<AppState>, Query(query): Query<RefreshQuery>) -> HandlerResult {
    let mut ctx = state.request_context(query.refresh);
    let stats = state.repo.get_lineage_statistics(&mut ctx).await?;
    Ok(respond(ctx, stats))
}
