//! Thin axum boundary over the (cached) catalog repository.
//!
//! Handlers parse and validate query parameters, build one
//! [`RequestContext`] per request and translate its cache metadata into the
//! response envelope and `X-Cache` headers.

mod handlers;
mod response;

pub use response::{ApiError, X_CACHE, X_CACHE_TTL};

use axum::{routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::context::RequestContext;
use crate::error::{LineageError, Result};
use crate::repository::CatalogRepository;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    repo: Arc<dyn CatalogRepository>,
    config: Arc<Config>,
}

impl AppState {
    pub fn new(repo: Arc<dyn CatalogRepository>, config: Arc<Config>) -> Self {
        Self { repo, config }
    }

    fn request_context(&self, refresh: bool) -> RequestContext {
        RequestContext::new()
            .with_bypass(refresh)
            .with_timeout(self.config.request_timeout())
    }
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/namespaces", get(handlers::list_namespaces))
        .route("/api/v1/namespaces/:id", get(handlers::get_namespace))
        .route("/api/v1/namespaces/:id/datasets", get(handlers::list_namespace_datasets))
        .route("/api/v1/namespaces/:id/jobs", get(handlers::list_namespace_jobs))
        .route("/api/v1/datasets/search", get(handlers::search_datasets))
        .route("/api/v1/datasets/:id", get(handlers::get_dataset))
        .route("/api/v1/datasets/:id/schema", get(handlers::get_dataset_schema))
        .route("/api/v1/datasets/:id/fields", get(handlers::list_dataset_fields))
        .route("/api/v1/jobs/:id", get(handlers::get_job))
        .route("/api/v1/jobs/:id/runs", get(handlers::list_job_runs))
        .route("/api/v1/runs/:id", get(handlers::get_run))
        .route("/api/v1/lineage/column", get(handlers::column_lineage))
        .route("/api/v1/lineage/stats", get(handlers::lineage_statistics))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// HTTP server wrapper
pub struct HttpServer {
    state: AppState,
}

impl HttpServer {
    pub fn new(repo: Arc<dyn CatalogRepository>, config: Arc<Config>) -> Self {
        Self {
            state: AppState::new(repo, config),
        }
    }

    /// Serve until Ctrl-C.
    pub async fn run(&self) -> Result<()> {
        let http = &self.state.config.http_server;
        let addr = format!("{}:{}", http.host, http.port);

        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            LineageError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to bind to {}: {}", addr, e),
            ))
        })?;
        log::info!("Serving lineage API on http://{}", addr);

        axum::serve(listener, router(self.state.clone()))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| {
                LineageError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("HTTP server error: {}", e),
                ))
            })?;

        log::info!("HTTP server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("Failed to listen for shutdown signal: {}", e);
    }
}
