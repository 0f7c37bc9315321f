//! Read-only query API over the catalog store.
//!
//! Deliberately the thinnest layer in the service: handlers validate and
//! clamp request parameters, delegate to [`CatalogStore`], and shape the
//! JSON response. No scoring, parsing, or ingestion logic lives here.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health` | Service status and record count |
//! | `GET` | `/api/workflows` | Paginated, filtered listing |
//! | `GET` | `/api/workflows/search` | Ranked full-text search |
//! | `GET` | `/api/workflows/popular` | Top workflows by popularity |
//! | `GET` | `/api/workflows/compatible` | Local-AI-ready workflows |
//! | `GET` | `/api/workflows/{id}` | Single record |
//! | `GET` | `/api/categories` | Categories with counts |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "workflow not found: ab12" } }
//! ```
//!
//! Error codes: `validation_error` (400), `not_found` (404),
//! `internal` (500).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::StoreError;
use crate::models::{Category, Difficulty};
use crate::store::{CatalogStore, Page, QueryFilters};

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;
const DEFAULT_POPULAR_LIMIT: u32 = 10;
const DEFAULT_COMPATIBLE_LIMIT: u32 = 20;

/// Start the query API server. Runs until the process is terminated.
pub async fn run_server(config: &Config, store: CatalogStore) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(store).layer(cors);

    println!("catalog API listening on http://{}", bind_addr);
    tracing::info!(bind = %bind_addr, "query API listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// The route table, separated from [`run_server`] so tests can drive the
/// handlers without binding a socket.
pub fn router(store: CatalogStore) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/api/workflows", get(handle_list))
        .route("/api/workflows/search", get(handle_search))
        .route("/api/workflows/popular", get(handle_popular))
        .route("/api/workflows/compatible", get(handle_compatible))
        .route("/api/workflows/{id}", get(handle_get))
        .route("/api/categories", get(handle_categories))
        .with_state(store)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn validation_error(message: impl Into<String>) -> ApiError {
    ApiError {
        status: StatusCode::BAD_REQUEST,
        code: "validation_error".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> ApiError {
    ApiError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(err: StoreError) -> ApiError {
    tracing::error!(error = %err, "store error serving request");
    ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: err.to_string(),
    }
}

// ============ Request validation ============

#[derive(Debug, Deserialize)]
struct ListParams {
    page: Option<u32>,
    page_size: Option<u32>,
    category: Option<String>,
    difficulty: Option<String>,
    #[serde(default)]
    local_ai_only: bool,
    /// Comma-separated tag list.
    tags: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
    page: Option<u32>,
    page_size: Option<u32>,
    category: Option<String>,
    difficulty: Option<String>,
    #[serde(default)]
    local_ai_only: bool,
}

#[derive(Debug, Deserialize)]
struct LimitParams {
    limit: Option<u32>,
}

/// Clamp pagination to sane bounds: page at least 1, page size in
/// [1, MAX_PAGE_SIZE].
fn clamp_page(page: Option<u32>, page_size: Option<u32>) -> (u32, u32) {
    let page = page.unwrap_or(1).max(1);
    let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    (page, page_size)
}

fn parse_filters(
    category: Option<&str>,
    difficulty: Option<&str>,
    local_ai_only: bool,
    tags: Option<&str>,
) -> Result<QueryFilters, ApiError> {
    let category = category
        .map(|c| {
            Category::parse(c)
                .ok_or_else(|| validation_error(format!("unknown category: '{}'", c)))
        })
        .transpose()?;

    let difficulty = difficulty
        .map(|d| {
            Difficulty::parse(d)
                .ok_or_else(|| validation_error(format!("unknown difficulty: '{}'", d)))
        })
        .transpose()?;

    let tags = tags
        .map(|t| {
            t.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(QueryFilters {
        category,
        difficulty,
        local_ai_only,
        tags,
    })
}

// ============ Handlers ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    workflow_count: i64,
}

async fn handle_health(
    State(store): State<CatalogStore>,
) -> Result<Json<HealthResponse>, ApiError> {
    let workflow_count = store.count().await.map_err(internal)?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        workflow_count,
    }))
}

async fn handle_list(
    State(store): State<CatalogStore>,
    Query(params): Query<ListParams>,
) -> Result<Json<Page>, ApiError> {
    let (page, page_size) = clamp_page(params.page, params.page_size);
    let filters = parse_filters(
        params.category.as_deref(),
        params.difficulty.as_deref(),
        params.local_ai_only,
        params.tags.as_deref(),
    )?;

    let result = store
        .query(&filters, page, page_size)
        .await
        .map_err(internal)?;
    Ok(Json(result))
}

async fn handle_search(
    State(store): State<CatalogStore>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Page>, ApiError> {
    let query = params.q.as_deref().unwrap_or("").trim().to_string();
    if query.is_empty() {
        return Err(validation_error("q must not be empty"));
    }

    let (page, page_size) = clamp_page(params.page, params.page_size);
    let filters = parse_filters(
        params.category.as_deref(),
        params.difficulty.as_deref(),
        params.local_ai_only,
        None,
    )?;

    let result = store
        .search(&query, &filters, page, page_size)
        .await
        .map_err(internal)?;
    Ok(Json(result))
}

async fn handle_popular(
    State(store): State<CatalogStore>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Page>, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_POPULAR_LIMIT)
        .clamp(1, MAX_PAGE_SIZE);
    let result = store
        .query(&QueryFilters::default(), 1, limit)
        .await
        .map_err(internal)?;
    Ok(Json(result))
}

async fn handle_compatible(
    State(store): State<CatalogStore>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Page>, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_COMPATIBLE_LIMIT)
        .clamp(1, MAX_PAGE_SIZE);
    let filters = QueryFilters {
        local_ai_only: true,
        ..Default::default()
    };
    let result = store.query(&filters, 1, limit).await.map_err(internal)?;
    Ok(Json(result))
}

async fn handle_get(
    State(store): State<CatalogStore>,
    Path(id): Path<String>,
) -> Result<Json<crate::models::WorkflowRecord>, ApiError> {
    match store.get_by_id(&id).await {
        Ok(record) => Ok(Json(record)),
        Err(StoreError::NotFound(id)) => Err(not_found(format!("workflow not found: {}", id))),
        Err(e) => Err(internal(e)),
    }
}

#[derive(Serialize)]
struct CategoriesResponse {
    categories: Vec<crate::store::CategoryCount>,
}

async fn handle_categories(
    State(store): State<CatalogStore>,
) -> Result<Json<CategoriesResponse>, ApiError> {
    let categories = store.categories().await.map_err(internal)?;
    Ok(Json(CategoriesResponse { categories }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_clamping() {
        assert_eq!(clamp_page(None, None), (1, DEFAULT_PAGE_SIZE));
        assert_eq!(clamp_page(Some(0), Some(0)), (1, 1));
        assert_eq!(clamp_page(Some(3), Some(500)), (3, MAX_PAGE_SIZE));
    }

    #[test]
    fn filter_validation() {
        assert!(parse_filters(Some("Data & Analytics"), None, false, None).is_ok());
        assert!(parse_filters(Some("data-analytics"), None, false, None).is_ok());
        assert!(parse_filters(Some("nope"), None, false, None).is_err());
        assert!(parse_filters(None, Some("beginner"), false, None).is_ok());
        assert!(parse_filters(None, Some("expert"), false, None).is_err());

        let filters = parse_filters(None, None, true, Some("ai, chat ,")).unwrap();
        assert!(filters.local_ai_only);
        assert_eq!(filters.tags, vec!["ai".to_string(), "chat".to_string()]);
    }
}
