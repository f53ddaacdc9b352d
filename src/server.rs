//! HTTP surface: state, routes, and request handlers.

use std::{path::PathBuf, sync::Arc};

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{debug, error, info, warn};

use crate::config::Policy;
use crate::disk::{host_volumes, DiskSpaceProbe};
use crate::error::ApiError;
use crate::guard::{Access, PathGuard};
use crate::listing::{
    list_directory, list_shared_roots, shared_root_usage, volume_entries, Page, Pagination,
};
use crate::pages;
use crate::registry::ShareRegistry;
use crate::streamer::serve_file;

// --- State ---
pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub registry: ShareRegistry,
    pub probe: Box<dyn DiskSpaceProbe>,
    pub policy: Policy,
    pub static_dir: PathBuf,
}

// --- Request Payloads ---
#[derive(Deserialize, Debug, Default)]
pub struct ListQuery {
    path: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
}

impl ListQuery {
    fn path(&self) -> &str {
        self.path.as_deref().unwrap_or("")
    }

    fn pagination(&self) -> Pagination {
        Pagination::from_query(self.limit.as_deref(), self.offset.as_deref())
    }
}

#[derive(Deserialize, Debug)]
pub struct FileQuery {
    path: Option<String>,
    thumbnail: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct SharePayload {
    path: String,
}

/// Builds the application router.
pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([http::Method::GET, http::Method::POST])
        .allow_origin(Any);

    Router::new()
        .route("/", get(pages::overview))
        .route("/myfiles", get(pages::my_files))
        .route("/shared", get(pages::shared))
        .route("/mobile", get(pages::mobile))
        .route("/disks", get(disks_handler))
        .route("/shared-disks", get(shared_disks_handler))
        .route("/api/shared", get(shared_handler))
        .route("/directory", get(directory_handler))
        .route("/file", get(file_handler))
        .route("/share", post(share_handler))
        .route("/unshare", post(unshare_handler))
        .nest_service("/static", ServeDir::new(&state.static_dir))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Runs `f` against the disk probe on the blocking pool.
async fn with_probe<T, F>(state: &SharedState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&dyn DiskSpaceProbe) -> T + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(state.probe.as_ref()))
        .await
        .map_err(|e| {
            error!("Disk probe task failed: {}", e);
            ApiError::Internal(e.to_string())
        })
}

/// Unwraps query parameters, turning axum's plain-text rejection into a JSON error.
fn parse_query<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    let Query(query) = query.map_err(|e| {
        warn!("Rejected query string: {}", e);
        ApiError::InvalidRequest("Invalid query parameters".to_string())
    })?;
    Ok(query)
}

/// Host volumes with usage totals.
async fn disks_handler(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let disks = with_probe(&state, host_volumes).await?;
    Ok(Json(json!({ "disks": disks })).into_response())
}

/// Usage totals for each shared root.
async fn shared_disks_handler(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let roots = state.registry.list();
    let disks = with_probe(&state, move |probe| shared_root_usage(&roots, probe)).await?;
    Ok(Json(json!({ "disks": disks })).into_response())
}

/// Lists the shared roots themselves, or a directory inside one of them.
async fn shared_handler(
    State(state): State<SharedState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Page>, ApiError> {
    let query = parse_query(query)?;
    let roots = state.registry.list();
    let entries = if query.path().is_empty() {
        list_shared_roots(&roots).await
    } else {
        let dir = PathGuard::check(query.path(), &roots, Access::Shared)?;
        list_directory(&dir, &roots).await?
    };
    Ok(Json(query.pagination().apply(entries)))
}

/// Host browser. Without a path this lists volumes and skips the sandbox;
/// with a path it is sandboxed in `Browse` mode (open while nothing is
/// shared) unless the operator enabled open directory browsing.
async fn directory_handler(
    State(state): State<SharedState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Page>, ApiError> {
    let query = parse_query(query)?;
    let pagination = query.pagination();
    if query.path().is_empty() {
        let entries = with_probe(&state, |probe| volume_entries(host_volumes(probe))).await?;
        return Ok(Json(pagination.apply(entries)));
    }

    let roots = state.registry.list();
    let dir = if state.policy.open_directory_browsing {
        PathGuard::absolute(query.path())?
    } else {
        PathGuard::check(query.path(), &roots, Access::Browse)?
    };
    debug!("Listing {} ({} shared roots)", dir.display(), roots.len());
    let entries = list_directory(&dir, &roots).await?;
    Ok(Json(pagination.apply(entries)))
}

/// Streams a file, a byte range of it, or a thumbnail.
async fn file_handler(
    State(state): State<SharedState>,
    query: Result<Query<FileQuery>, QueryRejection>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let query = parse_query(query)?;
    let path = query.path.as_deref().unwrap_or("");
    if path.is_empty() {
        return Err(ApiError::InvalidRequest("Path is required".to_string()));
    }

    let roots = state.registry.list();
    let access = Access::Download {
        open_when_empty: state.policy.allow_downloads_without_shares,
    };
    let path = PathGuard::check(path, &roots, access)?;

    let range = match headers.get(header::RANGE) {
        Some(value) => Some(value.to_str().map_err(|_| {
            warn!("Non-ASCII Range header for {}", path.display());
            ApiError::InvalidRequest("Invalid Range header".to_string())
        })?),
        None => None,
    };
    let thumbnail = query.thumbnail.as_deref() == Some("true");

    serve_file(&path, range, thumbnail).await
}

async fn share_handler(
    State(state): State<SharedState>,
    payload: Result<Json<SharePayload>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(payload) = payload.map_err(|e| {
        warn!("Rejected share request: {}", e);
        ApiError::InvalidRequest("Invalid request".to_string())
    })?;
    info!("Share requested for path: {}", payload.path);

    state.registry.add(&payload.path).await?;
    Ok(Json(json!({ "message": "Folder shared successfully" })))
}

async fn unshare_handler(
    State(state): State<SharedState>,
    payload: Result<Json<SharePayload>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(payload) = payload.map_err(|e| {
        warn!("Rejected unshare request: {}", e);
        ApiError::InvalidRequest("Invalid request".to_string())
    })?;
    info!("Unshare requested for path: {}", payload.path);

    state.registry.remove(&payload.path).await?;
    Ok(Json(json!({ "message": "Folder unshared successfully" })))
}
