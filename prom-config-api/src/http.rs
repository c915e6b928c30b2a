/**
 * REST API - HTTP front of the host registry
 *
 * ROUTES:
 * - GET    /health               liveness, always "ok"
 * - GET    /hosts                full registry as JSON (type -> hosts)
 * - POST   /hosts/{type}         register a host {"alias", "address"}
 * - DELETE /hosts/{type}/{alias} unregister a host
 *
 * Store calls block on disk I/O and run on the blocking pool. Errors come back
 * as {"error": "..."}; an unknown host on DELETE is a 404, every other store
 * failure a 500.
 */

use crate::models::{Host, Registry};
use crate::store::{RegistryStore, StoreError};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RegistryStore>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = if err.is_not_found() { StatusCode::NOT_FOUND } else { StatusCode::INTERNAL_SERVER_ERROR };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/hosts", get(list_hosts))
        .route("/hosts/{host_type}", post(add_host))
        .route("/hosts/{host_type}/{alias}", delete(remove_host))
        .with_state(app_state)
        .layer(cors)
}

async fn with_store<T, F>(app: &AppState, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&RegistryStore) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(&app.store);
    match tokio::task::spawn_blocking(move || op(&store)).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => Err(ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("store task failed: {e}"))),
    }
}

// GET /hosts
async fn list_hosts(State(app): State<AppState>) -> Result<Json<Registry>, ApiError> {
    let registry = with_store(&app, |store| store.list()).await.inspect_err(|e| {
        error!("list: {}", e.message);
    })?;
    Ok(Json(registry))
}

// POST /hosts/{host_type}
async fn add_host(
    State(app): State<AppState>,
    Path(host_type): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<()>), ApiError> {
    if body.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "empty request body"));
    }
    let host: Host = serde_json::from_slice(&body).map_err(|e| {
        error!("add: invalid host JSON: {e}");
        ApiError::new(StatusCode::BAD_REQUEST, format!("invalid host: {e}"))
    })?;

    let added = host.clone();
    let ty = host_type.clone();
    with_store(&app, move |store| store.add(&ty, host)).await.inspect_err(|e| {
        error!("add {host_type}: {}", e.message);
    })?;

    info!(host_type = %host_type, alias = %added.alias, address = %added.address, "added host");
    Ok((StatusCode::CREATED, Json(())))
}

// DELETE /hosts/{host_type}/{alias}
async fn remove_host(
    State(app): State<AppState>,
    Path((host_type, alias)): Path<(String, String)>,
) -> Result<Json<()>, ApiError> {
    let (ty, name) = (host_type.clone(), alias.clone());
    with_store(&app, move |store| store.remove(&ty, &name)).await.inspect_err(|e| {
        if e.status != StatusCode::NOT_FOUND {
            error!("remove {host_type}/{alias}: {}", e.message);
        }
    })?;

    info!(host_type = %host_type, alias = %alias, "removed host");
    Ok(Json(()))
}
