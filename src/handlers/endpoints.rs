//! Viewer-facing endpoint CRUD and capture listing. Every operation here
//! runs behind the identity middleware and checks ownership.

use crate::{
    auth::CallerIdentity,
    error::AppError,
    handlers::AppState,
    models::{CaptureFilter, Endpoint},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct CreateEndpointRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ListCapturesQuery {
    pub method: Option<String>,
    pub search: Option<String>,
}

/// Fetch an endpoint and verify the caller owns it. Unknown ids are 404;
/// known ids owned by someone else are 403.
pub(super) async fn authorized_endpoint(
    state: &AppState,
    caller: &CallerIdentity,
    id: &str,
) -> Result<Endpoint, AppError> {
    let endpoint = state
        .store
        .get_endpoint(id)
        .await?
        .ok_or(AppError::NotFound)?;

    if !state.ownership.owns(caller, &endpoint.owner) {
        return Err(AppError::Forbidden);
    }

    Ok(endpoint)
}

/// POST /api/endpoints
pub async fn create_endpoint(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(request): Json<CreateEndpointRequest>,
) -> Result<impl IntoResponse, AppError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidRequest("Name is required".to_string()));
    }

    let endpoint = state
        .store
        .create_endpoint(&caller.to_owner(), name, state.config.capture.slug_length)
        .await?;

    info!(endpoint_id = %endpoint.id, slug = %endpoint.slug, "endpoint created");

    Ok((StatusCode::CREATED, Json(endpoint)))
}

/// GET /api/endpoints
pub async fn list_endpoints(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
) -> Result<Json<Vec<Endpoint>>, AppError> {
    let endpoints = state.store.list_endpoints(&caller.to_owner()).await?;
    Ok(Json(endpoints))
}

/// GET /api/endpoints/{id}
pub async fn get_endpoint(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<String>,
) -> Result<Json<Endpoint>, AppError> {
    let endpoint = authorized_endpoint(&state, &caller, &id).await?;
    Ok(Json(endpoint))
}

/// DELETE /api/endpoints/{id}
///
/// Deletion cascades to every captured record of the endpoint.
pub async fn delete_endpoint(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let endpoint = authorized_endpoint(&state, &caller, &id).await?;

    state.store.delete_endpoint(&endpoint.id).await?;
    info!(endpoint_id = %endpoint.id, "endpoint deleted");

    Ok(Json(json!({ "success": true })))
}

/// GET /api/endpoints/{id}/webhooks
pub async fn list_captures(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<String>,
    Query(query): Query<ListCapturesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let endpoint = authorized_endpoint(&state, &caller, &id).await?;

    let filter = CaptureFilter {
        method: query.method,
        search: query.search,
    };
    let captures = state.store.list_captures(&endpoint.id, &filter).await?;

    Ok(Json(captures))
}
