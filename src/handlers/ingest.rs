//! Ingress capture handler: the public face of the service.
//!
//! Accepts any of GET/POST/PUT/PATCH/DELETE on `/webhook/{slug}`, normalizes
//! the request into an immutable record and persists it. The 200
//! acknowledgment is only sent after the insert has completed, so a sender
//! that sees success knows the record is durable.

use crate::{error::AppError, handlers::AppState, metrics, models::NewCapture};
use axum::{
    body::Body,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, Method, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, info, warn};

pub async fn handle_webhook(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    method: Method,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, AppError> {
    // Resolution failure ends processing before anything is read or written
    let endpoint = match state.store.resolve_slug(&slug).await {
        Ok(Some(endpoint)) => endpoint,
        Ok(None) => {
            metrics::record_unresolved_slug();
            return Err(AppError::NotFound);
        }
        Err(err) => {
            metrics::record_capture_error("resolve");
            warn!(error = %err, "slug resolution failed");
            return Err(err.into());
        }
    };

    let method = method.as_str().to_uppercase();

    // An unreadable body is captured as absent, never a request failure
    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(err) => {
            debug!(error = %err, "body stream unreadable, capturing without body");
            None
        }
    };

    // Receipt time must never precede the endpoint's creation time
    let received_at = chrono::Utc::now()
        .timestamp_millis()
        .max(endpoint.created_at);

    let capture = NewCapture {
        endpoint_id: endpoint.id,
        method: method.clone(),
        headers: collect_headers(&headers),
        body,
        query_params: parse_query(query.as_deref()),
        ip: source_ip(&headers),
        received_at,
    };

    let record = match state.store.insert_capture(&capture).await {
        Ok(record) => record,
        Err(err) => {
            metrics::record_capture_error("persistence");
            warn!(error = %err, "capture insert failed");
            return Err(err.into());
        }
    };

    metrics::record_capture(&method);
    info!(
        endpoint_id = %record.endpoint_id,
        method = %record.method,
        seq = record.seq,
        "captured webhook"
    );

    Ok((StatusCode::OK, Json(json!({ "received": true }))))
}

/// Flatten headers into a string map; the last occurrence of a repeated
/// header name wins
fn collect_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (name, value) in headers {
        map.insert(
            name.as_str().to_string(),
            String::from_utf8_lossy(value.as_bytes()).into_owned(),
        );
    }
    map
}

/// Parse a raw query string into a flat map, last occurrence wins on
/// duplicate keys. An unparsable query captures as empty.
fn parse_query(raw: Option<&str>) -> HashMap<String, String> {
    let Some(raw) = raw else {
        return HashMap::new();
    };

    serde_urlencoded::from_str::<Vec<(String, String)>>(raw)
        .unwrap_or_default()
        .into_iter()
        .collect()
}

/// Best-effort source address: first element of x-forwarded-for, then
/// x-real-ip, then "unknown". No validation.
fn source_ip(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }

    "unknown".to_string()
}
