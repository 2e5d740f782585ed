//! Anonymous session bootstrap.
//!
//! Issues the HttpOnly session cookie that anonymous viewers use as their
//! identity. Calling it again with a live cookie is a no-op, so the client
//! can fire it unconditionally on page load.

use crate::{auth, error::AppError, handlers::AppState, slug};
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::debug;

/// POST /api/session/init
pub async fn init_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let auth_config = &state.config.auth;

    if let Some(existing) = auth::cookie_value(&headers, &auth_config.session_cookie) {
        return Ok(Json(json!({ "sessionId": existing, "created": false })).into_response());
    }

    let session_id = slug::generate_session_id();
    let max_age_seconds = u64::from(auth_config.session_max_age_days) * 24 * 60 * 60;
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        auth_config.session_cookie, session_id, max_age_seconds
    );

    debug!("issued anonymous session");

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "sessionId": session_id, "created": true })),
    )
        .into_response())
}
