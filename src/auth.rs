//! Caller identity and endpoint ownership.
//!
//! Authentication itself is external: when auth is enabled an upstream
//! identity provider issues the bearer token and this layer treats it as an
//! opaque user id. Anonymous viewers are identified by the session cookie
//! issued by `POST /api/session/init`. Ownership is the black-box predicate
//! `owns(caller, owner)` consumed by every viewer-facing handler.

use crate::{config::AuthConfig, error::AppError, handlers::AppState, models::OwnerRef};
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

/// Identity attached to each viewer-facing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallerIdentity {
    /// Authenticated user id, carried via bearer token
    User(String),
    /// Anonymous session id, carried via the session cookie
    Anonymous(String),
}

impl CallerIdentity {
    /// The owner reference a new endpoint created by this caller gets
    pub fn to_owner(&self) -> OwnerRef {
        match self {
            Self::User(id) => OwnerRef::User(id.clone()),
            Self::Anonymous(id) => OwnerRef::AnonymousSession(id.clone()),
        }
    }
}

/// Decides whether a caller owns an endpoint. The auth mode is fixed at
/// construction; no ambient global switch.
#[derive(Debug, Clone)]
pub struct OwnershipResolver {
    auth_enabled: bool,
}

impl OwnershipResolver {
    pub fn new(auth_enabled: bool) -> Self {
        Self { auth_enabled }
    }

    pub fn owns(&self, caller: &CallerIdentity, owner: &OwnerRef) -> bool {
        match (caller, owner) {
            (CallerIdentity::User(user), OwnerRef::User(owner_id)) => {
                self.auth_enabled && user == owner_id
            }
            (CallerIdentity::Anonymous(session), OwnerRef::AnonymousSession(owner_id)) => {
                session == owner_id
            }
            _ => false,
        }
    }
}

/// Identity middleware for viewer-facing routes.
/// Attaches a `CallerIdentity` to the request or rejects with 401.
pub async fn identity_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = extract_identity(req.headers(), &state.config.auth)
        .ok_or_else(|| AppError::Unauthorized("Missing caller identity".to_string()))?;

    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}

/// Derive the caller identity from request headers.
/// Bearer tokens are only honored when auth is enabled; the anonymous
/// session cookie always works.
pub fn extract_identity(headers: &HeaderMap, auth: &AuthConfig) -> Option<CallerIdentity> {
    if auth.enabled {
        if let Some(token) = bearer_token(headers) {
            return Some(CallerIdentity::User(token.to_string()));
        }
    }

    cookie_value(headers, &auth.session_cookie).map(CallerIdentity::Anonymous)
}

/// Extract a non-empty Bearer token from the Authorization header
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    const BEARER_PREFIX: &str = "Bearer ";

    let value = headers.get("Authorization")?.to_str().ok()?;
    let token = value.strip_prefix(BEARER_PREFIX)?;

    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Find a cookie by name across all Cookie headers
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all("Cookie") {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            if let Some((key, val)) = pair.trim().split_once('=') {
                if key == name && !val.is_empty() {
                    return Some(val.to_string());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn auth_config(enabled: bool) -> AuthConfig {
        AuthConfig {
            enabled,
            ..Default::default()
        }
    }

    #[test]
    fn test_owns_matrix() {
        let resolver = OwnershipResolver::new(true);
        let user = CallerIdentity::User("u1".to_string());
        let anon = CallerIdentity::Anonymous("s1".to_string());

        assert!(resolver.owns(&user, &OwnerRef::User("u1".to_string())));
        assert!(!resolver.owns(&user, &OwnerRef::User("u2".to_string())));
        assert!(!resolver.owns(&user, &OwnerRef::AnonymousSession("u1".to_string())));

        assert!(resolver.owns(&anon, &OwnerRef::AnonymousSession("s1".to_string())));
        assert!(!resolver.owns(&anon, &OwnerRef::AnonymousSession("s2".to_string())));
        assert!(!resolver.owns(&anon, &OwnerRef::User("s1".to_string())));
    }

    #[test]
    fn test_user_ownership_requires_auth_enabled() {
        let resolver = OwnershipResolver::new(false);
        let user = CallerIdentity::User("u1".to_string());
        assert!(!resolver.owns(&user, &OwnerRef::User("u1".to_string())));

        // Anonymous ownership is unaffected by the auth mode
        let anon = CallerIdentity::Anonymous("s1".to_string());
        assert!(resolver.owns(&anon, &OwnerRef::AnonymousSession("s1".to_string())));
    }

    #[test]
    fn test_extract_identity_prefers_bearer_when_auth_enabled() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Bearer u-42"));
        headers.insert(
            "Cookie",
            HeaderValue::from_static("hookbin_session=anon-1"),
        );

        let identity = extract_identity(&headers, &auth_config(true)).unwrap();
        assert_eq!(identity, CallerIdentity::User("u-42".to_string()));
    }

    #[test]
    fn test_extract_identity_ignores_bearer_when_auth_disabled() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Bearer u-42"));
        headers.insert(
            "Cookie",
            HeaderValue::from_static("hookbin_session=anon-1"),
        );

        let identity = extract_identity(&headers, &auth_config(false)).unwrap();
        assert_eq!(identity, CallerIdentity::Anonymous("anon-1".to_string()));
    }

    #[test]
    fn test_extract_identity_none_without_credentials() {
        let headers = HeaderMap::new();
        assert!(extract_identity(&headers, &auth_config(true)).is_none());
    }

    #[test]
    fn test_cookie_value_parses_multiple_pairs() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Cookie",
            HeaderValue::from_static("theme=dark; hookbin_session=abc123; lang=en"),
        );

        assert_eq!(
            cookie_value(&headers, "hookbin_session").as_deref(),
            Some("abc123")
        );
        assert!(cookie_value(&headers, "missing").is_none());
    }

    #[test]
    fn test_bearer_token_rejects_malformed() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Basic dXNlcg=="));
        assert!(bearer_token(&headers).is_none());

        headers.insert("Authorization", HeaderValue::from_static("Bearer "));
        assert!(bearer_token(&headers).is_none());
    }
}
