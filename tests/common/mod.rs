//! Shared helpers for integration tests: an app wired to an in-memory
//! store, plus small request/response utilities.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    Router,
};
use hookbin::{
    auth::OwnershipResolver,
    config::Config,
    fanout::FanoutChannel,
    handlers::AppState,
    server,
    store::CaptureStore,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub store: Arc<CaptureStore>,
    pub config: Arc<Config>,
}

/// Build a full application against a fresh in-memory database. The poll
/// interval is shortened so live-stream tests finish quickly.
pub async fn test_app() -> TestApp {
    let mut config = Config::default();
    config.capture.poll_interval_ms = 100;

    let store = Arc::new(CaptureStore::new("sqlite::memory:", 5).await.unwrap());
    let config = Arc::new(config);

    let state = AppState {
        fanout: FanoutChannel::new(store.clone()),
        store: store.clone(),
        ownership: Arc::new(OwnershipResolver::new(config.auth.enabled)),
        config: config.clone(),
    };

    // Local recorder keeps tests off the global metrics registry
    let recorder = PrometheusBuilder::new().build_recorder();
    let router = server::create_router(state, Arc::new(recorder.handle()));

    TestApp {
        router,
        store,
        config,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Run the session-init handshake and return the issued cookie pair
    /// ("hookbin_session=<id>")
    pub async fn init_session(&self) -> String {
        let response = self
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/api/session/init")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .expect("session init must set a cookie")
            .to_str()
            .unwrap();

        set_cookie
            .split(';')
            .next()
            .unwrap()
            .trim()
            .to_string()
    }

    /// Create an endpoint through the API, returning its JSON representation
    pub async fn create_endpoint(&self, cookie: &str, name: &str) -> Value {
        let response = self
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/api/endpoints")
                    .header(header::COOKIE, cookie)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        serde_json::json!({ "name": name }).to_string(),
                    ))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        body_json(response).await
    }

    /// List captured records, with optional query string like
    /// "method=POST&search=foo"
    pub async fn list_captures(&self, cookie: &str, endpoint_id: &str, query: &str) -> Value {
        let uri = if query.is_empty() {
            format!("/api/endpoints/{}/webhooks", endpoint_id)
        } else {
            format!("/api/endpoints/{}/webhooks?{}", endpoint_id, query)
        };

        let response = self
            .send(
                Request::builder()
                    .uri(uri)
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        body_json(response).await
    }
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
