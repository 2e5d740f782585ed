//! Live update session tests over the real SSE transport: handshake,
//! near-real-time delivery, ordering, and the session-open cursor.

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use common::test_app;
use futures_util::StreamExt;
use serde_json::Value;
use std::time::Duration;

/// Pull the next `data:` frame off an SSE body stream, skipping keep-alive
/// comment frames
async fn next_event(
    stream: &mut axum::body::BodyDataStream,
    buffer: &mut String,
) -> Value {
    loop {
        while let Some(pos) = buffer.find("\n\n") {
            let frame: String = buffer.drain(..pos + 2).collect();
            if let Some(data) = frame.lines().find_map(|line| line.strip_prefix("data: ")) {
                return serde_json::from_str(data).unwrap();
            }
        }

        let chunk = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timed out waiting for SSE frame")
            .expect("SSE stream ended unexpectedly")
            .unwrap();
        buffer.push_str(&String::from_utf8_lossy(&chunk));
    }
}

async fn open_session(
    app: &common::TestApp,
    cookie: &str,
    endpoint_id: &str,
) -> axum::body::BodyDataStream {
    let response = app
        .send(
            Request::builder()
                .uri(format!("/api/endpoints/{}/events", endpoint_id))
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    response.into_body().into_data_stream()
}

#[tokio::test]
async fn test_session_opens_with_connected_event() {
    let app = test_app().await;
    let cookie = app.init_session().await;
    let endpoint = app.create_endpoint(&cookie, "Live").await;

    let mut stream = open_session(&app, &cookie, endpoint["id"].as_str().unwrap()).await;
    let mut buffer = String::new();

    let handshake = next_event(&mut stream, &mut buffer).await;
    assert_eq!(handshake["type"], "connected");
}

#[tokio::test]
async fn test_new_captures_are_streamed_in_order() {
    let app = test_app().await;
    let cookie = app.init_session().await;
    let endpoint = app.create_endpoint(&cookie, "Live").await;
    let endpoint_id = endpoint["id"].as_str().unwrap();
    let slug = endpoint["slug"].as_str().unwrap();

    let mut stream = open_session(&app, &cookie, endpoint_id).await;
    let mut buffer = String::new();
    assert_eq!(next_event(&mut stream, &mut buffer).await["type"], "connected");

    for body in ["first", "second"] {
        let response = app
            .send(
                Request::builder()
                    .method("POST")
                    .uri(format!("/webhook/{}", slug))
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let first = next_event(&mut stream, &mut buffer).await;
    let second = next_event(&mut stream, &mut buffer).await;

    assert_eq!(first["type"], "webhook");
    assert_eq!(first["data"]["body"], "first");
    assert_eq!(second["data"]["body"], "second");
    assert!(first["data"]["seq"].as_i64().unwrap() < second["data"]["seq"].as_i64().unwrap());
}

#[tokio::test]
async fn test_session_only_sees_records_after_open() {
    let app = test_app().await;
    let cookie = app.init_session().await;
    let endpoint = app.create_endpoint(&cookie, "Live").await;
    let endpoint_id = endpoint["id"].as_str().unwrap();
    let slug = endpoint["slug"].as_str().unwrap();

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri(format!("/webhook/{}", slug))
                .body(Body::from("before open"))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let mut stream = open_session(&app, &cookie, endpoint_id).await;
    let mut buffer = String::new();
    assert_eq!(next_event(&mut stream, &mut buffer).await["type"], "connected");

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri(format!("/webhook/{}", slug))
                .body(Body::from("after open"))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let event = next_event(&mut stream, &mut buffer).await;
    assert_eq!(event["data"]["body"], "after open");
}

#[tokio::test]
async fn test_concurrent_senders_each_record_delivered_once() {
    let app = test_app().await;
    let cookie = app.init_session().await;
    let endpoint = app.create_endpoint(&cookie, "Live").await;
    let endpoint_id = endpoint["id"].as_str().unwrap();
    let slug = endpoint["slug"].as_str().unwrap().to_string();

    let mut stream = open_session(&app, &cookie, endpoint_id).await;
    let mut buffer = String::new();
    assert_eq!(next_event(&mut stream, &mut buffer).await["type"], "connected");

    let senders: Vec<_> = (0..3)
        .map(|s| {
            let router = app.router.clone();
            let slug = slug.clone();
            tokio::spawn(async move {
                use tower::ServiceExt;
                for i in 0..4 {
                    let response = router
                        .clone()
                        .oneshot(
                            Request::builder()
                                .method("POST")
                                .uri(format!("/webhook/{}", slug))
                                .body(Body::from(format!("sender{}-{}", s, i)))
                                .unwrap(),
                        )
                        .await
                        .unwrap();
                    assert_eq!(response.status(), StatusCode::OK);
                }
            })
        })
        .collect();

    for sender in senders {
        sender.await.unwrap();
    }

    let mut ids = std::collections::HashSet::new();
    let mut last_seq = 0;
    for _ in 0..12 {
        let event = next_event(&mut stream, &mut buffer).await;
        assert_eq!(event["type"], "webhook");

        let seq = event["data"]["seq"].as_i64().unwrap();
        assert!(seq > last_seq, "delivery regressed or repeated");
        last_seq = seq;

        assert!(ids.insert(event["data"]["id"].as_str().unwrap().to_string()));
    }
    assert_eq!(ids.len(), 12);
}

#[tokio::test]
async fn test_session_for_unowned_endpoint_is_refused() {
    let app = test_app().await;
    let owner = app.init_session().await;
    let intruder = app.init_session().await;
    let endpoint = app.create_endpoint(&owner, "Private").await;

    let response = app
        .send(
            Request::builder()
                .uri(format!(
                    "/api/endpoints/{}/events",
                    endpoint["id"].as_str().unwrap()
                ))
                .header(header::COOKIE, &intruder)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
