//! Live update session: one long-lived SSE connection per viewer.
//!
//! The session polls the fan-out channel on a fixed interval and pushes each
//! newly captured record as one SSE event, in ascending sequence order. The
//! cursor only advances on non-empty batches, and a failed poll cycle is
//! logged and swallowed, so no acknowledged record is ever skipped. Client
//! disconnect drops the stream, which tears down the timer and the session
//! gauge within one interval.

use crate::{
    auth::CallerIdentity,
    error::AppError,
    fanout::{Cursor, FanoutChannel},
    handlers::{endpoints::authorized_endpoint, AppState},
    metrics,
    models::CaptureRecord,
};
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Extension,
};
use futures::stream::{self, Stream, StreamExt};
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, warn};

/// Decrements the live-session gauge when the viewer disconnects and the
/// stream is dropped
struct SessionGuard {
    endpoint_id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        metrics::session_closed();
        debug!(endpoint_id = %self.endpoint_id, "live session closed");
    }
}

/// GET /api/endpoints/{id}/events
pub async fn stream_events(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let endpoint = authorized_endpoint(&state, &caller, &id).await?;

    // Open at the head: the session only delivers records created after it
    let cursor = state.fanout.cursor_at_head(&endpoint.id).await?;

    metrics::session_opened();
    debug!(endpoint_id = %endpoint.id, cursor = cursor.seq(), "live session opened");

    let stream = session_stream(
        state.fanout.clone(),
        endpoint.id,
        cursor,
        state.config.capture.poll_interval(),
    );

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Build the event stream: one "connected" handshake event, then the
/// poll loop
fn session_stream(
    fanout: FanoutChannel,
    endpoint_id: String,
    cursor: Cursor,
    poll_interval: Duration,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let guard = SessionGuard {
        endpoint_id: endpoint_id.clone(),
    };

    let connected = stream::once(async move {
        Ok(Event::default().data(json!({ "type": "connected" }).to_string()))
    });

    let polls = stream::unfold(cursor, move |cursor| {
        let fanout = fanout.clone();
        let endpoint_id = endpoint_id.clone();

        async move {
            tokio::time::sleep(poll_interval).await;

            let (events, next_cursor) = match fanout.poll(&endpoint_id, cursor).await {
                Ok(batch) => {
                    let events: Vec<Result<Event, Infallible>> =
                        batch.records.iter().filter_map(record_event).collect();

                    if !events.is_empty() {
                        metrics::record_stream_events(events.len() as u64);
                    }

                    (events, batch.next_cursor)
                }
                Err(err) => {
                    // One failed cycle must not close the session; the cursor
                    // stays put and the next tick retries
                    warn!(endpoint_id = %endpoint_id, error = %err, "live session poll failed");
                    (Vec::new(), cursor)
                }
            };

            Some((stream::iter(events), next_cursor))
        }
    })
    .flatten();

    // The guard rides in the map closure so it drops exactly when the
    // stream does
    connected.chain(polls).map(move |event| {
        let _ = &guard;
        event
    })
}

fn record_event(record: &CaptureRecord) -> Option<Result<Event, Infallible>> {
    match serde_json::to_string(&json!({ "type": "webhook", "data": record })) {
        Ok(payload) => Some(Ok(Event::default().data(payload))),
        Err(err) => {
            warn!(record_id = %record.id, error = %err, "failed to serialize record for stream");
            None
        }
    }
}
