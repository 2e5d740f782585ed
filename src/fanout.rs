//! Event fan-out channel: the read side of the capture pipeline.
//!
//! Live sessions discover newly persisted records by re-querying the store
//! with a cursor rather than receiving pushes from the ingest handler. That
//! keeps ingestion throughput independent of viewer count: N viewers mean N
//! reads per interval, never N extra writes.

use crate::models::CaptureRecord;
use crate::store::{CaptureStore, StoreError};
use std::sync::Arc;

/// Opaque marker for "everything up to and including this record has been
/// delivered". Backed by the insert-time sequence number, so comparisons are
/// immune to wall-clock granularity and concurrent writers landing on the
/// same timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor(i64);

impl Cursor {
    /// Before any record: the next poll returns the endpoint's full history
    pub const START: Cursor = Cursor(0);

    pub fn new(seq: i64) -> Self {
        Self(seq)
    }

    pub fn seq(&self) -> i64 {
        self.0
    }
}

/// One poll's worth of newly captured records, in ascending sequence order
#[derive(Debug)]
pub struct Batch {
    pub records: Vec<CaptureRecord>,
    /// Cursor to use for the next poll. Equal to the input cursor when the
    /// batch is empty.
    pub next_cursor: Cursor,
}

/// Pure reader over the capture store, shared by all live sessions
#[derive(Clone)]
pub struct FanoutChannel {
    store: Arc<CaptureStore>,
}

impl FanoutChannel {
    pub fn new(store: Arc<CaptureStore>) -> Self {
        Self { store }
    }

    /// Cursor positioned at the newest record an endpoint currently has
    pub async fn cursor_at_head(&self, endpoint_id: &str) -> Result<Cursor, StoreError> {
        Ok(Cursor(self.store.latest_cursor(endpoint_id).await?))
    }

    /// Fetch records created strictly after `cursor`. An empty result is a
    /// valid answer and leaves the cursor where it was.
    pub async fn poll(&self, endpoint_id: &str, cursor: Cursor) -> Result<Batch, StoreError> {
        let records = self.store.captures_since(endpoint_id, cursor.0).await?;
        let next_cursor = records.last().map_or(cursor, |record| Cursor(record.seq));

        Ok(Batch {
            records,
            next_cursor,
        })
    }
}
