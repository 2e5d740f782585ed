//! SQLite persistence layer for endpoints and captured requests
//!
//! This module provides async database operations with:
//! - Connection pooling
//! - Automatic migrations
//! - WAL mode for concurrent reads/writes
//! - Cascade deletion of captures when their endpoint is deleted

use crate::models::{
    CaptureFilter, CaptureRecord, Endpoint, NewCapture, OwnerRef, ResolvedEndpoint,
};
use crate::slug;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// How many fresh slugs to try before giving up on endpoint creation
const SLUG_ATTEMPTS: usize = 4;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("failed to allocate a unique slug after {0} attempts")]
    SlugExhausted(usize),
    #[error("corrupt row in store: {0}")]
    Corrupt(String),
}

/// Capture store handle
///
/// Manages the SQLite connection pool. The store is the single source of
/// truth: no component caches records in process.
pub struct CaptureStore {
    pool: SqlitePool,
    #[cfg(test)]
    fail_reads: std::sync::atomic::AtomicBool,
}

impl CaptureStore {
    /// Open (creating if missing) the capture database and run migrations
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true) // cascade delete depends on this
            .busy_timeout(Duration::from_secs(30))
            .pragma("synchronous", "NORMAL")
            .pragma("temp_store", "memory");

        // An in-memory database exists per connection; more than one pooled
        // connection would see different databases.
        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            max_connections
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self {
            pool,
            #[cfg(test)]
            fail_reads: std::sync::atomic::AtomicBool::new(false),
        })
    }

    /// Make subsequent cursor reads fail, to exercise poll-failure paths
    #[cfg(test)]
    pub(crate) fn set_fail_reads(&self, fail: bool) {
        self.fail_reads
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Create an endpoint for the given owner, issuing a fresh unique slug.
    ///
    /// Slug uniqueness rides on the UNIQUE constraint: a collision surfaces
    /// as a constraint violation and we retry with a new slug.
    pub async fn create_endpoint(
        &self,
        owner: &OwnerRef,
        name: &str,
        slug_length: usize,
    ) -> Result<Endpoint, StoreError> {
        for _ in 0..SLUG_ATTEMPTS {
            let endpoint = Endpoint {
                id: uuid::Uuid::new_v4().to_string(),
                owner: owner.clone(),
                name: name.to_string(),
                slug: slug::generate(slug_length),
                created_at: chrono::Utc::now().timestamp_millis(),
            };

            let result = sqlx::query(
                "INSERT INTO endpoints (id, owner_kind, owner_id, name, slug, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&endpoint.id)
            .bind(endpoint.owner.kind())
            .bind(endpoint.owner.id())
            .bind(&endpoint.name)
            .bind(&endpoint.slug)
            .bind(endpoint.created_at)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => return Ok(endpoint),
                Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                    tracing::warn!(slug = %endpoint.slug, "slug collision, retrying");
                    continue;
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(StoreError::SlugExhausted(SLUG_ATTEMPTS))
    }

    /// Resolve a public slug to its endpoint identity. The only lookup on
    /// the ingestion hot path besides the insert itself.
    pub async fn resolve_slug(&self, slug: &str) -> Result<Option<ResolvedEndpoint>, StoreError> {
        let row = sqlx::query("SELECT id, created_at FROM endpoints WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| ResolvedEndpoint {
            id: row.get("id"),
            created_at: row.get("created_at"),
        }))
    }

    /// Fetch an endpoint by id
    pub async fn get_endpoint(&self, id: &str) -> Result<Option<Endpoint>, StoreError> {
        let row = sqlx::query(
            "SELECT id, owner_kind, owner_id, name, slug, created_at
             FROM endpoints WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_endpoint).transpose()
    }

    /// List all endpoints belonging to an owner, oldest first
    pub async fn list_endpoints(&self, owner: &OwnerRef) -> Result<Vec<Endpoint>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, owner_kind, owner_id, name, slug, created_at
             FROM endpoints
             WHERE owner_kind = ? AND owner_id = ?
             ORDER BY created_at ASC",
        )
        .bind(owner.kind())
        .bind(owner.id())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_endpoint).collect()
    }

    /// Delete an endpoint. All of its captured records go with it via the
    /// foreign-key cascade. Returns false if the endpoint did not exist.
    pub async fn delete_endpoint(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM endpoints WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Persist one captured request as a single atomic insert. The returned
    /// record carries the insert-time sequence number used as the
    /// live-stream cursor.
    pub async fn insert_capture(&self, capture: &NewCapture) -> Result<CaptureRecord, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let headers_json = serde_json::to_string(&capture.headers)
            .map_err(|e| StoreError::Corrupt(format!("headers: {}", e)))?;
        let query_json = serde_json::to_string(&capture.query_params)
            .map_err(|e| StoreError::Corrupt(format!("query params: {}", e)))?;

        let result = sqlx::query(
            "INSERT INTO webhooks (id, endpoint_id, method, headers, body, query_params, ip, received_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&capture.endpoint_id)
        .bind(&capture.method)
        .bind(&headers_json)
        .bind(&capture.body)
        .bind(&query_json)
        .bind(&capture.ip)
        .bind(capture.received_at)
        .execute(&self.pool)
        .await?;

        Ok(CaptureRecord {
            id,
            endpoint_id: capture.endpoint_id.clone(),
            seq: result.last_insert_rowid(),
            method: capture.method.clone(),
            headers: capture.headers.clone(),
            body: capture.body.clone(),
            query_params: capture.query_params.clone(),
            ip: capture.ip.clone(),
            received_at: capture.received_at,
        })
    }

    /// List captured records for an endpoint, newest first, with optional
    /// method and body-substring filters
    pub async fn list_captures(
        &self,
        endpoint_id: &str,
        filter: &CaptureFilter,
    ) -> Result<Vec<CaptureRecord>, StoreError> {
        let mut sql = String::from(
            "SELECT seq, id, endpoint_id, method, headers, body, query_params, ip, received_at
             FROM webhooks WHERE endpoint_id = ?",
        );
        if filter.method.is_some() {
            sql.push_str(" AND method = ?");
        }
        if filter.search.is_some() {
            // instr() instead of LIKE so '%' and '_' in the needle stay literal
            sql.push_str(" AND body IS NOT NULL AND instr(lower(body), lower(?)) > 0");
        }
        sql.push_str(" ORDER BY seq DESC");

        let mut query = sqlx::query(&sql).bind(endpoint_id);
        if let Some(method) = &filter.method {
            query = query.bind(method.to_uppercase());
        }
        if let Some(search) = &filter.search {
            query = query.bind(search);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(row_to_capture).collect()
    }

    /// Records created strictly after the cursor, ascending. The fan-out
    /// channel's one query.
    pub async fn captures_since(
        &self,
        endpoint_id: &str,
        cursor: i64,
    ) -> Result<Vec<CaptureRecord>, StoreError> {
        #[cfg(test)]
        if self.fail_reads.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }

        let rows = sqlx::query(
            "SELECT seq, id, endpoint_id, method, headers, body, query_params, ip, received_at
             FROM webhooks
             WHERE endpoint_id = ? AND seq > ?
             ORDER BY seq ASC",
        )
        .bind(endpoint_id)
        .bind(cursor)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_capture).collect()
    }

    /// Highest sequence number currently recorded for an endpoint, 0 if none.
    /// A live session opens at this cursor so it only sees records created
    /// after session-open.
    pub async fn latest_cursor(&self, endpoint_id: &str) -> Result<i64, StoreError> {
        let seq: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(seq), 0) FROM webhooks WHERE endpoint_id = ?")
                .bind(endpoint_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(seq)
    }

    /// Cheap liveness probe for readiness checks
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    /// Number of captured records for an endpoint
    pub async fn count_captures(&self, endpoint_id: &str) -> Result<i64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM webhooks WHERE endpoint_id = ?")
                .bind(endpoint_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}

fn row_to_endpoint(row: sqlx::sqlite::SqliteRow) -> Result<Endpoint, StoreError> {
    let kind: String = row.get("owner_kind");
    let owner_id: String = row.get("owner_id");
    let owner = OwnerRef::from_columns(&kind, owner_id)
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;

    Ok(Endpoint {
        id: row.get("id"),
        owner,
        name: row.get("name"),
        slug: row.get("slug"),
        created_at: row.get("created_at"),
    })
}

fn row_to_capture(row: sqlx::sqlite::SqliteRow) -> Result<CaptureRecord, StoreError> {
    let headers_json: String = row.get("headers");
    let query_json: String = row.get("query_params");

    Ok(CaptureRecord {
        seq: row.get("seq"),
        id: row.get("id"),
        endpoint_id: row.get("endpoint_id"),
        method: row.get("method"),
        headers: serde_json::from_str(&headers_json)
            .map_err(|e| StoreError::Corrupt(format!("headers: {}", e)))?,
        body: row.get("body"),
        query_params: serde_json::from_str(&query_json)
            .map_err(|e| StoreError::Corrupt(format!("query params: {}", e)))?,
        ip: row.get("ip"),
        received_at: row.get("received_at"),
    })
}
