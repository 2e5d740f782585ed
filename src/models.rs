use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Owner of an endpoint: an authenticated user or an anonymous browser
/// session. Exactly one identity, enforced at the type level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum OwnerRef {
    User(String),
    AnonymousSession(String),
}

impl OwnerRef {
    /// Column value for the `owner_kind` discriminator
    pub fn kind(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::AnonymousSession(_) => "anonymous",
        }
    }

    /// The opaque owner identifier
    pub fn id(&self) -> &str {
        match self {
            Self::User(id) | Self::AnonymousSession(id) => id,
        }
    }

    /// Reconstruct from the (kind, id) column pair
    pub fn from_columns(kind: &str, id: String) -> anyhow::Result<Self> {
        match kind {
            "user" => Ok(Self::User(id)),
            "anonymous" => Ok(Self::AnonymousSession(id)),
            other => anyhow::bail!("unknown owner kind in store: {}", other),
        }
    }
}

/// A user-created capture target with a unique public slug
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub id: String,
    pub owner: OwnerRef,
    pub name: String,
    pub slug: String,
    /// Unix milliseconds
    pub created_at: i64,
}

/// Minimal endpoint identity returned by slug resolution. The ingestion hot
/// path only needs the id and the creation time (receipt timestamps must
/// never precede it).
#[derive(Debug, Clone)]
pub struct ResolvedEndpoint {
    pub id: String,
    pub created_at: i64,
}

/// One persisted inbound HTTP request. Immutable once inserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRecord {
    pub id: String,
    pub endpoint_id: String,
    /// Insert-time sequence number, used as the live-stream cursor
    pub seq: i64,
    /// Uppercase HTTP method
    pub method: String,
    /// Last occurrence wins on duplicate header names
    pub headers: HashMap<String, String>,
    /// None only when the body stream was unreadable at capture time
    pub body: Option<String>,
    pub query_params: HashMap<String, String>,
    /// Best-effort source address, "unknown" if undeterminable
    pub ip: String,
    /// Unix milliseconds, server clock at persistence time
    pub received_at: i64,
}

/// A capture that has been normalized but not yet persisted
#[derive(Debug, Clone)]
pub struct NewCapture {
    pub endpoint_id: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    pub query_params: HashMap<String, String>,
    pub ip: String,
    pub received_at: i64,
}

/// Filters for listing captured records
#[derive(Debug, Clone, Default)]
pub struct CaptureFilter {
    /// Exact method match, normalized to uppercase before querying
    pub method: Option<String>,
    /// Case-insensitive substring over non-null bodies
    pub search: Option<String>,
}
