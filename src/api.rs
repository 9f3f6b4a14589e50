//! Backend wire format and HTTP client.
//!
//! The match-listing service is a black box behind two endpoints:
//!
//!   POST {server}/api/query  → one page of matches (cursor-paginated)
//!   POST {server}/api/count  → total number of matches for the pattern
//!
//! Non-success responses carry `{ "error": "..." }`. The body is surfaced
//! verbatim when present; an absent or unparsable body falls back to a
//! generic message for the endpoint.

use std::collections::BTreeMap;
use std::time::Duration;

use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::query::{Cursor, QueryKey, QueryMode};

/// Fallback message for a failed `/api/query` call.
pub const QUERY_FAILED: &str = "Query failed";
/// Fallback message for a failed `/api/count` call.
pub const COUNT_UNAVAILABLE: &str = "Count unavailable";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub pattern: String,
    pub mode: QueryMode,
    pub page_size: u32,
    pub cursor: Option<Cursor>,
}

impl QueryRequest {
    pub fn new(key: &QueryKey, page_size: u32, cursor: Option<Cursor>) -> Self {
        Self {
            pattern: key.pattern.clone(),
            mode: key.mode,
            page_size,
            cursor,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CountRequest {
    pub pattern: String,
    pub mode: QueryMode,
    pub page_size: u32,
}

impl CountRequest {
    pub fn new(key: &QueryKey, page_size: u32) -> Self {
        Self {
            pattern: key.pattern.clone(),
            mode: key.mode,
            page_size,
        }
    }
}

/// A single matched object.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Item {
    pub object: String,
    pub url: String,
    #[serde(default)]
    pub captures: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Stats {
    pub scanned_prefixes: u64,
    pub scanned_objects: u64,
    pub matched: u64,
}

/// One page of `/api/query`.
///
/// `capture_names` is authoritative only on the first page of a query;
/// later pages may repeat or omit it.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    #[serde(default)]
    pub capture_names: Vec<String>,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub next_cursor: Option<Cursor>,
    #[serde(default)]
    pub stats: Option<Stats>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct CountResponse {
    total: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
    error: Option<String>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    /// Connection refused, timeout, TLS failure, ...
    #[error("request failed: {0}")]
    Transport(String),

    /// Non-success HTTP status. `message` is already user-facing.
    #[error("{message} (HTTP {status})")]
    Status { status: u16, message: String },

    /// Success status but the body did not decode. `message` is the
    /// endpoint's generic user-facing text.
    #[error("malformed response: {detail}")]
    Decode { message: String, detail: String },
}

impl ApiError {
    /// Text shown to the user in the error panel / status bar.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Transport(msg) => msg.clone(),
            ApiError::Status { message, .. } => message.clone(),
            ApiError::Decode { message, .. } => message.clone(),
        }
    }

    /// Build a status error from a raw response body.
    ///
    /// Bodies that are not JSON are treated as `{}`.
    pub fn from_status_body(status: u16, body: &str, fallback: &str) -> Self {
        let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
        let message = parsed
            .error
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| fallback.to_string());
        ApiError::Status { status, message }
    }
}

/// Decode a success body, reporting failures under the endpoint's `fallback`.
fn decode_body<T: DeserializeOwned>(text: &str, fallback: &str) -> Result<T, ApiError> {
    serde_json::from_str(text).map_err(|e| ApiError::Decode {
        message: fallback.to_string(),
        detail: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Blocking access to the match-listing service.
///
/// Implementations are called from worker threads, never from the UI thread.
pub trait Backend: Send + Sync {
    fn query(&self, req: &QueryRequest) -> Result<Page, ApiError>;
    fn count(&self, req: &CountRequest) -> Result<u64, ApiError>;
    /// Download raw image bytes for the detail viewer.
    fn fetch_image(&self, url: &str) -> Result<Vec<u8>, ApiError>;
}

/// `Backend` over HTTP using a shared `ureq` agent.
pub struct HttpBackend {
    agent: ureq::Agent,
    base_url: String,
    max_image_bytes: u64,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration, max_image_bytes: u64) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_image_bytes,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// POST `body` as JSON and return the raw response text on success.
    fn post_json<T: Serialize>(&self, path: &str, body: &T, fallback: &str) -> Result<String, ApiError> {
        let url = self.endpoint(path);
        debug!("api: POST {url}");
        let mut resp = self
            .agent
            .post(&url)
            .send_json(body)
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = resp.status();
        // An unreadable error body is the same as an empty one.
        let text = match resp.body_mut().read_to_string() {
            Ok(t) => t,
            Err(e) if status.is_success() => return Err(ApiError::Transport(e.to_string())),
            Err(_) => String::new(),
        };
        if !status.is_success() {
            debug!("api: {url} returned {status}");
            return Err(ApiError::from_status_body(status.as_u16(), &text, fallback));
        }
        Ok(text)
    }
}

impl Backend for HttpBackend {
    fn query(&self, req: &QueryRequest) -> Result<Page, ApiError> {
        let text = self.post_json("/api/query", req, QUERY_FAILED)?;
        decode_body(&text, QUERY_FAILED)
    }

    fn count(&self, req: &CountRequest) -> Result<u64, ApiError> {
        let text = self.post_json("/api/count", req, COUNT_UNAVAILABLE)?;
        let resp: CountResponse = decode_body(&text, COUNT_UNAVAILABLE)?;
        Ok(resp.total)
    }

    fn fetch_image(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        debug!("api: GET {url}");
        let mut resp = self
            .agent
            .get(url)
            .call()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: "Failed to load image".into(),
            });
        }
        resp.body_mut()
            .with_config()
            .limit(self.max_image_bytes)
            .read_to_vec()
            .map_err(|e| ApiError::Transport(e.to_string()))
    }
}
