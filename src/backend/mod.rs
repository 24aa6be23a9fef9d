//! Hosted backend seam.
//!
//! Everything the app persists remotely goes through the [`Backend`] trait:
//! relational rows with equality/ordering filters, binary objects with
//! signed download URLs, the current-user lookup that gates writes, and a
//! per-table change feed. [`RestBackend`] talks to the hosted service;
//! [`MemoryBackend`] is the in-process double used by the service tests.

pub mod memory;
pub mod realtime;
pub mod rest;

pub use memory::MemoryBackend;
pub use realtime::{ChangeKind, RealtimeFeed, TableChange};
pub use rest::RestBackend;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::AuthUser;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("cannot reach backend at {url}: {reason}")]
    Connection { url: String, reason: String },

    #[error("backend returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to decode backend response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no active session: sign in first")]
    NotAuthenticated,

    #[error("malformed access token: {reason}")]
    InvalidToken { reason: String },

    #[error("{table} row {id} not found")]
    RowNotFound { table: String, id: Uuid },

    #[error("backend returned no rows for {operation} on {table}")]
    NoRows { operation: String, table: String },
}

// ═══════════════════════════════════════════════════════════
// SelectQuery
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        }
    }
}

/// Row selection: zero or more equality filters plus an optional ordering.
#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    filters: Vec<(String, Value)>,
    order: Option<(String, SortOrder)>,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only rows whose `column` equals `value`.
    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push((column.to_string(), value.into()));
        self
    }

    pub fn order_asc(mut self, column: &str) -> Self {
        self.order = Some((column.to_string(), SortOrder::Ascending));
        self
    }

    pub fn order_desc(mut self, column: &str) -> Self {
        self.order = Some((column.to_string(), SortOrder::Descending));
        self
    }

    pub fn filters(&self) -> &[(String, Value)] {
        &self.filters
    }

    pub fn order(&self) -> Option<(&str, SortOrder)> {
        self.order.as_ref().map(|(col, ord)| (col.as_str(), *ord))
    }
}

/// A JSON scalar rendered the way the row endpoints expect it in a filter:
/// bare for strings, JSON-rendered for everything else.
pub(crate) fn filter_literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Decode one fetched row into its model type.
pub(crate) fn decode_row<T: serde::de::DeserializeOwned>(row: Value) -> Result<T, BackendError> {
    Ok(serde_json::from_value(row)?)
}

// ═══════════════════════════════════════════════════════════
// Backend trait
// ═══════════════════════════════════════════════════════════

/// The hosted persistence collaborator.
///
/// Rows travel as JSON objects; typed wrappers live in the per-table
/// service modules. All writes are expected to be stamped with the current
/// user's id by the caller.
#[async_trait]
pub trait Backend: Send + Sync {
    /// The signed-in user. Errors when no session is active.
    async fn current_user(&self) -> Result<AuthUser, BackendError>;

    /// Insert a row; returns the stored row including backend-assigned
    /// columns (id, created_at).
    async fn insert_row(&self, table: &str, row: Value) -> Result<Value, BackendError>;

    /// Patch columns of the row with this id; returns the updated row.
    async fn update_row(&self, table: &str, id: Uuid, patch: Value) -> Result<Value, BackendError>;

    /// Delete the row with this id. Deleting an absent row is a no-op.
    async fn delete_row(&self, table: &str, id: Uuid) -> Result<(), BackendError>;

    /// Select rows matching the query.
    async fn select_rows(&self, table: &str, query: SelectQuery)
        -> Result<Vec<Value>, BackendError>;

    /// Store a binary object under `bucket/path`.
    async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BackendError>;

    /// Time-limited signed URL for downloading or viewing an object.
    async fn signed_url(
        &self,
        bucket: &str,
        path: &str,
        expires_in_secs: u64,
    ) -> Result<String, BackendError>;

    /// Change feed for one table: one event per insert/update/delete,
    /// prompting the consumer to re-query.
    fn subscribe(&self, table: &str) -> broadcast::Receiver<TableChange>;
}
