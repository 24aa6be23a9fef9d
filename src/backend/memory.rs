//! In-process backend double.
//!
//! Implements the full [`Backend`] contract against HashMaps so the
//! service layer can be tested without a server: rows get ids and
//! timestamps assigned on insert, writes emit change events, and
//! individual write kinds can be scripted to fail.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::realtime::{ChangeKind, TableChange};
use super::{Backend, BackendError, SelectQuery};
use crate::models::AuthUser;

const CHANNEL_CAPACITY: usize = 32;

struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
}

pub struct MemoryBackend {
    user: AuthUser,
    tables: Mutex<HashMap<String, Vec<Value>>>,
    objects: Mutex<HashMap<String, StoredObject>>,
    channels: Mutex<HashMap<String, broadcast::Sender<TableChange>>>,
    fail_inserts: AtomicBool,
    fail_updates: AtomicBool,
    fail_selects: AtomicBool,
}

impl MemoryBackend {
    pub fn new(user: AuthUser) -> Self {
        Self {
            user,
            tables: Mutex::new(HashMap::new()),
            objects: Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
            fail_inserts: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
            fail_selects: AtomicBool::new(false),
        }
    }

    /// Fresh backend with a random signed-in user.
    pub fn signed_in() -> Self {
        Self::new(AuthUser::new(Uuid::new_v4()))
    }

    /// Make every insert fail until reset.
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, AtomicOrdering::SeqCst);
    }

    /// Make every update fail until reset.
    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, AtomicOrdering::SeqCst);
    }

    /// Make every select fail until reset.
    pub fn set_fail_selects(&self, fail: bool) {
        self.fail_selects.store(fail, AtomicOrdering::SeqCst);
    }

    /// Snapshot of a table, for assertions.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        let tables = self.tables.lock().unwrap_or_else(|p| p.into_inner());
        tables.get(table).cloned().unwrap_or_default()
    }

    /// Stored object bytes, for assertions.
    pub fn object(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        let objects = self.objects.lock().unwrap_or_else(|p| p.into_inner());
        objects
            .get(&object_key(bucket, path))
            .map(|o| o.bytes.clone())
    }

    /// Stored object content type, for assertions.
    pub fn object_content_type(&self, bucket: &str, path: &str) -> Option<String> {
        let objects = self.objects.lock().unwrap_or_else(|p| p.into_inner());
        objects
            .get(&object_key(bucket, path))
            .map(|o| o.content_type.clone())
    }

    fn emit(&self, table: &str, kind: ChangeKind) {
        let channels = self.channels.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(sender) = channels.get(table) {
            let _ = sender.send(TableChange {
                table: table.to_string(),
                kind,
            });
        }
    }
}

fn object_key(bucket: &str, path: &str) -> String {
    format!("{bucket}/{path}")
}

fn scripted_failure(operation: &str) -> BackendError {
    BackendError::Api {
        status: 500,
        body: format!("injected {operation} failure"),
    }
}

fn row_has_id(row: &Value, id: Uuid) -> bool {
    row.get("id") == Some(&Value::String(id.to_string()))
}

fn compare_column(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn current_user(&self) -> Result<AuthUser, BackendError> {
        Ok(self.user.clone())
    }

    async fn insert_row(&self, table: &str, row: Value) -> Result<Value, BackendError> {
        if self.fail_inserts.load(AtomicOrdering::SeqCst) {
            return Err(scripted_failure("insert"));
        }

        let mut row = row;
        if let Value::Object(fields) = &mut row {
            // The hosted service assigns these on insert
            fields
                .entry("id")
                .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
            fields
                .entry("created_at")
                .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));
        }

        {
            let mut tables = self.tables.lock().unwrap_or_else(|p| p.into_inner());
            tables.entry(table.to_string()).or_default().push(row.clone());
        }
        self.emit(table, ChangeKind::Insert);
        Ok(row)
    }

    async fn update_row(&self, table: &str, id: Uuid, patch: Value) -> Result<Value, BackendError> {
        if self.fail_updates.load(AtomicOrdering::SeqCst) {
            return Err(scripted_failure("update"));
        }

        let updated = {
            let mut tables = self.tables.lock().unwrap_or_else(|p| p.into_inner());
            let rows = tables.entry(table.to_string()).or_default();
            let Some(row) = rows.iter_mut().find(|row| row_has_id(row, id)) else {
                return Err(BackendError::RowNotFound {
                    table: table.to_string(),
                    id,
                });
            };
            if let (Value::Object(fields), Value::Object(patch)) = (&mut *row, patch) {
                for (column, value) in patch {
                    fields.insert(column, value);
                }
            }
            row.clone()
        };
        self.emit(table, ChangeKind::Update);
        Ok(updated)
    }

    async fn delete_row(&self, table: &str, id: Uuid) -> Result<(), BackendError> {
        let removed = {
            let mut tables = self.tables.lock().unwrap_or_else(|p| p.into_inner());
            let rows = tables.entry(table.to_string()).or_default();
            let before = rows.len();
            rows.retain(|row| !row_has_id(row, id));
            rows.len() < before
        };
        if removed {
            self.emit(table, ChangeKind::Delete);
        }
        Ok(())
    }

    async fn select_rows(
        &self,
        table: &str,
        query: SelectQuery,
    ) -> Result<Vec<Value>, BackendError> {
        if self.fail_selects.load(AtomicOrdering::SeqCst) {
            return Err(scripted_failure("select"));
        }

        let mut rows: Vec<Value> = {
            let tables = self.tables.lock().unwrap_or_else(|p| p.into_inner());
            tables.get(table).cloned().unwrap_or_default()
        };

        rows.retain(|row| {
            query
                .filters()
                .iter()
                .all(|(column, value)| row.get(column) == Some(value))
        });

        if let Some((column, order)) = query.order() {
            rows.sort_by(|a, b| {
                let ordering = compare_column(
                    a.get(column).unwrap_or(&Value::Null),
                    b.get(column).unwrap_or(&Value::Null),
                );
                match order {
                    super::SortOrder::Ascending => ordering,
                    super::SortOrder::Descending => ordering.reverse(),
                }
            });
        }

        Ok(rows)
    }

    async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BackendError> {
        let mut objects = self.objects.lock().unwrap_or_else(|p| p.into_inner());
        objects.insert(
            object_key(bucket, path),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn signed_url(
        &self,
        bucket: &str,
        path: &str,
        expires_in_secs: u64,
    ) -> Result<String, BackendError> {
        let objects = self.objects.lock().unwrap_or_else(|p| p.into_inner());
        if !objects.contains_key(&object_key(bucket, path)) {
            return Err(BackendError::Api {
                status: 404,
                body: "Object not found".to_string(),
            });
        }
        Ok(format!("memory://{bucket}/{path}?expires={expires_in_secs}"))
    }

    fn subscribe(&self, table: &str) -> broadcast::Receiver<TableChange> {
        let mut channels = self.channels.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(sender) = channels.get(table) {
            return sender.subscribe();
        }
        let (sender, receiver) = broadcast::channel(CHANNEL_CAPACITY);
        channels.insert(table.to_string(), sender);
        receiver
    }
}
