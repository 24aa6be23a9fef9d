//! Biological and radiological exam records.
//!
//! An exam row may carry one uploaded report (PDF or scan). The report
//! is stored first so the row never points at an object that does not
//! exist; viewing goes through a short-lived signed URL.

use serde_json::json;
use uuid::Uuid;

use crate::attachments::{self, Attachment, SIGNED_URL_TTL_SECS};
use crate::backend::{decode_row, Backend, BackendError, SelectQuery};
use crate::core::ServiceError;
use crate::live::LiveTable;
use crate::models::{ExamInput, ExamKind, ExamRecord};
use std::sync::Arc;

pub const TABLE: &str = "exam_records";
pub const BUCKET: &str = "exam-files";

/// Create an exam record, uploading its report first when one was
/// attached.
pub async fn create_exam(
    backend: &dyn Backend,
    input: ExamInput,
    report: Option<Attachment>,
) -> Result<ExamRecord, ServiceError> {
    let user = backend.current_user().await?;

    let file_path = match report {
        Some(report) => {
            let key = attachments::object_key(user.id, &report.file_name);
            let content_type = report.content_type();
            backend
                .upload_object(BUCKET, &key, report.bytes, &content_type)
                .await?;
            Some(key)
        }
        None => None,
    };

    let row = json!({
        "user_id": user.id,
        "exam_type": input.exam_type,
        "title": input.title,
        "exam_date": input.exam_date,
        "notes": input.notes,
        "file_path": file_path,
    });
    let stored = backend.insert_row(TABLE, row).await?;
    Ok(decode_row(stored)?)
}

/// Edit an exam's descriptive fields. A replacement report, when given,
/// is uploaded and takes over `file_path`; the previous object is left
/// in the bucket.
pub async fn update_exam(
    backend: &dyn Backend,
    id: Uuid,
    input: ExamInput,
    report: Option<Attachment>,
) -> Result<ExamRecord, ServiceError> {
    let mut patch = json!({
        "exam_type": input.exam_type,
        "title": input.title,
        "exam_date": input.exam_date,
        "notes": input.notes,
    });
    if let Some(report) = report {
        let user = backend.current_user().await?;
        let key = attachments::object_key(user.id, &report.file_name);
        let content_type = report.content_type();
        backend
            .upload_object(BUCKET, &key, report.bytes, &content_type)
            .await?;
        patch["file_path"] = json!(key);
    }
    let updated = backend.update_row(TABLE, id, patch).await?;
    Ok(decode_row(updated)?)
}

/// Delete an exam record. Its report object, if any, stays in the
/// bucket; only the row goes away.
pub async fn delete_exam(backend: &dyn Backend, id: Uuid) -> Result<(), ServiceError> {
    backend.delete_row(TABLE, id).await?;
    Ok(())
}

pub async fn fetch_exam(backend: &dyn Backend, id: Uuid) -> Result<ExamRecord, ServiceError> {
    let rows = backend
        .select_rows(TABLE, SelectQuery::new().eq("id", id.to_string()))
        .await?;
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| BackendError::RowNotFound {
            table: TABLE.to_string(),
            id,
        })?;
    Ok(decode_row(row)?)
}

/// The signed-in user's exam records, most recent exam first.
pub async fn list_exams(backend: &dyn Backend) -> Result<Vec<ExamRecord>, ServiceError> {
    let user = backend.current_user().await?;
    let rows = backend.select_rows(TABLE, user_query(user.id)).await?;
    rows.into_iter().map(|row| Ok(decode_row(row)?)).collect()
}

/// Same list narrowed to one exam category.
pub async fn list_exams_of_kind(
    backend: &dyn Backend,
    kind: ExamKind,
) -> Result<Vec<ExamRecord>, ServiceError> {
    let user = backend.current_user().await?;
    let rows = backend
        .select_rows(TABLE, user_query(user.id).eq("exam_type", kind.as_str()))
        .await?;
    rows.into_iter().map(|row| Ok(decode_row(row)?)).collect()
}

/// Signed URL for viewing an exam's report, or `None` when the record
/// has no upload.
pub async fn exam_report_url(
    backend: &dyn Backend,
    exam: &ExamRecord,
) -> Result<Option<String>, ServiceError> {
    match exam.file_path.as_deref() {
        Some(path) => Ok(Some(
            backend.signed_url(BUCKET, path, SIGNED_URL_TTL_SECS).await?,
        )),
        None => Ok(None),
    }
}

/// Self-refreshing exam list for the signed-in user.
pub async fn live_exams(backend: Arc<dyn Backend>) -> Result<LiveTable<ExamRecord>, ServiceError> {
    let user = backend.current_user().await?;
    Ok(LiveTable::open(backend, TABLE, user_query(user.id)).await?)
}

fn user_query(user_id: Uuid) -> SelectQuery {
    SelectQuery::new()
        .eq("user_id", user_id.to_string())
        .order_desc("exam_date")
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
