//! Medication tracking with reminder expansion.
//!
//! Creating a medication persists the row, expands its reminder schedule
//! into one alert per (day, time) pair, then writes the accepted alert
//! identifiers back onto the row so a later edit or delete can cancel
//! them. Editing cancels the old alerts and re-expands from scratch;
//! deleting cancels whatever is pending and removes the row.

use serde_json::json;
use uuid::Uuid;

use crate::backend::{decode_row, Backend, SelectQuery};
use crate::core::ServiceError;
use crate::live::LiveTable;
use crate::models::{Medication, MedicationInput, ReminderTime};
use crate::reminders::{ReminderError, ReminderScheduler};
use std::sync::Arc;

pub const TABLE: &str = "medications";

/// Parse and validate the form input before anything is persisted or
/// scheduled. A malformed time or reversed date range rejects the whole
/// request.
fn validated_times(input: &MedicationInput) -> Result<Vec<ReminderTime>, ServiceError> {
    let times = input.parsed_times().map_err(ReminderError::from)?;
    if input.end_date < input.start_date {
        return Err(ReminderError::InvalidDateRange {
            start: input.start_date,
            end: input.end_date,
        }
        .into());
    }
    Ok(times)
}

/// Create a medication and schedule its reminders.
///
/// Order matters: the row is persisted first, then the alerts are
/// scheduled, then the accepted identifiers are written back. A failed
/// write-back surfaces the error and leaves the alerts scheduled; there
/// is no rollback.
pub async fn create_medication(
    backend: &dyn Backend,
    scheduler: &ReminderScheduler,
    input: MedicationInput,
) -> Result<Medication, ServiceError> {
    let times = validated_times(&input)?;
    let user = backend.current_user().await?;

    let row = json!({
        "user_id": user.id,
        "name": input.name,
        "dosage": input.dosage,
        "notes": input.notes,
        "start_date": input.start_date,
        "end_date": input.end_date,
        "reminder_times": times,
        "notification_ids": [],
    });
    let stored = backend.insert_row(TABLE, row).await?;
    let medication: Medication = decode_row(stored)?;

    let notification_ids = scheduler
        .expand_and_schedule(
            &medication.name,
            medication.notes.as_deref(),
            medication.start_date,
            medication.end_date,
            &times,
        )
        .await?;

    let patched = backend
        .update_row(
            TABLE,
            medication.id,
            json!({ "notification_ids": notification_ids }),
        )
        .await?;
    Ok(decode_row(patched)?)
}

/// Edit a medication: cancel its pending alerts, re-expand the schedule
/// from the new input, and store the replacement row wholesale.
pub async fn update_medication(
    backend: &dyn Backend,
    scheduler: &ReminderScheduler,
    id: Uuid,
    input: MedicationInput,
) -> Result<Medication, ServiceError> {
    let times = validated_times(&input)?;
    let existing = fetch_medication(backend, id).await?;

    scheduler.cancel_all(&existing.notification_ids).await;
    let notification_ids = scheduler
        .expand_and_schedule(
            &input.name,
            input.notes.as_deref(),
            input.start_date,
            input.end_date,
            &times,
        )
        .await?;

    let patch = json!({
        "name": input.name,
        "dosage": input.dosage,
        "notes": input.notes,
        "start_date": input.start_date,
        "end_date": input.end_date,
        "reminder_times": times,
        "notification_ids": notification_ids,
    });
    let updated = backend.update_row(TABLE, id, patch).await?;
    Ok(decode_row(updated)?)
}

/// Delete a medication, cancelling its pending alerts first. Deleting an
/// already-removed medication is a no-op.
pub async fn delete_medication(
    backend: &dyn Backend,
    scheduler: &ReminderScheduler,
    id: Uuid,
) -> Result<(), ServiceError> {
    let rows = backend
        .select_rows(TABLE, SelectQuery::new().eq("id", id.to_string()))
        .await?;
    if let Some(row) = rows.into_iter().next() {
        let existing: Medication = decode_row(row)?;
        scheduler.cancel_all(&existing.notification_ids).await;
    }
    backend.delete_row(TABLE, id).await?;
    Ok(())
}

pub async fn fetch_medication(
    backend: &dyn Backend,
    id: Uuid,
) -> Result<Medication, ServiceError> {
    let rows = backend
        .select_rows(TABLE, SelectQuery::new().eq("id", id.to_string()))
        .await?;
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| crate::backend::BackendError::RowNotFound {
            table: TABLE.to_string(),
            id,
        })?;
    Ok(decode_row(row)?)
}

/// The signed-in user's medications, most recent start first.
pub async fn list_medications(backend: &dyn Backend) -> Result<Vec<Medication>, ServiceError> {
    let user = backend.current_user().await?;
    let rows = backend
        .select_rows(TABLE, user_query(user.id))
        .await?;
    rows.into_iter()
        .map(|row| Ok(decode_row(row)?))
        .collect()
}

/// Self-refreshing medication list for the signed-in user.
pub async fn live_medications(
    backend: Arc<dyn Backend>,
) -> Result<LiveTable<Medication>, ServiceError> {
    let user = backend.current_user().await?;
    Ok(LiveTable::open(backend, TABLE, user_query(user.id)).await?)
}

fn user_query(user_id: Uuid) -> SelectQuery {
    SelectQuery::new()
        .eq("user_id", user_id.to_string())
        .order_desc("start_date")
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
