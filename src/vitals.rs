//! Vital-sign measurements and the latest-per-kind dashboard.
//!
//! Measurements are stored as flat rows; the dashboard view is derived
//! on demand from the newest row of each kind, never persisted.

use serde_json::json;
use uuid::Uuid;

use crate::backend::{decode_row, Backend, SelectQuery};
use crate::core::ServiceError;
use crate::live::LiveTable;
use crate::models::{VitalInput, VitalKind, VitalRecord};
use std::sync::Arc;

pub const TABLE: &str = "vitals";

/// Record a measurement. The unit falls back to the kind's default when
/// the form left it empty.
pub async fn record_vital(
    backend: &dyn Backend,
    input: VitalInput,
) -> Result<VitalRecord, ServiceError> {
    let user = backend.current_user().await?;
    let unit = input
        .unit
        .unwrap_or_else(|| input.kind.default_unit().to_string());

    let row = json!({
        "user_id": user.id,
        "kind": input.kind,
        "value": input.value,
        "value_secondary": input.value_secondary,
        "unit": unit,
        "measured_at": input.measured_at,
    });
    let stored = backend.insert_row(TABLE, row).await?;
    Ok(decode_row(stored)?)
}

pub async fn delete_vital(backend: &dyn Backend, id: Uuid) -> Result<(), ServiceError> {
    backend.delete_row(TABLE, id).await?;
    Ok(())
}

/// The signed-in user's measurements, newest first.
pub async fn list_vitals(backend: &dyn Backend) -> Result<Vec<VitalRecord>, ServiceError> {
    let user = backend.current_user().await?;
    let rows = backend.select_rows(TABLE, user_query(user.id)).await?;
    rows.into_iter().map(|row| Ok(decode_row(row)?)).collect()
}

/// One kind's history, newest first. Feeds the per-kind chart.
pub async fn list_vitals_of_kind(
    backend: &dyn Backend,
    kind: VitalKind,
) -> Result<Vec<VitalRecord>, ServiceError> {
    let user = backend.current_user().await?;
    let rows = backend
        .select_rows(TABLE, user_query(user.id).eq("kind", kind.as_str()))
        .await?;
    rows.into_iter().map(|row| Ok(decode_row(row)?)).collect()
}

/// Newest measurement of each kind, in dashboard display order. Kinds
/// with no history are simply absent.
pub async fn latest_vitals(backend: &dyn Backend) -> Result<Vec<VitalRecord>, ServiceError> {
    let all = list_vitals(backend).await?;
    let mut latest = Vec::new();
    for kind in VitalKind::ALL {
        if let Some(record) = all.iter().find(|record| record.kind == kind) {
            latest.push(record.clone());
        }
    }
    Ok(latest)
}

/// Self-refreshing measurement list for the signed-in user.
pub async fn live_vitals(backend: Arc<dyn Backend>) -> Result<LiveTable<VitalRecord>, ServiceError> {
    let user = backend.current_user().await?;
    Ok(LiveTable::open(backend, TABLE, user_query(user.id)).await?)
}

fn user_query(user_id: Uuid) -> SelectQuery {
    SelectQuery::new()
        .eq("user_id", user_id.to_string())
        .order_desc("measured_at")
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
