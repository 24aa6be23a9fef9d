use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A consultation entry: which practitioner was seen, when, and the user's
/// notes. `audio_path` is the object-store key of an optional voice memo
/// recorded during or after the visit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consultation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub practitioner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialty: Option<String>,
    pub consultation_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Form payload for a new consultation entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultationInput {
    pub practitioner: String,
    #[serde(default)]
    pub specialty: Option<String>,
    pub consultation_date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
}
