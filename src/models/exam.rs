use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category of a medical exam record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExamKind {
    Biology,
    Radiology,
}

impl ExamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ExamKind::Biology => "biology",
            ExamKind::Radiology => "radiology",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "biology" => Some(ExamKind::Biology),
            "radiology" => Some(ExamKind::Radiology),
            _ => None,
        }
    }
}

/// A biological or radiological exam record stored on the backend.
/// `file_path` is the object-store key of the uploaded report, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub exam_type: ExamKind,
    pub title: String,
    pub exam_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Form payload for a new exam record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamInput {
    pub exam_type: ExamKind,
    pub title: String,
    pub exam_date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exam_kind_round_trips() {
        for kind in [ExamKind::Biology, ExamKind::Radiology] {
            assert_eq!(ExamKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(ExamKind::from_str("surgery"), None);
    }

    #[test]
    fn exam_kind_serde_is_snake_case() {
        assert_eq!(serde_json::to_string(&ExamKind::Radiology).unwrap(), "\"radiology\"");
    }
}
