use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of vital-sign measurement tracked by the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VitalKind {
    HeartRate,
    BloodPressure,
    Glucose,
    Weight,
    Height,
}

impl VitalKind {
    /// All kinds, in dashboard display order.
    pub const ALL: [VitalKind; 5] = [
        VitalKind::HeartRate,
        VitalKind::BloodPressure,
        VitalKind::Glucose,
        VitalKind::Weight,
        VitalKind::Height,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VitalKind::HeartRate => "heart_rate",
            VitalKind::BloodPressure => "blood_pressure",
            VitalKind::Glucose => "glucose",
            VitalKind::Weight => "weight",
            VitalKind::Height => "height",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "heart_rate" => Some(VitalKind::HeartRate),
            "blood_pressure" => Some(VitalKind::BloodPressure),
            "glucose" => Some(VitalKind::Glucose),
            "weight" => Some(VitalKind::Weight),
            "height" => Some(VitalKind::Height),
            _ => None,
        }
    }

    /// Default unit for this kind of measurement.
    pub fn default_unit(self) -> &'static str {
        match self {
            VitalKind::HeartRate => "bpm",
            VitalKind::BloodPressure => "mmHg",
            VitalKind::Glucose => "mg/dL",
            VitalKind::Weight => "kg",
            VitalKind::Height => "cm",
        }
    }
}

/// A single vital-sign measurement.
/// `value_secondary` holds the diastolic reading for blood pressure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VitalRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: VitalKind,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_secondary: Option<f64>,
    pub unit: String,
    pub measured_at: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Form payload for a new measurement. Unit defaults per kind when omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VitalInput {
    pub kind: VitalKind,
    pub value: f64,
    #[serde(default)]
    pub value_secondary: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    pub measured_at: NaiveDateTime,
}
