use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One entry of the on-device notification history.
///
/// `id` matches the identifier the notification service was given at
/// scheduling time; `date` is the fire-instant the alert was scheduled for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub date: NaiveDateTime,
    pub is_read: bool,
}

impl NotificationRecord {
    /// A freshly scheduled record: unread by construction.
    pub fn scheduled(id: Uuid, title: String, body: String, date: NaiveDateTime) -> Self {
        Self {
            id,
            title,
            body,
            date,
            is_read: false,
        }
    }
}
