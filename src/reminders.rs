//! Medication reminder scheduling.
//!
//! Expands a medication's active date range crossed with its daily reminder
//! times into one-shot alert requests, collecting the identifiers needed to
//! cancel them later. Requests go out sequentially, one instant at a time;
//! a failed instant is logged and skipped, never aborting the batch.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{InvalidReminderTime, NotificationRecord, ReminderTime, ScheduledReminder};
use crate::notification_history::NotificationHistoryStore;
use crate::notify::{AlertRequest, Notifier};

#[derive(Error, Debug)]
pub enum ReminderError {
    #[error(transparent)]
    InvalidTime(#[from] InvalidReminderTime),

    #[error("invalid date range: end {end} precedes start {start}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
}

// ═══════════════════════════════════════════════════════════
// Expansion
// ═══════════════════════════════════════════════════════════

/// Every fire-instant for the closed day range crossed with the times,
/// in day-major, time-minor order. Seconds are zero by construction.
pub fn expand_instants(
    start_date: NaiveDate,
    end_date: NaiveDate,
    times: &[ReminderTime],
) -> Vec<NaiveDateTime> {
    let mut instants = Vec::new();
    for day in start_date.iter_days().take_while(|day| *day <= end_date) {
        for time in times {
            instants.push(time.on(day));
        }
    }
    instants
}

/// Notification title for a medication reminder.
pub fn alert_title(medication_name: &str) -> String {
    format!("Rappel: {medication_name}")
}

/// Notification body for a medication reminder; the user's notes are
/// appended on their own line when present.
pub fn alert_body(medication_name: &str, notes: Option<&str>) -> String {
    let mut body = format!("Il est temps de prendre votre médicament {medication_name}");
    if let Some(notes) = notes.filter(|notes| !notes.trim().is_empty()) {
        body.push('\n');
        body.push_str(notes);
    }
    body
}

// ═══════════════════════════════════════════════════════════
// ReminderScheduler
// ═══════════════════════════════════════════════════════════

/// Turns a (date range × times-of-day) schedule into scheduled alerts.
#[derive(Clone)]
pub struct ReminderScheduler {
    notifier: Arc<dyn Notifier>,
    history: Arc<NotificationHistoryStore>,
}

impl ReminderScheduler {
    pub fn new(notifier: Arc<dyn Notifier>, history: Arc<NotificationHistoryStore>) -> Self {
        Self { notifier, history }
    }

    /// Schedule one alert per (day, time) pair of the closed range and
    /// return the accepted identifiers for persistence on the medication.
    ///
    /// Every pair is attempted exactly once, in day-major, time-minor
    /// order, awaiting each request before issuing the next. Instants in
    /// the past are attempted like any other; the notification service
    /// decides what to do with them. A rejected instant is logged and
    /// skipped, so the returned list can be shorter than the cross
    /// product. Each accepted alert is also appended to the history store
    /// as unread.
    pub async fn expand_and_schedule(
        &self,
        medication_name: &str,
        notes: Option<&str>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        reminder_times: &[ReminderTime],
    ) -> Result<Vec<Uuid>, ReminderError> {
        if end_date < start_date {
            return Err(ReminderError::InvalidDateRange {
                start: start_date,
                end: end_date,
            });
        }

        let title = alert_title(medication_name);
        let body = alert_body(medication_name, notes);
        let instants = expand_instants(start_date, end_date, reminder_times);

        let mut scheduled: Vec<ScheduledReminder> = Vec::with_capacity(instants.len());
        for fire_instant in instants {
            let reminder = ScheduledReminder {
                fire_instant,
                notification_id: Uuid::new_v4(),
            };
            let request = AlertRequest {
                id: reminder.notification_id,
                title: title.clone(),
                body: body.clone(),
                fire_at: fire_instant,
            };

            if let Err(e) = self.notifier.schedule(request).await {
                tracing::warn!(
                    error = %e,
                    fire_instant = %fire_instant,
                    "Failed to schedule reminder, skipping instant"
                );
                continue;
            }

            let record = NotificationRecord::scheduled(
                reminder.notification_id,
                title.clone(),
                body.clone(),
                fire_instant,
            );
            if let Err(e) = self.history.add(&record) {
                // The alert exists regardless; dropping its id would orphan it
                tracing::warn!(
                    error = %e,
                    notification_id = %reminder.notification_id,
                    "Failed to record scheduled reminder in history"
                );
            }
            scheduled.push(reminder);
        }

        tracing::info!(
            medication = %medication_name,
            accepted = scheduled.len(),
            "Expanded reminder schedule"
        );
        Ok(scheduled.into_iter().map(|r| r.notification_id).collect())
    }

    /// Cancel every identifier, best-effort. Identifiers that were already
    /// delivered or cancelled are no-ops; an individual failure is logged
    /// and never stops the remaining cancellations.
    pub async fn cancel_all(&self, notification_ids: &[Uuid]) {
        for &id in notification_ids {
            if let Err(e) = self.notifier.cancel(id).await {
                tracing::debug!(
                    error = %e,
                    notification_id = %id,
                    "Reminder cancellation failed, continuing"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{LocalNotifier, MockNotifier};
    use chrono::{Duration, Local, Timelike};
    use std::collections::HashSet;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn times(raw: &[&str]) -> Vec<ReminderTime> {
        raw.iter().map(|t| t.parse().unwrap()).collect()
    }

    fn scheduler_over(
        mock: MockNotifier,
    ) -> (ReminderScheduler, Arc<MockNotifier>, Arc<NotificationHistoryStore>) {
        let notifier = Arc::new(mock);
        let history = Arc::new(NotificationHistoryStore::in_memory().unwrap());
        let scheduler = ReminderScheduler::new(notifier.clone(), history.clone());
        (scheduler, notifier, history)
    }

    #[test]
    fn expansion_is_day_major_time_minor() {
        let instants = expand_instants(
            date(2024, 1, 1),
            date(2024, 1, 2),
            &times(&["08:00", "20:00"]),
        );
        let rendered: Vec<String> = instants.iter().map(|i| i.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "2024-01-01 08:00:00",
                "2024-01-01 20:00:00",
                "2024-01-02 08:00:00",
                "2024-01-02 20:00:00",
            ]
        );
    }

    #[test]
    fn expansion_includes_both_endpoints_across_leap_day() {
        let instants = expand_instants(date(2024, 2, 28), date(2024, 3, 1), &times(&["12:00"]));
        let days: Vec<String> = instants.iter().map(|i| i.date().to_string()).collect();
        assert_eq!(days, vec!["2024-02-28", "2024-02-29", "2024-03-01"]);
    }

    #[test]
    fn title_and_body_compose_french_copy() {
        assert_eq!(alert_title("Paracétamol"), "Rappel: Paracétamol");
        assert_eq!(
            alert_body("Paracétamol", None),
            "Il est temps de prendre votre médicament Paracétamol"
        );
        assert_eq!(
            alert_body("Paracétamol", Some("Après le repas")),
            "Il est temps de prendre votre médicament Paracétamol\nAprès le repas"
        );
        // Blank notes do not add a trailing line
        assert_eq!(
            alert_body("Paracétamol", Some("  ")),
            "Il est temps de prendre votre médicament Paracétamol"
        );
    }

    #[tokio::test]
    async fn single_day_issues_one_request_per_time() {
        let (scheduler, notifier, _) = scheduler_over(MockNotifier::new());
        let ids = scheduler
            .expand_and_schedule(
                "Doliprane",
                None,
                date(2024, 5, 10),
                date(2024, 5, 10),
                &times(&["08:00", "12:30", "20:00"]),
            )
            .await
            .unwrap();

        assert_eq!(notifier.request_count(), 3);
        assert_eq!(ids.len(), 3);
    }

    #[tokio::test]
    async fn cross_product_instants_are_distinct() {
        let (scheduler, notifier, _) = scheduler_over(MockNotifier::new());
        scheduler
            .expand_and_schedule(
                "Doliprane",
                None,
                date(2024, 3, 1),
                date(2024, 3, 4),
                &times(&["08:00", "14:00", "20:00"]),
            )
            .await
            .unwrap();

        let requests = notifier.requests();
        assert_eq!(requests.len(), 4 * 3);
        let distinct: HashSet<_> = requests.iter().map(|r| r.fire_at).collect();
        assert_eq!(distinct.len(), requests.len());
    }

    #[tokio::test]
    async fn identifiers_are_unique_across_repeated_batches() {
        let (scheduler, _, _) = scheduler_over(MockNotifier::new());
        let mut seen = HashSet::new();
        let mut total = 0;

        for _ in 0..20 {
            let ids = scheduler
                .expand_and_schedule(
                    "Doliprane",
                    None,
                    date(2024, 1, 1),
                    date(2024, 1, 5),
                    &times(&["08:00", "20:00"]),
                )
                .await
                .unwrap();
            total += ids.len();
            seen.extend(ids);
        }

        assert_eq!(seen.len(), total);
    }

    #[tokio::test]
    async fn paracetamol_three_days_two_times_end_to_end() {
        let (scheduler, notifier, history) = scheduler_over(MockNotifier::new());
        let ids = scheduler
            .expand_and_schedule(
                "Paracétamol",
                None,
                date(2024, 1, 1),
                date(2024, 1, 3),
                &times(&["08:00", "20:00"]),
            )
            .await
            .unwrap();

        assert_eq!(ids.len(), 6);

        let requests = notifier.requests();
        let fired: Vec<String> = requests.iter().map(|r| r.fire_at.to_string()).collect();
        assert_eq!(
            fired,
            vec![
                "2024-01-01 08:00:00",
                "2024-01-01 20:00:00",
                "2024-01-02 08:00:00",
                "2024-01-02 20:00:00",
                "2024-01-03 08:00:00",
                "2024-01-03 20:00:00",
            ]
        );
        assert!(requests.iter().all(|r| r.title == "Rappel: Paracétamol"));

        let past = history
            .past_notifications_at(date(2024, 2, 1).and_hms_opt(0, 0, 0).unwrap())
            .unwrap();
        assert_eq!(past.len(), 6);
        assert!(past.iter().all(|r| !r.is_read));
    }

    #[tokio::test]
    async fn empty_times_is_an_empty_batch_not_an_error() {
        let (scheduler, notifier, history) = scheduler_over(MockNotifier::new());
        let ids = scheduler
            .expand_and_schedule("Doliprane", None, date(2024, 1, 1), date(2024, 1, 31), &[])
            .await
            .unwrap();

        assert!(ids.is_empty());
        assert_eq!(notifier.request_count(), 0);
        assert_eq!(
            history
                .past_notifications_at(date(2024, 3, 1).and_hms_opt(0, 0, 0).unwrap())
                .unwrap()
                .len(),
            0
        );
    }

    #[tokio::test]
    async fn reversed_range_is_rejected_before_any_request() {
        let (scheduler, notifier, _) = scheduler_over(MockNotifier::new());
        let err = scheduler
            .expand_and_schedule(
                "Doliprane",
                None,
                date(2024, 2, 1),
                date(2024, 1, 1),
                &times(&["08:00"]),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ReminderError::InvalidDateRange { .. }));
        assert_eq!(notifier.request_count(), 0);
    }

    #[tokio::test]
    async fn failed_instant_is_skipped_and_batch_continues() {
        let (scheduler, notifier, history) =
            scheduler_over(MockNotifier::new().with_schedule_failures(vec![1]));
        let ids = scheduler
            .expand_and_schedule(
                "Doliprane",
                Some("Avec un verre d'eau"),
                date(2024, 1, 1),
                date(2024, 1, 2),
                &times(&["08:00", "20:00"]),
            )
            .await
            .unwrap();

        // All four instants attempted, one rejected
        assert_eq!(notifier.request_count(), 4);
        assert_eq!(ids.len(), 3);

        let past = history
            .past_notifications_at(date(2024, 2, 1).and_hms_opt(0, 0, 0).unwrap())
            .unwrap();
        assert_eq!(past.len(), 3);
    }

    #[tokio::test]
    async fn cancel_all_attempts_every_id_despite_failures() {
        let (scheduler, notifier, _) =
            scheduler_over(MockNotifier::new().with_cancel_failures(vec![0]));
        let ids = vec![Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];

        scheduler.cancel_all(&ids).await;

        assert_eq!(notifier.cancelled(), ids);
    }

    #[tokio::test]
    async fn cancel_all_with_delivered_and_pending_ids() {
        let (notifier, mut rx) = LocalNotifier::new(8);
        let notifier = Arc::new(notifier);
        let history = Arc::new(NotificationHistoryStore::in_memory().unwrap());
        let scheduler = ReminderScheduler::new(notifier.clone(), history);

        let now = Local::now().naive_local();
        let today = now.date();
        let current_minute = ReminderTime::new(now.time().hour(), now.time().minute()).unwrap();

        // One alert already due (fires after the 1s floor), one due tomorrow
        let delivered = scheduler
            .expand_and_schedule("Doliprane", None, today, today, &[current_minute])
            .await
            .unwrap();
        let pending = scheduler
            .expand_and_schedule(
                "Doliprane",
                None,
                today + Duration::days(1),
                today + Duration::days(1),
                &times(&["23:59"]),
            )
            .await
            .unwrap();

        // Wait for the first alert to be delivered
        let alert = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .expect("due alert should fire")
            .expect("channel open");
        assert_eq!(alert.id, delivered[0]);

        let mut all = delivered.clone();
        all.extend(&pending);
        scheduler.cancel_all(&all).await;

        // The pending alert is no longer deliverable
        assert_eq!(notifier.pending_count(), 0);
        let outcome = tokio::time::timeout(std::time::Duration::from_millis(200), rx.recv()).await;
        assert!(outcome.is_err(), "cancelled alert was delivered");
    }
}
