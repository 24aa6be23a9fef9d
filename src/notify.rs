//! Notification service seam.
//!
//! Reminder scheduling talks to whatever can deliver one-shot local alerts
//! through the [`Notifier`] trait. Two implementations ship with the crate:
//! [`LocalNotifier`], a tokio-timer notifier for headless hosts that hands
//! due alerts to a channel, and [`MockNotifier`] for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Floor for relative delays: an alert never fires sooner than this,
/// even when its fire-instant is already in the past.
const MIN_DELAY: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("notification request rejected: {reason}")]
    Rejected { reason: String },

    #[error("alert channel closed: nothing is consuming delivered alerts")]
    ChannelClosed,
}

/// A one-shot alert: fire `title`/`body` at `fire_at`, tagged with `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertRequest {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub fire_at: NaiveDateTime,
}

/// Schedules and cancels one-shot local alerts.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Request a one-shot alert. Acceptance means the alert will be
    /// delivered at (or as close as the platform allows to) `fire_at`.
    async fn schedule(&self, request: AlertRequest) -> Result<(), NotifyError>;

    /// Cancel a pending alert. Already-delivered, already-cancelled and
    /// unknown identifiers are quiet no-ops.
    async fn cancel(&self, id: Uuid) -> Result<(), NotifyError>;
}

// ═══════════════════════════════════════════════════════════
// LocalNotifier
// ═══════════════════════════════════════════════════════════

/// In-process notifier for hosts without a platform notification surface.
///
/// Each accepted request spawns a one-shot timer; when it elapses the
/// request is pushed on the delivery channel returned by [`Self::new`].
pub struct LocalNotifier {
    delivered_tx: mpsc::Sender<AlertRequest>,
    pending: Arc<Mutex<HashMap<Uuid, JoinHandle<()>>>>,
}

impl LocalNotifier {
    /// Create the notifier and the receiving end for due alerts.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<AlertRequest>) {
        let (delivered_tx, delivered_rx) = mpsc::channel(buffer);
        let notifier = Self {
            delivered_tx,
            pending: Arc::new(Mutex::new(HashMap::new())),
        };
        (notifier, delivered_rx)
    }

    /// Number of timers still waiting to fire.
    pub fn pending_count(&self) -> usize {
        lock_tolerant(&self.pending).len()
    }
}

/// Lock a map, recovering the inner value if a holder panicked.
fn lock_tolerant<K, V>(mutex: &Mutex<HashMap<K, V>>) -> std::sync::MutexGuard<'_, HashMap<K, V>> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Relative delay until `fire_at`, floored at [`MIN_DELAY`].
fn delay_until(fire_at: NaiveDateTime, now: NaiveDateTime) -> Duration {
    match (fire_at - now).to_std() {
        Ok(delay) if delay > MIN_DELAY => delay,
        _ => MIN_DELAY,
    }
}

#[async_trait]
impl Notifier for LocalNotifier {
    async fn schedule(&self, request: AlertRequest) -> Result<(), NotifyError> {
        if self.delivered_tx.is_closed() {
            return Err(NotifyError::ChannelClosed);
        }

        let delay = delay_until(request.fire_at, Local::now().naive_local());
        let id = request.id;
        let tx = self.delivered_tx.clone();
        let pending = Arc::clone(&self.pending);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            lock_tolerant(&pending).remove(&id);
            let _ = tx.send(request).await;
        });

        if let Some(previous) = lock_tolerant(&self.pending).insert(id, handle) {
            // Identifier reuse replaces the earlier timer
            previous.abort();
        }
        Ok(())
    }

    async fn cancel(&self, id: Uuid) -> Result<(), NotifyError> {
        if let Some(handle) = lock_tolerant(&self.pending).remove(&id) {
            handle.abort();
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// MockNotifier
// ═══════════════════════════════════════════════════════════

/// Test double: accepts everything by default, records all traffic, and can
/// be scripted to fail specific schedule or cancel calls by position.
#[derive(Default)]
pub struct MockNotifier {
    requests: Mutex<Vec<AlertRequest>>,
    cancelled: Mutex<Vec<Uuid>>,
    fail_schedule_at: Vec<usize>,
    fail_cancel_at: Vec<usize>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the schedule calls at these zero-based positions.
    pub fn with_schedule_failures(mut self, positions: Vec<usize>) -> Self {
        self.fail_schedule_at = positions;
        self
    }

    /// Fail the cancel calls at these zero-based positions.
    pub fn with_cancel_failures(mut self, positions: Vec<usize>) -> Self {
        self.fail_cancel_at = positions;
        self
    }

    /// Every schedule request seen so far, accepted or not.
    pub fn requests(&self) -> Vec<AlertRequest> {
        self.requests.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Every cancelled identifier seen so far, in call order.
    pub fn cancelled(&self) -> Vec<Uuid> {
        self.cancelled.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn schedule(&self, request: AlertRequest) -> Result<(), NotifyError> {
        let position = {
            let mut requests = self.requests.lock().unwrap_or_else(|p| p.into_inner());
            requests.push(request);
            requests.len() - 1
        };
        if self.fail_schedule_at.contains(&position) {
            return Err(NotifyError::Rejected {
                reason: format!("scripted failure at schedule call {position}"),
            });
        }
        Ok(())
    }

    async fn cancel(&self, id: Uuid) -> Result<(), NotifyError> {
        let position = {
            let mut cancelled = self.cancelled.lock().unwrap_or_else(|p| p.into_inner());
            cancelled.push(id);
            cancelled.len() - 1
        };
        if self.fail_cancel_at.contains(&position) {
            return Err(NotifyError::Rejected {
                reason: format!("scripted failure at cancel call {position}"),
            });
        }
        Ok(())
    }
}
