//! Shared application core.
//!
//! `AppCore` wires the collaborators together once at startup: the hosted
//! backend, the notifier delivering local alerts, the on-device
//! notification history, and the reminder scheduler built over the last
//! two. The embedding host holds one `AppCore`; service functions borrow
//! the pieces they need from it.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::backend::{Backend, BackendError, RestBackend};
use crate::config::{self, BackendConfig};
use crate::db::DatabaseError;
use crate::notification_history::NotificationHistoryStore;
use crate::notify::{AlertRequest, LocalNotifier, Notifier};
use crate::reminders::{ReminderError, ReminderScheduler};

/// Delivered-alert channel depth before the notifier starts rejecting.
const DELIVERY_BUFFER: usize = 16;

/// Errors surfaced by the service layer.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Reminder(#[from] ReminderError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("backend not configured: set CARNET_BACKEND_URL and CARNET_BACKEND_KEY")]
    NotConfigured,
}

// ═══════════════════════════════════════════════════════════
// AppCore — collaborator wiring
// ═══════════════════════════════════════════════════════════

pub struct AppCore {
    backend: Arc<dyn Backend>,
    history: Arc<NotificationHistoryStore>,
    scheduler: ReminderScheduler,
}

impl AppCore {
    /// Wire a core from explicit collaborators.
    pub fn new(
        backend: Arc<dyn Backend>,
        notifier: Arc<dyn Notifier>,
        history: Arc<NotificationHistoryStore>,
    ) -> Self {
        let scheduler = ReminderScheduler::new(notifier, Arc::clone(&history));
        Self {
            backend,
            history,
            scheduler,
        }
    }

    /// Production wiring: REST backend from the environment, tokio timer
    /// notifier, history database under the app data dir. The returned
    /// receiver yields each alert at its fire instant.
    pub fn start() -> Result<(Self, mpsc::Receiver<AlertRequest>), ServiceError> {
        tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

        let backend_config = BackendConfig::from_env().ok_or(ServiceError::NotConfigured)?;
        let backend: Arc<dyn Backend> = Arc::new(RestBackend::new(backend_config));

        let history = Arc::new(NotificationHistoryStore::open(&config::history_db_path())?);
        let (notifier, delivered) = LocalNotifier::new(DELIVERY_BUFFER);

        let core = Self::new(backend, Arc::new(notifier), history);
        Ok((core, delivered))
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Owned handle on the backend, for live views and spawned tasks.
    pub fn backend_arc(&self) -> Arc<dyn Backend> {
        Arc::clone(&self.backend)
    }

    pub fn scheduler(&self) -> &ReminderScheduler {
        &self.scheduler
    }

    pub fn history(&self) -> &NotificationHistoryStore {
        &self.history
    }
}
