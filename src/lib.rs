//! Carnet: the core of a personal health-record companion.
//!
//! Everything a user tracks lives in a hosted backend: medications,
//! exam records, consultations, and vital signs, each scoped to the
//! signed-in account. On top of that sit the medication reminders:
//! creating a medication expands its date range and daily times into
//! individual alerts, and every accepted alert is mirrored into a local
//! history so the app can show what fired while it was closed.
//!
//! Layering, bottom up:
//! - [`models`] are the wire and domain types.
//! - [`db`] plus [`notification_history`] is the local SQLite side.
//! - [`backend`] is the hosted side: REST tables, object storage, and
//!   the realtime change feed, behind one trait so tests can swap in
//!   an in-memory double.
//! - [`notify`], [`reminders`], and [`live`] are the moving parts:
//!   alert delivery, schedule expansion, self-refreshing queries.
//! - [`medications`], [`exams`], [`consultations`], and [`vitals`] are
//!   the per-domain services, tied together by [`core::AppCore`].

pub mod config;
pub mod models;
pub mod db;
pub mod notification_history;
pub mod notify;
pub mod reminders;
pub mod backend;
pub mod live;
pub mod attachments;
pub mod medications;
pub mod exams;
pub mod consultations;
pub mod vitals;
pub mod core;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` wins; without it
/// the crate logs at its default filter.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}
