//! Live table views.
//!
//! A [`LiveTable`] holds the most recently fetched rows of one query and
//! refreshes them whenever the backend's change feed reports the table
//! changed. Refresh is re-fetch-and-replace: the whole list is swapped,
//! so the latest fetch always wins. A failed refresh keeps the previous
//! rows on screen rather than blanking them.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::backend::{Backend, BackendError, SelectQuery};

/// Self-refreshing view over one table query.
pub struct LiveTable<T> {
    rows: watch::Receiver<Vec<T>>,
    task: JoinHandle<()>,
}

impl<T> LiveTable<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Fetch once, then keep the rows fresh from the table's change feed.
    pub async fn open(
        backend: Arc<dyn Backend>,
        table: &str,
        query: SelectQuery,
    ) -> Result<Self, BackendError> {
        let initial = fetch::<T>(backend.as_ref(), table, &query).await?;
        let (tx, rx) = watch::channel(initial);

        let mut events = backend.subscribe(table);
        let table = table.to_string();
        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    // A lagged receiver missed events; one re-fetch
                    // covers them all the same
                    Ok(_) | Err(RecvError::Lagged(_)) => {
                        match fetch::<T>(backend.as_ref(), &table, &query).await {
                            Ok(rows) => {
                                tx.send_replace(rows);
                            }
                            Err(e) => {
                                tracing::warn!(
                                    error = %e,
                                    table = %table,
                                    "Live refresh failed, keeping previous rows"
                                );
                            }
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Ok(Self { rows: rx, task })
    }

    /// Snapshot of the current rows.
    pub fn rows(&self) -> Vec<T> {
        self.rows.borrow().clone()
    }

    /// A receiver that resolves whenever the rows are replaced.
    pub fn watch(&self) -> watch::Receiver<Vec<T>> {
        self.rows.clone()
    }
}

impl<T> Drop for LiveTable<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn fetch<T: DeserializeOwned>(
    backend: &dyn Backend,
    table: &str,
    query: &SelectQuery,
) -> Result<Vec<T>, BackendError> {
    let rows = backend.select_rows(table, query.clone()).await?;
    let mut typed = Vec::with_capacity(rows.len());
    for row in rows {
        typed.push(serde_json::from_value(row)?);
    }
    Ok(typed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use serde::Deserialize;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct NamedRow {
        name: String,
    }

    #[tokio::test]
    async fn open_fetches_the_initial_rows() {
        let backend = Arc::new(MemoryBackend::signed_in());
        backend
            .insert_row("medications", json!({"name": "Doliprane"}))
            .await
            .unwrap();
        backend
            .insert_row("medications", json!({"name": "Spasfon"}))
            .await
            .unwrap();

        let live: LiveTable<NamedRow> =
            LiveTable::open(backend, "medications", SelectQuery::new().order_asc("name"))
                .await
                .unwrap();

        let names: Vec<String> = live.rows().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["Doliprane", "Spasfon"]);
    }

    #[tokio::test]
    async fn change_events_replace_the_rows() {
        let backend = Arc::new(MemoryBackend::signed_in());
        backend
            .insert_row("medications", json!({"name": "Doliprane"}))
            .await
            .unwrap();

        let live: LiveTable<NamedRow> =
            LiveTable::open(Arc::clone(&backend) as Arc<dyn Backend>, "medications", SelectQuery::new())
                .await
                .unwrap();
        let mut watcher = live.watch();

        backend
            .insert_row("medications", json!({"name": "Spasfon"}))
            .await
            .unwrap();

        timeout(Duration::from_secs(1), watcher.changed())
            .await
            .expect("no refresh within 1s")
            .unwrap();
        assert_eq!(live.rows().len(), 2);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_the_previous_rows() {
        let backend = Arc::new(MemoryBackend::signed_in());
        backend
            .insert_row("medications", json!({"name": "Doliprane"}))
            .await
            .unwrap();

        let live: LiveTable<NamedRow> =
            LiveTable::open(Arc::clone(&backend) as Arc<dyn Backend>, "medications", SelectQuery::new())
                .await
                .unwrap();

        backend.set_fail_selects(true);
        backend
            .insert_row("medications", json!({"name": "Spasfon"}))
            .await
            .unwrap();

        sleep(Duration::from_millis(200)).await;
        let names: Vec<String> = live.rows().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["Doliprane"]);
    }

    #[tokio::test]
    async fn open_surfaces_rows_that_do_not_decode() {
        let backend = Arc::new(MemoryBackend::signed_in());
        backend
            .insert_row("medications", json!({"name": 42}))
            .await
            .unwrap();

        let result: Result<LiveTable<NamedRow>, _> =
            LiveTable::open(backend, "medications", SelectQuery::new()).await;
        assert!(matches!(result, Err(BackendError::Decode(_))));
    }
}
