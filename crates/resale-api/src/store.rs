//! Gateway between request handlers and the blocking SQLite store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use resale_db::Database;
use resale_types::models::{ArchivedTicket, Ticket};

/// The subset of the data backend the archival workflow depends on.
///
/// Calls are blocking; async callers go through [`call`].
pub trait TicketStore: Send + Sync + 'static {
    fn get_ticket(&self, id: Uuid) -> Result<Option<Ticket>>;

    /// The open copy of `original_id`. Abandoned copies are never returned.
    fn find_archived(&self, original_id: Uuid) -> Result<Option<ArchivedTicket>>;

    fn insert_archive(&self, archived: &ArchivedTicket) -> Result<()>;

    /// Returns false if the copy was abandoned before it could be confirmed.
    fn confirm_archive(&self, archive_id: Uuid, now: DateTime<Utc>) -> Result<bool>;

    fn abandon_archive(&self, archive_id: Uuid, now: DateTime<Utc>) -> Result<bool>;

    /// Deletes the live row only if it is still unsold, both sold and held by
    /// `acting_user`, and last changed at `updated_at`. Returns the number of
    /// rows removed.
    fn delete_unsold(&self, id: Uuid, acting_user: Uuid, updated_at: DateTime<Utc>) -> Result<usize>;

    /// Confirmed, open copies whose live ticket still exists.
    fn list_unreconciled(&self) -> Result<Vec<ArchivedTicket>>;
}

impl TicketStore for Database {
    fn get_ticket(&self, id: Uuid) -> Result<Option<Ticket>> {
        Database::get_ticket(self, id)
    }

    fn find_archived(&self, original_id: Uuid) -> Result<Option<ArchivedTicket>> {
        self.get_archived_by_original(original_id)
    }

    fn insert_archive(&self, archived: &ArchivedTicket) -> Result<()> {
        self.insert_archived(archived)
    }

    fn confirm_archive(&self, archive_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        self.confirm_archived(archive_id, now)
    }

    fn abandon_archive(&self, archive_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        self.abandon_archived(archive_id, now)
    }

    fn delete_unsold(&self, id: Uuid, acting_user: Uuid, updated_at: DateTime<Utc>) -> Result<usize> {
        self.delete_unsold_ticket(id, acting_user, updated_at)
    }

    fn list_unreconciled(&self) -> Result<Vec<ArchivedTicket>> {
        Database::list_unreconciled(self)
    }
}

#[derive(Debug, Error)]
pub enum CallError {
    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),

    #[error("backend call failed: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Runs a blocking store call off the async runtime, bounded by `timeout`.
///
/// On timeout the blocking call keeps running to completion; its outcome is
/// unknown to the caller.
pub async fn call<S, F, T>(store: &Arc<S>, timeout: Duration, f: F) -> Result<T, CallError>
where
    S: Send + Sync + 'static,
    F: FnOnce(&S) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(store);
    let task = tokio::task::spawn_blocking(move || f(&store));

    match tokio::time::timeout(timeout, task).await {
        Err(_) => Err(CallError::Timeout(timeout)),
        Ok(Err(join)) => Err(CallError::Backend(anyhow::anyhow!(
            "spawn_blocking join error: {}",
            join
        ))),
        Ok(Ok(result)) => result.map_err(CallError::Backend),
    }
}
