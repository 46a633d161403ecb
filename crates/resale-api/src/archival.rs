//! Soft delete of ticket listings: copy the row into the archive table, then
//! remove it from the live table.
//!
//! The live row is never touched unless the archive copy is confirmed, and it
//! is only removed while it still equals that copy. A failure between the two
//! steps leaves both in place and is reported as
//! [`ArchivalError::PartialFailure`]; the maintenance sweep finishes such
//! transfers later. Copies that stop matching their live row are abandoned.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use axum::http::StatusCode;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use resale_types::models::{ArchivedTicket, Ticket};

use crate::store::{CallError, TicketStore, call};

/// Ownership guard. A ticket may be removed (or edited) only by a user who
/// both sells and holds it, and only while nobody has bought it.
pub fn can_delete(ticket: &Ticket, acting_user: Uuid) -> bool {
    ticket.seller_id == acting_user && ticket.owner_id == acting_user && ticket.buyer_id.is_none()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Checking,
    Archiving,
    Deleting,
    Done,
}

#[derive(Debug, Error)]
pub enum ArchivalError {
    #[error("Ticket {0} does not exist")]
    NotFound(Uuid),

    #[error("Ticket {0} is not yours to delete")]
    Unauthorized(Uuid),

    #[error("Archiving ticket {ticket_id} failed; nothing was deleted")]
    ArchiveFailed {
        ticket_id: Uuid,
        #[source]
        source: CallError,
    },

    #[error("Ticket {ticket_id} was archived as {archive_id} but is still listed")]
    PartialFailure {
        ticket_id: Uuid,
        archive_id: Uuid,
        #[source]
        source: CallError,
    },

    #[error("Ticket backend unavailable")]
    BackendUnavailable(#[source] CallError),
}

impl ArchivalError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::FORBIDDEN,
            Self::ArchiveFailed { .. }
            | Self::PartialFailure { .. }
            | Self::BackendUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether running the whole transfer again is safe.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ArchiveFailed { .. } | Self::PartialFailure { .. } | Self::BackendUnavailable(_)
        )
    }
}

/// Sequences ownership check, archive write and conditional live delete.
pub struct ArchivalTransfer<S> {
    store: Arc<S>,
    timeout: Duration,
}

impl<S: TicketStore> ArchivalTransfer<S> {
    pub fn new(store: Arc<S>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Moves `ticket_id` into the archive on behalf of `acting_user`.
    pub async fn run(&self, ticket_id: Uuid, acting_user: Uuid) -> Result<ArchivedTicket, ArchivalError> {
        let mut state = TransferState::Idle;

        advance(&mut state, TransferState::Checking, ticket_id);
        let ticket = match call(&self.store, self.timeout, move |s| s.get_ticket(ticket_id)).await {
            Ok(Some(ticket)) => ticket,
            Ok(None) => return Err(ArchivalError::NotFound(ticket_id)),
            Err(e) => {
                error!("Archival of {}: reading ticket failed: {}", ticket_id, e);
                return Err(ArchivalError::BackendUnavailable(e));
            }
        };
        if !can_delete(&ticket, acting_user) {
            warn!(
                "Archival of {} refused for {} (seller {}, owner {}, sold: {})",
                ticket_id,
                acting_user,
                ticket.seller_id,
                ticket.owner_id,
                ticket.is_sold()
            );
            return Err(ArchivalError::Unauthorized(ticket_id));
        }

        advance(&mut state, TransferState::Archiving, ticket_id);
        let archived = self.write_archive(ticket).await?;

        advance(&mut state, TransferState::Deleting, ticket_id);
        self.delete_live(&archived, acting_user).await?;

        advance(&mut state, TransferState::Done, ticket_id);
        info!("Ticket {} archived as {}", ticket_id, archived.id);
        Ok(archived)
    }

    /// Repeats only the delete step of an interrupted transfer, acting as the
    /// archived seller. The live row is removed only while it still equals the
    /// copy; otherwise the copy is abandoned.
    pub async fn retry_delete(&self, archived: &ArchivedTicket) -> Result<(), ArchivalError> {
        self.delete_live(archived, archived.seller_id).await
    }

    /// Confirmed copies left behind by transfers that never finished their
    /// delete.
    pub async fn unreconciled(&self) -> Result<Vec<ArchivedTicket>, CallError> {
        call(&self.store, self.timeout, |s| s.list_unreconciled()).await
    }

    /// Writes and confirms a copy of `ticket`. An open copy from an earlier
    /// run is reused only if it still equals the live row.
    async fn write_archive(&self, ticket: Ticket) -> Result<ArchivedTicket, ArchivalError> {
        let ticket_id = ticket.id;
        let written = call(&self.store, self.timeout, move |s| {
            match s.find_archived(ticket.id)? {
                Some(existing) if existing.matches(&ticket) => return Ok(existing),
                Some(outdated) => {
                    s.abandon_archive(outdated.id, Utc::now())?;
                }
                None => {}
            }
            let archived = ArchivedTicket::from_ticket(&ticket, Utc::now());
            s.insert_archive(&archived)?;
            Ok(archived)
        })
        .await;

        let mut archived = written.map_err(|source| archive_failed(ticket_id, source))?;
        if archived.confirmed_at.is_some() {
            info!("Ticket {} already archived as {}, resuming", ticket_id, archived.id);
            return Ok(archived);
        }

        let (archive_id, now) = (archived.id, Utc::now());
        match call(&self.store, self.timeout, move |s| s.confirm_archive(archive_id, now)).await {
            Ok(true) => {
                archived.confirmed_at = Some(now);
                Ok(archived)
            }
            Ok(false) => Err(archive_failed(
                ticket_id,
                CallError::Backend(anyhow!("archive copy {} was superseded", archive_id)),
            )),
            Err(source) => {
                // The confirmation may still land; make sure the sweep never
                // acts on this copy.
                self.abandon(archive_id).await;
                Err(archive_failed(ticket_id, source))
            }
        }
    }

    async fn delete_live(&self, archived: &ArchivedTicket, acting_user: Uuid) -> Result<(), ArchivalError> {
        let ticket_id = archived.original_id;
        let archive_id = archived.id;
        let updated_at = archived.updated_at;

        match call(&self.store, self.timeout, move |s| {
            s.delete_unsold(ticket_id, acting_user, updated_at)
        })
        .await
        {
            Ok(0) => {}
            Ok(_) => return Ok(()),
            Err(source) => {
                error!(
                    "Archival of {}: archived as {} but delete failed: {}",
                    ticket_id, archive_id, source
                );
                return Err(ArchivalError::PartialFailure { ticket_id, archive_id, source });
            }
        }

        // Nothing matched the conditional delete. Either a concurrent transfer
        // already removed the row, or it was sold or edited in between.
        let current = match call(&self.store, self.timeout, move |s| s.get_ticket(ticket_id)).await {
            Ok(Some(current)) => current,
            Ok(None) => return Err(ArchivalError::NotFound(ticket_id)),
            Err(e) => return Err(ArchivalError::BackendUnavailable(e)),
        };

        warn!(
            "Ticket {} changed during archival (buyer {:?}); abandoning copy {}",
            ticket_id, current.buyer_id, archive_id
        );
        self.abandon(archive_id).await;

        if can_delete(&current, acting_user) {
            Err(archive_failed(
                ticket_id,
                CallError::Backend(anyhow!("ticket {} was edited while being archived", ticket_id)),
            ))
        } else {
            Err(ArchivalError::Unauthorized(ticket_id))
        }
    }

    async fn abandon(&self, archive_id: Uuid) {
        let now = Utc::now();
        if let Err(e) = call(&self.store, self.timeout, move |s| s.abandon_archive(archive_id, now)).await {
            error!("Abandoning archive copy {} failed: {}", archive_id, e);
        }
    }
}

fn archive_failed(ticket_id: Uuid, source: CallError) -> ArchivalError {
    error!("Archival of {}: archive write failed: {}", ticket_id, source);
    ArchivalError::ArchiveFailed { ticket_id, source }
}

fn advance(state: &mut TransferState, next: TransferState, ticket_id: Uuid) {
    debug!("Archival of {}: {:?} -> {:?}", ticket_id, state, next);
    *state = next;
}
