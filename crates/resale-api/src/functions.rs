//! POST /functions/ticket-actions: privileged ticket mutations on behalf of
//! the authenticated caller. Responds `{ "success": true, ... }` or
//! `{ "error": "..." }`.

use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use resale_types::api::{ActionResponse, Claims, NewTicket, TicketAction, TicketPatch};
use resale_types::events::MarketEvent;
use resale_types::models::Ticket;

use crate::archival::can_delete;
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::call;
use crate::tickets::{build_ticket, normalize_ticket, validate_ticket};

pub async fn ticket_actions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<TicketAction>, JsonRejection>,
) -> Result<Json<ActionResponse>, ApiError> {
    let Json(action) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let ticket = match action {
        TicketAction::SoftDeleteTicket { ticket_id } => {
            soft_delete(&state, ticket_id, claims.sub).await?;
            None
        }
        TicketAction::CreateTicket { ticket } => Some(create(&state, ticket, claims.sub).await?),
        TicketAction::UpdateTicket { ticket_id, patch } => {
            Some(update(&state, ticket_id, patch, claims.sub).await?)
        }
    };

    Ok(Json(ActionResponse { success: true, ticket }))
}

async fn soft_delete(state: &AppState, ticket_id: Uuid, acting_user: Uuid) -> Result<(), ApiError> {
    let archived = state.archival().run(ticket_id, acting_user).await?;
    state.events.publish(MarketEvent::TicketArchived {
        ticket_id,
        archive_id: archived.id,
    });
    Ok(())
}

async fn create(state: &AppState, new: NewTicket, seller: Uuid) -> Result<Ticket, ApiError> {
    let ticket = build_ticket(new, seller, Utc::now())?;

    let row = ticket.clone();
    call(&state.db, state.backend_timeout, move |db| db.insert_ticket(&row)).await?;

    info!("Ticket {} listed by {}", ticket.id, seller);
    state.events.publish(MarketEvent::TicketListed { ticket: ticket.clone() });
    Ok(ticket)
}

async fn update(
    state: &AppState,
    ticket_id: Uuid,
    patch: TicketPatch,
    acting_user: Uuid,
) -> Result<Ticket, ApiError> {
    if patch.is_empty() {
        return Err(ApiError::BadRequest("Patch contains no changes".into()));
    }

    // Guard against the persisted row, not the caller's copy.
    let mut ticket = call(&state.db, state.backend_timeout, move |db| db.get_ticket(ticket_id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Ticket {} does not exist", ticket_id)))?;
    if !can_delete(&ticket, acting_user) {
        return Err(ApiError::Forbidden(format!("Ticket {} is not yours to edit", ticket_id)));
    }

    patch.apply_to(&mut ticket);
    normalize_ticket(&mut ticket);
    ticket.updated_at = Utc::now();
    validate_ticket(&ticket)?;

    let row = ticket.clone();
    let changed = call(&state.db, state.backend_timeout, move |db| {
        db.update_unsold_ticket(&row, acting_user)
    })
    .await?;
    if changed == 0 {
        // Sold or removed since the read above.
        return Err(ApiError::Forbidden(format!("Ticket {} is not yours to edit", ticket_id)));
    }

    info!("Ticket {} updated by {}", ticket_id, acting_user);
    state.events.publish(MarketEvent::TicketUpdated { ticket: ticket.clone() });
    Ok(ticket)
}
