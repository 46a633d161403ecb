use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use resale_types::api::{Claims, NewTicket, TicketPage};
use resale_types::events::MarketEvent;
use resale_types::models::{Ticket, TicketStatus};

use crate::error::ApiError;
use crate::listing::ListingQuery;
use crate::state::AppState;
use crate::store::call;

const MAX_TITLE_LEN: usize = 120;

/// Rules every stored listing must satisfy.
pub(crate) fn validate_ticket(ticket: &Ticket) -> Result<(), ApiError> {
    let title_len = ticket.title.trim().chars().count();
    if title_len == 0 || title_len > MAX_TITLE_LEN {
        return Err(ApiError::BadRequest(format!(
            "Title must be 1 to {} characters",
            MAX_TITLE_LEN
        )));
    }
    if ticket.category.trim().is_empty() || ticket.venue.trim().is_empty() {
        return Err(ApiError::BadRequest("Category and venue are required".into()));
    }
    if ticket.quantity == 0 {
        return Err(ApiError::BadRequest("Quantity must be at least 1".into()));
    }
    if ticket.price_cents < 0 || ticket.price_per_unit_cents < 0 {
        return Err(ApiError::BadRequest("Prices cannot be negative".into()));
    }
    Ok(())
}

/// Canonical form shared by newly listed and edited tickets.
pub(crate) fn normalize_ticket(ticket: &mut Ticket) {
    ticket.title = ticket.title.trim().to_string();
    ticket.category = ticket.category.trim().to_lowercase();
    ticket.venue = ticket.venue.trim().to_string();
    ticket.description = ticket.description.take().filter(|d| !d.trim().is_empty());
    ticket.file_url = ticket.file_url.take().filter(|f| !f.trim().is_empty());
}

/// Builds a fresh available listing sold and held by `seller`.
pub(crate) fn build_ticket(new: NewTicket, seller: Uuid, now: DateTime<Utc>) -> Result<Ticket, ApiError> {
    let price_per_unit_cents = new
        .price_per_unit_cents
        .unwrap_or_else(|| new.price_cents / i64::from(new.quantity.max(1)));

    let mut ticket = Ticket {
        id: Uuid::new_v4(),
        seller_id: seller,
        owner_id: seller,
        buyer_id: None,
        title: new.title,
        description: new.description,
        category: new.category,
        venue: new.venue,
        event_date: new.event_date,
        event_time: new.event_time,
        price_cents: new.price_cents,
        price_per_unit_cents,
        quantity: new.quantity,
        status: TicketStatus::Available,
        file_url: new.file_url,
        created_at: now,
        updated_at: now,
    };
    normalize_ticket(&mut ticket);
    validate_ticket(&ticket)?;
    Ok(ticket)
}

/// GET /tickets: available listings, searched, sorted and paged.
pub async fn list_tickets(
    State(state): State<AppState>,
    Query(query): Query<ListingQuery>,
) -> Result<Json<TicketPage>, ApiError> {
    let rows = call(&state.db, state.backend_timeout, |db| {
        db.list_tickets_by_status(TicketStatus::Available)
    })
    .await?;

    Ok(Json(query.apply(rows)))
}

pub async fn get_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<Ticket>, ApiError> {
    call(&state.db, state.backend_timeout, move |db| db.get_ticket(ticket_id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Ticket {} does not exist", ticket_id)))
}

/// GET /me/tickets: everything the caller sells, holds or bought.
pub async fn my_tickets(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Ticket>>, ApiError> {
    let user_id = claims.sub;
    let rows = call(&state.db, state.backend_timeout, move |db| db.list_tickets_for_user(user_id)).await?;
    Ok(Json(rows))
}

/// POST /tickets/{id}/purchase
pub async fn purchase_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Ticket>, ApiError> {
    let buyer_id = claims.sub;

    // Conditional update first, then read back whatever state won.
    let (changed, current) = call(&state.db, state.backend_timeout, move |db| {
        let changed = db.purchase_ticket(ticket_id, buyer_id, Utc::now())?;
        Ok((changed, db.get_ticket(ticket_id)?))
    })
    .await?;

    let ticket = current.ok_or_else(|| ApiError::NotFound(format!("Ticket {} does not exist", ticket_id)))?;

    if changed == 0 {
        if ticket.seller_id == buyer_id {
            return Err(ApiError::Forbidden("You cannot buy your own ticket".into()));
        }
        return Err(ApiError::Conflict(format!(
            "Ticket {} is no longer available ({})",
            ticket_id, ticket.status
        )));
    }

    info!("Ticket {} sold to {}", ticket_id, buyer_id);
    state.events.publish(MarketEvent::TicketSold { ticket_id, buyer_id });
    Ok(Json(ticket))
}
