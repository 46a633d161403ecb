use axum::{Json, extract::State};
use tracing::info;

use resale_types::api::{AdminStats, MaintenanceReport};
use resale_types::models::{ArchivedTicket, NewsletterSubscriber, Ticket, UserProfile};

use crate::error::ApiError;
use crate::maintenance::run_maintenance_pass;
use crate::state::AppState;
use crate::store::call;

pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserProfile>>, ApiError> {
    let users = call(&state.db, state.backend_timeout, |db| db.list_profiles()).await?;
    Ok(Json(users))
}

/// Every live ticket, whatever its status.
pub async fn list_tickets(State(state): State<AppState>) -> Result<Json<Vec<Ticket>>, ApiError> {
    let tickets = call(&state.db, state.backend_timeout, |db| db.list_all_tickets()).await?;
    Ok(Json(tickets))
}

pub async fn list_archived(State(state): State<AppState>) -> Result<Json<Vec<ArchivedTicket>>, ApiError> {
    let archived = call(&state.db, state.backend_timeout, |db| db.list_archived()).await?;
    Ok(Json(archived))
}

/// Includes unsubscribed addresses.
pub async fn list_subscribers(
    State(state): State<AppState>,
) -> Result<Json<Vec<NewsletterSubscriber>>, ApiError> {
    let subscribers = call(&state.db, state.backend_timeout, |db| db.list_subscribers()).await?;
    Ok(Json(subscribers))
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<AdminStats>, ApiError> {
    let stats = call(&state.db, state.backend_timeout, |db| db.stats()).await?;
    Ok(Json(stats))
}

/// POST /admin/reconcile: one maintenance pass on demand.
pub async fn reconcile(State(state): State<AppState>) -> Result<Json<MaintenanceReport>, ApiError> {
    let report = run_maintenance_pass(&state.db, state.backend_timeout).await?;
    info!(
        "Manual maintenance: {} reconciled, {} stale, {} failed, {} expired",
        report.reconciled, report.stale, report.failed, report.expired
    );
    Ok(Json(report))
}
