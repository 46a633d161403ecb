use axum::{
    Json, Router, middleware,
    routing::{get, post},
};
use serde_json::{Value, json};

use crate::middleware::{require_admin, require_auth};
use crate::state::AppState;
use crate::{admin, auth, events, functions, newsletter, tickets};

/// All API routes. Transport layers (CORS, tracing) are added by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/tickets", get(tickets::list_tickets))
        .route("/tickets/live", get(events::live_events))
        .route("/tickets/{ticket_id}", get(tickets::get_ticket))
        .route("/newsletter/subscribe", post(newsletter::subscribe))
        .route("/newsletter/unsubscribe", post(newsletter::unsubscribe));

    let protected_routes = Router::new()
        .route("/auth/session", get(auth::session))
        .route("/me/tickets", get(tickets::my_tickets))
        .route("/tickets/{ticket_id}/purchase", post(tickets::purchase_ticket))
        .route("/functions/ticket-actions", post(functions::ticket_actions))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let admin_routes = Router::new()
        .route("/admin/users", get(admin::list_users))
        .route("/admin/tickets", get(admin::list_tickets))
        .route("/admin/archived-tickets", get(admin::list_archived))
        .route("/admin/newsletter-subscribers", get(admin::list_subscribers))
        .route("/admin/stats", get(admin::stats))
        .route("/admin/reconcile", post(admin::reconcile))
        .layer(middleware::from_fn(require_admin))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
