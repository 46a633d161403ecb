use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use tracing::info;

use resale_db::SubscribeOutcome;
use resale_types::api::{SubscribeRequest, SubscribeResponse, UnsubscribeRequest};

use crate::auth::{is_valid_email, normalize_email};
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::call;

const DEFAULT_LOCALE: &str = "en";

fn parse_locale(raw: Option<&str>) -> Result<String, ApiError> {
    let Some(raw) = raw.map(str::trim).filter(|l| !l.is_empty()) else {
        return Ok(DEFAULT_LOCALE.to_string());
    };
    // Primary language subtag, optionally with a region: "de", "pt-BR"
    let valid = raw.len() <= 8 && raw.chars().all(|c| c.is_ascii_alphabetic() || c == '-');
    if !valid {
        return Err(ApiError::BadRequest(format!("Unsupported locale '{}'", raw)));
    }
    Ok(raw.to_string())
}

pub async fn subscribe(
    State(state): State<AppState>,
    Json(req): Json<SubscribeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = normalize_email(&req.email);
    if !is_valid_email(&email) {
        return Err(ApiError::BadRequest("A valid email address is required".into()));
    }
    let locale = parse_locale(req.locale.as_deref())?;

    let addr = email.clone();
    let outcome = call(&state.db, state.backend_timeout, move |db| {
        db.subscribe(&addr, &locale, Utc::now())
    })
    .await?;

    let status = match outcome {
        SubscribeOutcome::Created | SubscribeOutcome::Reactivated => {
            info!("Newsletter subscription for {} ({:?})", email, outcome);
            StatusCode::CREATED
        }
        SubscribeOutcome::AlreadySubscribed => StatusCode::OK,
    };

    Ok((status, Json(SubscribeResponse { email, subscribed: true })))
}

pub async fn unsubscribe(
    State(state): State<AppState>,
    Json(req): Json<UnsubscribeRequest>,
) -> Result<Json<SubscribeResponse>, ApiError> {
    let email = normalize_email(&req.email);

    let addr = email.clone();
    let known = call(&state.db, state.backend_timeout, move |db| db.unsubscribe(&addr, Utc::now())).await?;
    if !known {
        return Err(ApiError::NotFound("Address is not subscribed".into()));
    }

    Ok(Json(SubscribeResponse { email, subscribed: false }))
}
