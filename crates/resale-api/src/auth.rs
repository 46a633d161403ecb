use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{error, info};
use uuid::Uuid;

use resale_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use resale_types::models::{Role, UserProfile};

use crate::error::ApiError;
use crate::state::AppState;
use crate::store::call;

pub(crate) fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = normalize_email(&req.email);
    let display_name = req.display_name.trim().to_string();

    // Validate input
    if !is_valid_email(&email) {
        return Err(ApiError::BadRequest("A valid email address is required".into()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::BadRequest("Password must be at least 8 characters".into()));
    }
    if display_name.is_empty() || display_name.chars().count() > 64 {
        return Err(ApiError::BadRequest("Display name must be 1 to 64 characters".into()));
    }

    // Check if email is taken
    let lookup = email.clone();
    let existing = call(&state.db, state.backend_timeout, move |db| db.get_user_by_email(&lookup)).await?;
    if existing.is_some() {
        return Err(ApiError::Conflict("Email is already registered".into()));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {}", e)))?
        .to_string();

    let user_id = Uuid::new_v4();
    let role = if state.is_admin_email(&email) { Role::Admin } else { Role::User };

    let (e, name) = (email.clone(), display_name.clone());
    let created = call(&state.db, state.backend_timeout, move |db| {
        db.create_user(user_id, &e, &name, &password_hash, role)
    })
    .await?;
    // A concurrent registration took the address after the check above
    if !created {
        return Err(ApiError::Conflict("Email is already registered".into()));
    }

    let token = create_token(&state.jwt_secret, state.token_ttl_hours, user_id, &email, role)?;

    info!("Registered user {} ({:?})", user_id, role);
    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = normalize_email(&req.email);
    let invalid = || ApiError::Unauthorized("Invalid email or password".into());

    let user = call(&state.db, state.backend_timeout, move |db| db.get_user_by_email(&email))
        .await?
        .ok_or_else(invalid)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| ApiError::Internal(format!("stored hash for {} unreadable: {}", user.id, e)))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| invalid())?;

    let token = create_token(&state.jwt_secret, state.token_ttl_hours, user.id, &user.email, user.role)?;

    Ok(Json(LoginResponse {
        user_id: user.id,
        display_name: user.display_name,
        role: user.role,
        token,
    }))
}

/// GET /auth/session: resolves the bearer token to the application profile
/// and records the visit.
pub async fn session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UserProfile>, ApiError> {
    let user_id = claims.sub;
    let profile = call(&state.db, state.backend_timeout, move |db| {
        if !db.touch_user(user_id, Utc::now())? {
            return Ok(None);
        }
        db.get_profile(user_id)
    })
    .await?;

    profile
        .map(Json)
        .ok_or_else(|| ApiError::Unauthorized("Session user no longer exists".into()))
}

pub(crate) fn create_token(
    secret: &str,
    ttl_hours: i64,
    user_id: Uuid,
    email: &str,
    role: Role,
) -> Result<String, ApiError> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        role,
        exp: (Utc::now() + chrono::Duration::hours(ttl_hours)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        error!("Token encoding failed: {}", e);
        ApiError::Internal("token encoding failed".into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::decode_token;

    #[test]
    fn email_validation() {
        assert!(is_valid_email("fan@example.com"));
        assert!(!is_valid_email("fan@localhost"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("fan.example.com"));
        assert_eq!(normalize_email("  Fan@Example.COM "), "fan@example.com");
    }

    #[test]
    fn token_roundtrip_keeps_role() {
        let id = Uuid::new_v4();
        let token = create_token("secret", 1, id, "admin@example.com", Role::Admin).unwrap();
        let claims = decode_token("secret", &token).unwrap();
        assert_eq!(claims.sub, id);
        assert!(claims.is_admin());
        assert!(decode_token("other-secret", &token).is_err());
    }
}
