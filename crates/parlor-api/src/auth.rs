use std::sync::{Arc, OnceLock};

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::{IntoResponse, Redirect},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{debug, info};

use parlor_db::Database;
use parlor_gateway::relay::Relay;
use parlor_types::ANONYMOUS_USERNAME;
use parlor_types::api::{AuthResponse, LoginRequest, RegisterRequest};
use parlor_types::models::SessionUser;

use crate::error::ApiError;
use crate::render::Renderer;
use crate::session::{SESSION_COOKIE, SessionStore, removal_cookie, session_cookie};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub sessions: SessionStore,
    pub relay: Relay,
    pub renderer: Renderer,
    pub secure_cookies: bool,
}

pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Json(req) = body.map_err(|rejection| {
        debug!("Rejected register body ({})", rejection.status());
        ApiError::Validation("Invalid registration")
    })?;
    let username = req.username.trim().to_string();
    if username.is_empty() || req.password.is_empty() {
        return Err(ApiError::Validation("Invalid registration"));
    }
    if username == ANONYMOUS_USERNAME {
        return Err(ApiError::Conflict);
    }

    // Hashing and the insert both block; keep them off the async runtime
    let db = state.db.clone();
    let name = username.clone();
    let user_id = tokio::task::spawn_blocking(move || {
        let password_hash = hash_password(&req.password)?;
        db.create_user(&name, &password_hash)
    })
    .await
    .map_err(ApiError::store("Registration failed"))?
    .map_err(ApiError::store("Registration failed"))?
    .ok_or(ApiError::Conflict)?;

    info!("Registered user {} (ID: {})", username, user_id);
    Ok(Json(AuthResponse::ok(user_id)))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
    let Json(req) = body.map_err(|rejection| {
        debug!("Rejected login body ({})", rejection.status());
        ApiError::Unauthorized
    })?;

    let db = state.db.clone();
    let user = tokio::task::spawn_blocking(move || -> anyhow::Result<Option<SessionUser>> {
        let Some(row) = db.get_user_by_username(req.username.trim())? else {
            // Same Argon2 cost as a wrong password for an unknown name
            if let Some(hash) = dummy_hash() {
                verify_password(&req.password, hash);
            }
            return Ok(None);
        };
        if !verify_password(&req.password, &row.password) {
            return Ok(None);
        }
        Ok(Some(SessionUser {
            user_id: row.id,
            username: row.username,
        }))
    })
    .await
    .map_err(ApiError::store("Login failed"))?
    .map_err(ApiError::store("Login failed"))?
    .ok_or(ApiError::Unauthorized)?;

    let token = state.sessions.create(user.clone()).await;
    info!("User {} (ID: {}) logged in", user.username, user.user_id);

    Ok((
        jar.add(session_cookie(token, state.secure_cookies)),
        Json(AuthResponse::ok(user.user_id)),
    ))
}

/// Destroy the caller's session and send them back to the login page.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.destroy(cookie.value()).await;
    }
    (jar.remove(removal_cookie()), Redirect::to("/"))
}

/// Salted Argon2id hash in PHC string format.
fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

/// Valid PHC hash of a throwaway password, verified against when the
/// username does not exist.
fn dummy_hash() -> Option<&'static str> {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    DUMMY
        .get_or_init(|| hash_password("parlor-unknown-user").ok())
        .as_deref()
}

/// False for a wrong password and for any stored value that is not a valid
/// hash (the anonymous row stores an empty one and can never log in).
fn verify_password(password: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
