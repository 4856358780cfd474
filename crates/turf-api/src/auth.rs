use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand_core::OsRng;
use tracing::{info, warn};
use uuid::Uuid;

use turf_realtime::Store;
use turf_rooms::RoomRegistry;
use turf_types::api::{AuthResponse, Claims, LoginRequest, RegisterRequest};

use crate::error::{ApiError, ApiResult};

const TOKEN_TTL_DAYS: i64 = 7;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub store: Store,
    pub registry: RoomRegistry,
    pub jwt_secret: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let username = req.username.trim();
    if username.chars().count() < 3 || username.chars().count() > 32 {
        return Err(ApiError::bad_request("username must be 3 to 32 characters"));
    }
    if !username.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(ApiError::bad_request(
            "username may only contain letters, digits and underscores",
        ));
    }
    if req.password.len() < 8 {
        return Err(ApiError::bad_request("password must be at least 8 characters"));
    }

    let db = state.store.db();
    if db.get_profile_by_username(username)?.is_some() {
        return Err(ApiError::Conflict(format!("username '{}' is taken", username)));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();

    let user_id = Uuid::new_v4();
    // A concurrent registration can still win the race to the UNIQUE index
    if !db.create_profile(&user_id.to_string(), username, &password_hash)? {
        return Err(ApiError::Conflict(format!("username '{}' is taken", username)));
    }
    info!("Registered {} ({})", username, user_id);

    let token = create_token(&state.jwt_secret, user_id, username)?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user_id,
            username: username.to_string(),
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let profile = state
        .store
        .db()
        .get_profile_by_username(req.username.trim())?
        .ok_or(ApiError::Unauthorized)?;

    // Reserved profiles carry no usable hash and cannot log in
    let parsed_hash = PasswordHash::new(&profile.password).map_err(|_| ApiError::Unauthorized)?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| {
            warn!("Failed login for {}", profile.username);
            ApiError::Unauthorized
        })?;

    let profile = profile.into_profile();
    let token = create_token(&state.jwt_secret, profile.id, &profile.username)?;

    Ok(Json(AuthResponse {
        user_id: profile.id,
        username: profile.username,
        token,
    }))
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Decode and validate a bearer token.
pub fn verify_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .ok()
}
