use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::{HeaderMap, StatusCode}, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;
use uuid::Uuid;

use linkshelf_types::api::{
    AuthResponse, Claims, LoginRequest, RecoverRequest, RecoverResponse, RegisterRequest,
    ResetPasswordRequest,
};

use crate::error::ApiError;
use crate::middleware::{bearer_token, decode_token};
use crate::state::{AppState, run_db};

const SESSION_DAYS: i64 = 30;
const RECOVERY_MINUTES: i64 = 60;
const MIN_PASSWORD_LEN: usize = 8;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();
    if !email.contains('@') || email.len() > 254 {
        return Err(ApiError::BadRequest("Invalid email".into()));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let lookup = email.clone();
    if run_db(&state, move |db| db.get_user_by_email(&lookup)).await?.is_some() {
        return Err(ApiError::Conflict("Email already registered".into()));
    }

    let password_hash = hash_password(&req.password)?;
    let user_id = Uuid::new_v4();

    let (e, display_name) = (email.clone(), req.display_name.clone());
    run_db(&state, move |db| {
        db.create_user(&user_id, &e, &password_hash)?;
        db.insert_profile(&Uuid::new_v4(), &user_id, &e, display_name.as_deref())
    })
    .await?;

    info!("Registered {}", user_id);
    let token = create_token(&state.jwt_secret, user_id, &email, false)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user_id,
            email,
            display_name: req.display_name,
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();
    let lookup = email.clone();
    let user = run_db(&state, move |db| db.get_user_by_email(&lookup))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password).map_err(|_| ApiError::Internal)?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    let auth_id = user.id;
    let profile = run_db(&state, move |db| db.get_profile_by_auth_id(&auth_id)).await?;
    let token = create_token(&state.jwt_secret, user.id, &user.email, false)?;

    Ok(Json(AuthResponse {
        user_id: user.id,
        email: user.email,
        display_name: profile.and_then(|p| p.display_name),
        token,
    }))
}

/// Issues a short-lived recovery token. Delivery to the user's mailbox is
/// left to the deployment; the token is returned directly.
pub async fn recover(
    State(state): State<AppState>,
    Json(req): Json<RecoverRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();
    let user = run_db(&state, move |db| db.get_user_by_email(&email))
        .await?
        .ok_or(ApiError::NotFound("Account"))?;

    let recovery_token = create_token(&state.jwt_secret, user.id, &user.email, true)?;
    info!("Issued recovery token for {}", user.id);
    Ok(Json(RecoverResponse { recovery_token }))
}

/// Sets a new password. Only accepts a recovery token in the Authorization header.
pub async fn reset_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let token = bearer_token(&headers).ok_or(ApiError::Unauthorized)?;
    let claims = decode_token(&state.jwt_secret, token)?;
    if !claims.recovery {
        return Err(ApiError::Unauthorized);
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let password_hash = hash_password(&req.password)?;
    let auth_id = claims.sub;
    if !run_db(&state, move |db| db.update_password(&auth_id, &password_hash)).await? {
        return Err(ApiError::NotFound("Account"));
    }

    let profile = run_db(&state, move |db| db.get_profile_by_auth_id(&auth_id)).await?;
    let token = create_token(&state.jwt_secret, claims.sub, &claims.email, false)?;
    Ok(Json(AuthResponse {
        user_id: claims.sub,
        email: claims.email,
        display_name: profile.and_then(|p| p.display_name),
        token,
    }))
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|_| ApiError::Internal)
}

pub fn create_token(
    secret: &str,
    user_id: Uuid,
    email: &str,
    recovery: bool,
) -> Result<String, ApiError> {
    let ttl = if recovery {
        chrono::Duration::minutes(RECOVERY_MINUTES)
    } else {
        chrono::Duration::days(SESSION_DAYS)
    };
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
        recovery,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| ApiError::Internal)
}
