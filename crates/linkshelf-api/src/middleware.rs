use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use linkshelf_types::api::Claims;
use linkshelf_types::models::UserProfile;

use crate::error::ApiError;
use crate::state::{AppState, run_db};

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

pub fn decode_token(secret: &str, token: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::Unauthorized)
}

/// Extract and validate JWT from Authorization header. Recovery tokens are
/// refused here; only the password reset route accepts them.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers()).ok_or(ApiError::Unauthorized)?;
    let claims = decode_token(&state.jwt_secret, token)?;
    if claims.recovery {
        return Err(ApiError::Unauthorized);
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Looks up the caller's profile row. Most routes act on behalf of the
/// profile, not the raw auth identity.
pub async fn caller_profile(state: &AppState, claims: &Claims) -> Result<UserProfile, ApiError> {
    let auth_id = claims.sub;
    run_db(state, move |db| db.get_profile_by_auth_id(&auth_id))
        .await?
        .ok_or(ApiError::NotFound("Profile"))
}
