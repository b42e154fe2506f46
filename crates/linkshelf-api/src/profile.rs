use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use linkshelf_db::ProfilePatch;
use linkshelf_types::api::{
    Claims, CreateProfileRequest, GenerateUsernameResponse, PublicCategory, PublicProfilePage,
    UpdateProfileRequest,
};
use linkshelf_types::models::PublicProfile;
use linkshelf_types::validation::{normalize_url, validate_username};

use crate::error::ApiError;
use crate::middleware::caller_profile;
use crate::state::{AppState, run_db};

const MAX_BIO_LEN: usize = 500;

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(caller_profile(&state, &claims).await?))
}

/// Returns the existing profile unchanged when one is already stored.
pub async fn create_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Option<Json<CreateProfileRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let (auth_id, email) = (claims.sub, claims.email.clone());
    let profile = run_db(&state, move |db| {
        db.insert_profile(&Uuid::new_v4(), &auth_id, &email, req.display_name.as_deref())
    })
    .await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = caller_profile(&state, &claims).await?;

    let username = match req.username {
        Some(u) => {
            let u = u.trim().to_lowercase();
            validate_username(&u)?;
            Some(u)
        }
        None => None,
    };
    if req.bio.as_ref().is_some_and(|b| b.chars().count() > MAX_BIO_LEN) {
        return Err(ApiError::BadRequest(format!(
            "Bio must be at most {} characters",
            MAX_BIO_LEN
        )));
    }
    let avatar_url = req.avatar_url.as_deref().map(normalize_url).transpose()?;
    let social_links = match req.social_links {
        Some(mut links) => {
            for link in &mut links {
                link.url = normalize_url(&link.url)?;
            }
            Some(links)
        }
        None => None,
    };

    let patch = ProfilePatch {
        username,
        display_name: req.display_name,
        bio: req.bio,
        avatar_url,
        social_links,
    };
    let id = profile.id;
    let updated = run_db(&state, move |db| db.update_profile(&id, &patch))
        .await
        .map_err(|e| match e {
            ApiError::Conflict(_) => ApiError::Conflict("Username already taken".into()),
            other => other,
        })?
        .ok_or(ApiError::NotFound("Profile"))?;

    Ok(Json(updated))
}

/// Deletes the auth identity; the profile and everything it owns cascade.
pub async fn delete_account(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let auth_id = claims.sub;
    if !run_db(&state, move |db| db.delete_user(&auth_id)).await? {
        return Err(ApiError::NotFound("Account"));
    }
    info!("Deleted account {}", auth_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn generate_username(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let seed = claims.email.split('@').next().unwrap_or_default().to_string();
    let username = run_db(&state, move |db| db.generate_username(&seed)).await?;
    Ok(Json(GenerateUsernameResponse { username }))
}

/// Public page: profile card plus every public category with its bookmarks.
pub async fn public_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let lookup = username.to_lowercase();
    let page = run_db(&state, move |db| {
        let Some(profile) = db.get_profile_by_username(&lookup)? else {
            return Ok(None);
        };
        let mut categories = Vec::new();
        for category in db.list_public_categories(&profile.id)? {
            let bookmarks = db.list_bookmarks_in_category(&profile.id, &category.name)?;
            categories.push(PublicCategory { category, bookmarks });
        }
        Ok(Some(PublicProfilePage {
            profile: PublicProfile::from(&profile),
            categories,
        }))
    })
    .await?
    .ok_or(ApiError::NotFound("User"))?;

    Ok(Json(page))
}
