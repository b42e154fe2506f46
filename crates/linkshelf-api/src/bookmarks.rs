use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use linkshelf_types::api::{Claims, CreateBookmarkRequest, UpdateBookmarkRequest};
use linkshelf_types::models::{Bookmark, UserProfile};
use linkshelf_types::policy::Entitlement;
use linkshelf_types::validation::{normalize_url, validate_bookmark_name};

use crate::error::ApiError;
use crate::middleware::caller_profile;
use crate::state::{AppState, run_db};

pub async fn list_bookmarks(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = caller_profile(&state, &claims).await?;
    let bookmarks = run_db(&state, move |db| db.list_bookmarks(&profile.id)).await?;
    Ok(Json(bookmarks))
}

pub async fn create_bookmark(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(mut req): Json<CreateBookmarkRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = caller_profile(&state, &claims).await?;

    validate_bookmark_name(&req.site_name)?;
    req.site_url = normalize_url(&req.site_url)?;

    let user_id = profile.id;
    let total = run_db(&state, move |db| db.count_bookmarks(&user_id)).await?;
    if !Entitlement::from(&profile).can_create_bookmark(total) {
        return Err(ApiError::LimitReached(
            "Bookmark limit reached. Upgrade to Premium for unlimited bookmarks.".into(),
        ));
    }

    let category_name = req.category_name.clone();
    let category = run_db(&state, move |db| db.get_category_by_name(&user_id, &category_name)).await?;
    if category.is_none() {
        return Err(ApiError::NotFound("Category"));
    }

    let bookmark = run_db(&state, move |db| db.insert_bookmark(&user_id, &req))
        .await
        .map_err(|e| match e {
            ApiError::Conflict(_) => ApiError::Conflict("Bookmark already exists".into()),
            other => other,
        })?;

    Ok((StatusCode::CREATED, Json(bookmark)))
}

pub async fn update_bookmark(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(mut req): Json<UpdateBookmarkRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = caller_profile(&state, &claims).await?;
    let bookmark = owned_bookmark(&state, &profile, id).await?;

    if let Some(name) = req.site_name.as_deref() {
        validate_bookmark_name(name)?;
    }
    if let Some(url) = req.site_url.as_mut() {
        *url = normalize_url(url)?;
    }
    if req.site_name.is_none() && req.site_url.is_none() {
        return Ok(Json(bookmark));
    }

    let updated = run_db(&state, move |db| db.update_bookmark(&id, &req))
        .await
        .map_err(|e| match e {
            ApiError::Conflict(_) => ApiError::Conflict("Bookmark already exists".into()),
            other => other,
        })?
        .ok_or(ApiError::NotFound("Bookmark"))?;

    Ok(Json(updated))
}

pub async fn delete_bookmark(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = caller_profile(&state, &claims).await?;
    owned_bookmark(&state, &profile, id).await?;

    if !run_db(&state, move |db| db.delete_bookmark(&id)).await? {
        return Err(ApiError::NotFound("Bookmark"));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn owned_bookmark(
    state: &AppState,
    profile: &UserProfile,
    id: Uuid,
) -> Result<Bookmark, ApiError> {
    let bookmark = run_db(state, move |db| db.get_bookmark(&id))
        .await?
        .ok_or(ApiError::NotFound("Bookmark"))?;
    if bookmark.user_id != profile.id {
        return Err(ApiError::NotFound("Bookmark"));
    }
    Ok(bookmark)
}
