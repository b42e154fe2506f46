use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use linkshelf_types::api::{Claims, CreateCategoryRequest, UpdateCategoryRequest};
use linkshelf_types::models::{Category, UserProfile};
use linkshelf_types::policy::Entitlement;
use linkshelf_types::validation::validate_category_name;

use crate::error::ApiError;
use crate::middleware::caller_profile;
use crate::state::{AppState, run_db};

pub async fn list_categories(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = caller_profile(&state, &claims).await?;
    let categories = run_db(&state, move |db| db.list_categories(&profile.id)).await?;
    Ok(Json(categories))
}

pub async fn create_category(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateCategoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = caller_profile(&state, &claims).await?;
    let entitlement = Entitlement::from(&profile);

    validate_category_name(&req.name)?;
    if let Some(emoji) = req.emoji.as_deref().filter(|e| !e.is_empty()) {
        check_emoji(&entitlement, emoji)?;
    }

    let user_id = profile.id;
    if !req.is_public {
        let private = run_db(&state, move |db| db.count_private_categories(&user_id)).await?;
        if !entitlement.can_create_private_category(private) {
            return Err(ApiError::LimitReached(
                "Private category limit reached. Upgrade to Premium for unlimited private categories."
                    .into(),
            ));
        }
    }

    let category = run_db(&state, move |db| db.insert_category(&user_id, &req))
        .await
        .map_err(|e| match e {
            ApiError::Conflict(_) => ApiError::Conflict("Category already exists".into()),
            other => other,
        })?;

    info!("Created category {} for {}", category.id, user_id);
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCategoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = caller_profile(&state, &claims).await?;
    let category = owned_category(&state, &profile, id).await?;
    let entitlement = Entitlement::from(&profile);

    if req.is_empty() {
        return Ok(Json(category));
    }
    if let Some(name) = req.name.as_deref() {
        validate_category_name(name)?;
    }
    if let Some(emoji) = req.emoji.as_deref().filter(|e| !e.is_empty()) {
        check_emoji(&entitlement, emoji)?;
    }

    // Only a public -> private flip consumes a private slot.
    if req.is_public == Some(false) && category.is_public {
        let user_id = profile.id;
        let private = run_db(&state, move |db| db.count_private_categories(&user_id)).await?;
        if !entitlement.can_create_private_category(private) {
            return Err(ApiError::LimitReached(
                "Private category limit reached. Upgrade to Premium for unlimited private categories."
                    .into(),
            ));
        }
    }

    let updated = run_db(&state, move |db| db.update_category(&id, &req))
        .await
        .map_err(|e| match e {
            ApiError::Conflict(_) => ApiError::Conflict("Category already exists".into()),
            other => other,
        })?
        .ok_or(ApiError::NotFound("Category"))?;

    Ok(Json(updated))
}

/// Refuses with 409 while the category still holds bookmarks; clear them
/// first through [`delete_category_bookmarks`].
pub async fn delete_category(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = caller_profile(&state, &claims).await?;
    owned_category(&state, &profile, id).await?;

    let deleted = run_db(&state, move |db| db.delete_category(&id))
        .await
        .map_err(|e| match e {
            ApiError::Conflict(_) => ApiError::Conflict("Category still has bookmarks".into()),
            other => other,
        })?;
    if !deleted {
        return Err(ApiError::NotFound("Category"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_category_bookmarks(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = caller_profile(&state, &claims).await?;
    let category = owned_category(&state, &profile, id).await?;

    let user_id = profile.id;
    let deleted = run_db(&state, move |db| {
        db.delete_bookmarks_in_category(&user_id, &category.name)
    })
    .await?;
    Ok(Json(json!({ "deleted": deleted })))
}

/// Another user's category is reported as missing rather than forbidden.
async fn owned_category(
    state: &AppState,
    profile: &UserProfile,
    id: Uuid,
) -> Result<Category, ApiError> {
    let category = run_db(state, move |db| db.get_category(&id))
        .await?
        .ok_or(ApiError::NotFound("Category"))?;
    if category.user_id != profile.id {
        return Err(ApiError::NotFound("Category"));
    }
    Ok(category)
}

fn check_emoji(entitlement: &Entitlement, emoji: &str) -> Result<(), ApiError> {
    if entitlement.available_emoji_set().contains(emoji) {
        Ok(())
    } else {
        Err(ApiError::LimitReached(
            "This emoji is only available on Premium".into(),
        ))
    }
}
