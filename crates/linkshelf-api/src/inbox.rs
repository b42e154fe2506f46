use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tracing::info;
use uuid::Uuid;

use linkshelf_types::api::{Claims, MarkReadResponse, ShareCategoryRequest, UnreadCountResponse};
use linkshelf_types::events::ChangeKind;
use linkshelf_types::validation::validate_note;

use crate::error::ApiError;
use crate::middleware::caller_profile;
use crate::state::{AppState, run_db};

pub async fn list_inbox(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = caller_profile(&state, &claims).await?;
    let messages = run_db(&state, move |db| db.list_inbox(&profile.id)).await?;
    Ok(Json(messages))
}

/// Sends one of the caller's categories to another user by username.
pub async fn share_category(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ShareCategoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let sender = caller_profile(&state, &claims).await?;

    let note = req
        .note
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    if let Some(n) = &note {
        validate_note(n)?;
    }

    let username = req.recipient_username.trim().to_lowercase();
    let recipient = run_db(&state, move |db| db.get_profile_by_username(&username))
        .await?
        .ok_or(ApiError::NotFound("Recipient"))?;
    if recipient.id == sender.id {
        return Err(ApiError::BadRequest("Cannot share a category with yourself".into()));
    }

    let (sender_id, category_name) = (sender.id, req.category_name.clone());
    let category = run_db(&state, move |db| db.get_category_by_name(&sender_id, &category_name))
        .await?
        .ok_or(ApiError::NotFound("Category"))?;

    let token = share_token();
    let recipient_id = recipient.id;
    let message = run_db(&state, move |db| {
        db.insert_inbox_message(&sender_id, &recipient_id, &category, note.as_deref(), &token)
    })
    .await?;

    info!("{} shared '{}' with {}", sender_id, message.category_name, recipient_id);
    state.dispatcher.inbox_changed(ChangeKind::Insert, message.clone());
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = caller_profile(&state, &claims).await?;
    let count = run_db(&state, move |db| db.unread_count(&profile.id)).await?;
    Ok(Json(UnreadCountResponse { count }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = caller_profile(&state, &claims).await?;
    let message = run_db(&state, move |db| db.mark_as_read(&id, &profile.id))
        .await?
        .ok_or(ApiError::NotFound("Message"))?;

    state.dispatcher.inbox_changed(ChangeKind::Update, message.clone());
    Ok(Json(message))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = caller_profile(&state, &claims).await?;
    let updated = run_db(&state, move |db| db.mark_all_as_read(&profile.id)).await?;

    let count = updated.len() as u64;
    for message in updated {
        state.dispatcher.inbox_changed(ChangeKind::Update, message);
    }
    Ok(Json(MarkReadResponse { updated: count }))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = caller_profile(&state, &claims).await?;
    let recipient_id = profile.id;
    let message = run_db(&state, move |db| {
        let Some(message) = db.get_inbox_message(&id)? else {
            return Ok(None);
        };
        if message.recipient_id != recipient_id || !db.delete_inbox_message(&id, &recipient_id)? {
            return Ok(None);
        }
        Ok(Some(message))
    })
    .await?
    .ok_or(ApiError::NotFound("Message"))?;

    state.dispatcher.inbox_changed(ChangeKind::Delete, message);
    Ok(StatusCode::NO_CONTENT)
}

/// 16 random bytes, URL-safe.
fn share_token() -> String {
    let bytes: [u8; 16] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_tokens_are_url_safe_and_distinct() {
        let a = share_token();
        let b = share_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 22);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
