use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use linkshelf_db::ToggleOutcome;
use linkshelf_types::api::{Claims, ToggleReactionRequest, ToggleReactionResponse};
use linkshelf_types::events::ChangeKind;
use linkshelf_types::models::{ReactionSummary, ReactionTarget};
use linkshelf_types::policy::Entitlement;

use crate::error::ApiError;
use crate::middleware::caller_profile;
use crate::state::{AppState, run_db};

pub async fn list_reactions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((kind, target_id)): Path<(String, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let target = parse_target(&kind, target_id)?;
    let profile = caller_profile(&state, &claims).await?;

    let reactions = run_db(&state, move |db| db.list_reactions(&target)).await?;
    Ok(Json(ReactionSummary::summarize(&reactions, Some(profile.id))))
}

/// Same emoji again removes the caller's reaction; a different emoji
/// replaces it.
pub async fn toggle_reaction(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((kind, target_id)): Path<(String, Uuid)>,
    Json(req): Json<ToggleReactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let target = parse_target(&kind, target_id)?;
    let profile = caller_profile(&state, &claims).await?;

    if !Entitlement::from(&profile).available_emoji_set().contains(&req.emoji) {
        return Err(ApiError::LimitReached(
            "This emoji is only available on Premium".into(),
        ));
    }

    let user_id = profile.id;
    let (outcome, reactions) = run_db(&state, move |db| {
        if !db.reaction_target_exists(&target)? {
            return Ok(None);
        }
        let outcome = db.toggle_reaction(&user_id, &target, &req.emoji)?;
        let reactions = db.list_reactions(&target)?;
        Ok(Some((outcome, reactions)))
    })
    .await?
    .ok_or(ApiError::NotFound("Reaction target"))?;

    let added = outcome.added();
    match outcome {
        ToggleOutcome::Added(r) => state.dispatcher.reaction_changed(ChangeKind::Insert, r),
        ToggleOutcome::Replaced { current, .. } => {
            state.dispatcher.reaction_changed(ChangeKind::Update, current)
        }
        ToggleOutcome::Removed(r) => state.dispatcher.reaction_changed(ChangeKind::Delete, r),
    }

    Ok(Json(ToggleReactionResponse {
        added,
        reactions: ReactionSummary::summarize(&reactions, Some(user_id)),
    }))
}

fn parse_target(kind: &str, id: Uuid) -> Result<ReactionTarget, ApiError> {
    ReactionTarget::from_parts(kind, id)
        .map_err(|e| ApiError::BadRequest(format!("Reaction target: {}", e)))
}
