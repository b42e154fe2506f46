use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::error::ApiError;
use crate::state::{AppState, run_db};

/// Unauthenticated view of a category someone shared, looked up by the
/// message's share token.
pub async fn get_shared(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let view = run_db(&state, move |db| db.get_shared_category_by_token(&token))
        .await?
        .ok_or(ApiError::NotFound("Shared category"))?;
    Ok(Json(view))
}
