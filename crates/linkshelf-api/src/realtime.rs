use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::debug;

use linkshelf_gateway::connection;

use crate::error::ApiError;
use crate::middleware::{caller_profile, decode_token};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RealtimeParams {
    pub token: String,
}

/// Browsers cannot set headers on a WebSocket handshake, so the session
/// token travels in the query string.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<RealtimeParams>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let claims = decode_token(&state.jwt_secret, &params.token)?;
    if claims.recovery {
        return Err(ApiError::Unauthorized);
    }
    let profile = caller_profile(&state, &claims).await?;

    debug!("Realtime upgrade for {}", profile.id);
    let dispatcher = state.dispatcher.clone();
    Ok(ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, profile.id)))
}
