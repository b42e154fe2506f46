use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use linkshelf_types::api::ErrorBody;
use linkshelf_types::validation::ValidationError;

/// Every handler failure. Rendered as `{ "error": "..." }`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    LimitReached(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("Invalid webhook signature")]
    BadSignature,

    #[error("{0}")]
    Payment(String),

    #[error("Internal server error")]
    Storage(anyhow::Error),

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) | Self::BadSignature => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::LimitReached(_) => StatusCode::PAYMENT_REQUIRED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Payment(_) | Self::Storage(_) | Self::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if linkshelf_db::is_duplicate(&err) {
            Self::Conflict("Already exists".into())
        } else if linkshelf_db::is_foreign_key_violation(&err) {
            Self::Conflict("Referenced row missing or still in use".into())
        } else {
            Self::Storage(err)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Storage(e) => error!("Storage error: {:#}", e),
            Self::Payment(msg) => error!("Payment provider error: {}", msg),
            _ => {}
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}
