use linkshelf_types::validation::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    LimitReached(String),

    #[error("{0}")]
    Duplicate(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Not signed in")]
    Unauthorized,

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Timed out")]
    Timeout,

    #[error("Local storage error: {0}")]
    Storage(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        Self::Remote(e.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
