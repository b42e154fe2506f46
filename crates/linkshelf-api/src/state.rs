use std::sync::Arc;

use tracing::error;

use linkshelf_db::Database;
use linkshelf_gateway::Dispatcher;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
    pub billing: BillingConfig,
    pub http: reqwest::Client,
}

/// Payment platform settings. Every Stripe field may be absent in
/// development; the billing routes then answer 500.
#[derive(Debug, Clone, Default)]
pub struct BillingConfig {
    pub secret_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub price_monthly: Option<String>,
    pub price_yearly: Option<String>,
    pub api_base: String,
    pub public_url: String,
}

impl AppStateInner {
    pub fn new(db: Database, jwt_secret: String, billing: BillingConfig) -> Self {
        Self {
            db,
            jwt_secret,
            dispatcher: Dispatcher::new(),
            billing,
            http: reqwest::Client::new(),
        }
    }
}

/// Runs blocking DB work off the async runtime.
pub async fn run_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })?
        .map_err(ApiError::from)
}
