mod config;

use std::sync::Arc;

use tracing::{info, warn};

use linkshelf_api::{AppState, AppStateInner};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "linkshelf=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    if config.billing.secret_key.is_none() {
        warn!("STRIPE_SECRET_KEY not set, billing routes are disabled");
    }

    // Init database
    let db = linkshelf_db::Database::open(&config.db_path)?;

    let state: AppState = Arc::new(AppStateInner::new(db, config.jwt_secret, config.billing));
    let app = linkshelf_api::router(state);

    info!("Linkshelf server listening on {}", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
