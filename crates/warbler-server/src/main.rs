mod config;

use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use warbler_api::auth::{AppState, AppStateInner, password_hasher};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warbler=debug,warbler_api=debug,warbler_db=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    if config.secret_key == "dev-secret-change-me" {
        warn!("WARBLER_SECRET_KEY is not set; sessions are signed with the development key");
    }

    // Init database
    let db = warbler_db::Database::open(&config.db_path)?;

    // Shared state
    let hasher = password_hasher(config.argon2_memory_kib, config.argon2_iterations)?;
    let app_state: AppState = Arc::new(AppStateInner::new(db, config.secret_key.clone(), hasher)?);

    let app = warbler_api::router(app_state).layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!("Warbler listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
