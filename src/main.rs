use anyhow::Context;
use dotenvy::dotenv;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use opsdesk::api_router::configure_api_routes;
use opsdesk::shared::config::AppConfig;
use opsdesk::shared::state::AppState;
use opsdesk::shared::utils::create_conn;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    let pool = create_conn(&config.database.url, config.database.max_connections)
        .context("failed to build database pool")?;

    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState { conn: pool, config });

    let app = configure_api_routes()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(%bind_addr, "opsdesk listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
