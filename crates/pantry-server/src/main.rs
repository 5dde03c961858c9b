use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use pantry_api::approval;
use pantry_api::auth::{AppState, AppStateInner};
use pantry_gateway::dispatcher::Dispatcher;
use pantry_server::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pantry=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = pantry_db::Database::open(&config.db_path)?;

    // Shared state
    let dispatcher = Dispatcher::new();
    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        dispatcher,
        auto_approve_after: config.auto_approve_after,
    });

    // Requests left pending by a previous run get their timers back
    let resumed = approval::resume_watchers(state.clone()).await?;
    if resumed > 0 {
        info!("Resumed {} pending login request timer(s)", resumed);
    }

    let app = pantry_server::app(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Pantry server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
