use std::path::PathBuf;
use std::time::Duration;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use pantry_api::auth::AppState;
use pantry_api::middleware::require_auth;
use pantry_api::{approval, auth, inventory, queue};
use pantry_gateway::connection;

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub auto_approve_after: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt_secret =
            std::env::var("PANTRY_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
        let db_path = std::env::var("PANTRY_DB_PATH").unwrap_or_else(|_| "pantry.db".into());
        let host = std::env::var("PANTRY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = std::env::var("PANTRY_PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()?;
        let auto_approve_secs: u64 = std::env::var("PANTRY_AUTO_APPROVE_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()?;

        Ok(Self {
            host,
            port,
            db_path: PathBuf::from(db_path),
            jwt_secret,
            auto_approve_after: Duration::from_secs(auto_approve_secs),
        })
    }
}

/// Assemble the full router: public auth surface, session-guarded API,
/// and the WebSocket change feed.
pub fn app(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/signin", post(auth::signin))
        .route("/auth/login", post(auth::login))
        .route("/auth/requests/{id}", get(auth::get_request))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/approvals", get(approval::list_pending))
        .route("/approvals/{id}/approve", post(approval::approve))
        .route("/approvals/{id}/reject", post(approval::reject))
        .route("/queue", get(queue::get_queue))
        .route("/queue/join", post(queue::join))
        .route("/queue/leave", post(queue::leave))
        .route("/inventory", get(inventory::list_items))
        .route("/inventory/{id}/adjust", post(inventory::adjust))
        .route(
            "/reports",
            get(inventory::list_reports).post(inventory::create_report),
        )
        .route("/reports/{id}/resolve", post(inventory::resolve_report))
        .layer(from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher.clone(), state.jwt_secret.clone())
    })
}
