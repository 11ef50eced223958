/**
 * API REST NETPROBE - Serveur HTTP du kernel
 *
 * RÔLE :
 * Expose les outils de diagnostic (ping, nmap) et leur historique en JSON.
 *
 * FONCTIONNEMENT :
 * - Serveur Axum, middleware de rate limiting sur toutes les routes
 * - Identité client : premier élément de x-forwarded-for, sinon IP du pair TCP
 * - Routes : /, /health, /ping/{hostname}, /scan/nmap/{hostname}, /history/{tool}
 * - Erreurs converties en messages génériques (429, 400, 404, 500)
 *
 * SÉCURITÉ :
 * - Aucun détail interne (stderr d'un timeout, erreur disque...) dans les réponses
 * - Le détail part dans les logs uniquement
 */

use crate::dispatcher::{DispatchError, Dispatcher};
use crate::models::{ResultRecord, Tool, ToolResponse};
use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(welcome))
        .route("/health", get(|| async { "ok" }))
        .route("/ping/{hostname}", get(run_ping))
        .route("/scan/nmap/{hostname}", get(run_nmap))
        .route("/history/{tool}", get(get_history))
        .layer(middleware::from_fn_with_state(app_state.clone(), rate_limit))
        .with_state(app_state)
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let (code, message) = match &self {
            DispatchError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),
            DispatchError::InvalidTarget => (StatusCode::BAD_REQUEST, self.to_string()),
            DispatchError::UnknownTool(_) => (StatusCode::NOT_FOUND, self.to_string()),
            DispatchError::TimedOut { tool, .. }
            | DispatchError::Execution { tool, .. }
            | DispatchError::Storage { tool, .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("internal server error during {}", tool.activity()),
            ),
            DispatchError::History { tool, .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("internal server error fetching {} history", tool.label()),
            ),
        };
        (code, Json(serde_json::json!({ "message": message }))).into_response()
    }
}

async fn rate_limit(State(app): State<AppState>, req: Request, next: Next) -> Response {
    let client_id = client_identity(&req);
    match app.dispatcher.admit(&client_id, Instant::now()) {
        Ok(()) => next.run(req).await,
        Err(e) => e.into_response(),
    }
}

fn client_identity(req: &Request) -> String {
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').map(str::trim).find(|s| !s.is_empty()));
    if let Some(client) = forwarded {
        return client.to_string();
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

// GET /
async fn welcome() -> Json<serde_json::Value> {
    info!("root endpoint accessed");
    Json(serde_json::json!({ "message": "Welcome! Use /ping/{hostname} or /scan/nmap/{hostname}" }))
}

// GET /ping/{hostname}
async fn run_ping(
    State(app): State<AppState>,
    Path(hostname): Path<String>,
) -> Result<Json<ToolResponse>, DispatchError> {
    app.dispatcher.execute(Tool::Ping, &hostname).await.map(Json)
}

// GET /scan/nmap/{hostname}
async fn run_nmap(
    State(app): State<AppState>,
    Path(hostname): Path<String>,
) -> Result<Json<ToolResponse>, DispatchError> {
    app.dispatcher.execute(Tool::Nmap, &hostname).await.map(Json)
}

// GET /history/{tool} (plus récent en premier)
async fn get_history(
    State(app): State<AppState>,
    Path(tool): Path<String>,
) -> Result<Json<Vec<ResultRecord>>, DispatchError> {
    let tool: Tool = tool.parse()?;
    info!("accessed {tool} history");
    app.dispatcher.history(tool).await.map(Json)
}
