//! HTTP/WebSocket API for the live casino server.
//!
//! The surface is deliberately small: a health check plus one WebSocket
//! endpoint per game. All game traffic flows over the sockets; identity
//! arrives as a signed bearer token in the query string.
//!
//! ```text
//! GET /health                  - Health check (public)
//! GET /ws/baccarat?token=<jwt> - Shared baccarat table (auth required)
//! GET /ws/blackjack?token=<jwt> - Private blackjack session (auth required)
//! ```

pub mod websocket;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use live_casino::auth::JwtVerifier;
use live_casino::baccarat::TableHandle;
use live_casino::blackjack::SessionDriver;
use live_casino::ledger::Ledger;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Application state shared across handlers and WebSocket connections.
/// Cloned per request; every field is a cheap handle.
#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<JwtVerifier>,
    pub ledger: Arc<dyn Ledger>,
    pub baccarat: TableHandle,
    pub blackjack: Arc<SessionDriver>,
}

/// Create the API router with all endpoints and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ws/baccarat", get(websocket::baccarat_handler))
        .route("/ws/blackjack", get(websocket::blackjack_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check for monitoring and load balancers. Confirms the table
/// actor answers and reports how much is live.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let table_status = state.baccarat.status().await.ok();
    let sessions = state.blackjack.registry().len().await;
    let healthy = table_status.is_some();

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let response = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "baccarat": table_status,
        "blackjack_sessions": sessions,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    (status_code, Json(response))
}
