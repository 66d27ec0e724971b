use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub connections: usize,
    pub rooms: usize,
    pub online_users: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.gateway.stats();
    Json(HealthResponse {
        status: "ok",
        connections: stats.connections,
        rooms: stats.rooms,
        online_users: stats.online_users,
    })
}
