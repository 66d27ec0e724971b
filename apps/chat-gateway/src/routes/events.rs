//! Internal publish endpoint for out-of-process callers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;

use crate::auth::middleware::InternalAuth;
use crate::error::ApiError;
use crate::gateway::dispatch::DeliveryReport;
use crate::gateway::events::EventKind;
use crate::gateway::rooms::RoomId;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/events", post(publish_event))
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    /// `chat:{id}`, `user:{id}` or a bare chat id.
    pub target: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default)]
    pub payload: Value,
}

async fn publish_event(
    _auth: InternalAuth,
    State(state): State<AppState>,
    Json(body): Json<PublishRequest>,
) -> Result<(StatusCode, Json<DeliveryReport>), ApiError> {
    if !body.kind.is_domain_event() {
        return Err(ApiError::bad_request(
            "Only domain events can be published",
        ));
    }
    let target: RoomId = body
        .target
        .parse()
        .map_err(|e: crate::gateway::rooms::InvalidRoomId| ApiError::bad_request(e.to_string()))?;

    let report = state
        .gateway
        .dispatcher()
        .publish_to(&target, body.kind, body.payload);

    tracing::debug!(
        %target,
        event = ?body.kind,
        delivered = report.delivered,
        failed = report.failed,
        "internal event published"
    );
    Ok((StatusCode::ACCEPTED, Json(report)))
}
