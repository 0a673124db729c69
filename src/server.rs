use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tracing::{error, warn};

use crate::handlers::dispatcher::process_delivery;
use crate::line::signature::verify_signature;
use crate::line::types::WebhookDelivery;
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "x-line-signature";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/webhook", get(health).post(webhook))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if state.settings.channel_secret.is_empty() {
        error!("LINE_CHANNEL_SECRET is not set; rejecting webhook");
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthorized" }))).into_response();
    }
    if !verify_signature(&body, signature, &state.settings.channel_secret) {
        warn!("Rejected webhook with an invalid signature");
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "invalid signature" }))).into_response();
    }

    let delivery: WebhookDelivery = match serde_json::from_slice(&body) {
        Ok(delivery) => delivery,
        Err(err) => {
            warn!("Unparsable webhook body: {err}");
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": "invalid body" }))).into_response();
        }
    };

    // Acknowledge only after every event has been handled.
    process_delivery(&state, delivery).await;
    (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()
}
