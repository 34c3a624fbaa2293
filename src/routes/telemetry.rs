//! Telemetry intake endpoint.
//!
//! The transport seam: whatever delivers decoded device events (the pub/sub
//! client lives outside this service) posts them here one at a time. A
//! malformed body never reaches the writer; the JSON extractor rejects it and
//! that single event is lost, matching the at-most-once contract.

use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router,
};

use super::AppState;
use crate::models::TelemetryEvent;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/telemetry", post(ingest))
}

async fn ingest(
    State((_pool, writer)): State<AppState>,
    Json(event): Json<TelemetryEvent>,
) -> impl IntoResponse {
    // ---
    // The writer logs the cause on failure; the caller only learns that the
    // sample was dropped.
    if writer.ingest(&event).await {
        (StatusCode::ACCEPTED, Json("accepted")).into_response()
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, Json("dropped")).into_response()
    }
}
