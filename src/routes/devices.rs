//! Device snapshot endpoints.
//!
//! Serves the `device_state` table: the latest reported values per device,
//! optionally filtered by operating state.

use axum::{
    extract::Path, extract::Query, extract::State, http::StatusCode, response::IntoResponse,
    routing::get, Json, Router,
};
use serde::Deserialize;
use tracing::error;

use super::AppState;
use crate::query;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/devices", get(list_devices))
        .route("/devices/location", get(devices_in_bounds))
        .route("/devices/{device_id}", get(get_device))
}

#[derive(Debug, Deserialize)]
struct DevicesQuery {
    // ---
    /// Optional state filter (`Operational`, `Shutdown`, `Fault`).
    state: Option<String>,
}

async fn list_devices(
    Query(params): Query<DevicesQuery>,
    State((pool, _writer)): State<AppState>,
) -> impl IntoResponse {
    // ---
    match query::list_devices(&pool, params.state.as_deref()).await {
        Ok(devices) => (StatusCode::OK, Json(devices)).into_response(),
        Err(e) => {
            error!("Device listing failed: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json("Failed to list devices"),
            )
                .into_response()
        }
    }
}

/// Bounding-box parameters for the map view lookup. Non-float values are
/// rejected by the extractor with 400 before the query runs.
#[derive(Debug, Deserialize)]
struct BoundsQuery {
    // ---
    bottom_left_lat: f64,
    bottom_left_long: f64,
    top_right_lat: f64,
    top_right_long: f64,
}

async fn devices_in_bounds(
    Query(params): Query<BoundsQuery>,
    State((pool, _writer)): State<AppState>,
) -> impl IntoResponse {
    // ---
    match query::devices_in_bounds(
        &pool,
        params.bottom_left_lat,
        params.top_right_lat,
        params.bottom_left_long,
        params.top_right_long,
    )
    .await
    {
        Ok(devices) => (StatusCode::OK, Json(devices)).into_response(),
        Err(e) => {
            error!("Bounded device lookup failed: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json("Failed to list devices in bounds"),
            )
                .into_response()
        }
    }
}

async fn get_device(
    Path(device_id): Path<String>,
    State((pool, _writer)): State<AppState>,
) -> impl IntoResponse {
    // ---
    match query::device_by_id(&pool, &device_id).await {
        Ok(Some(device)) => (StatusCode::OK, Json(device)).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json("Unknown device")).into_response(),
        Err(e) => {
            error!("Device lookup failed for '{}': {:#}", device_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json("Failed to look up device"),
            )
                .into_response()
        }
    }
}
