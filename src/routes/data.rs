//! History read endpoints consumed by the external dashboard layer.
//!
//! Two read modes: `/data` serves granularity-bucketed statistics straight
//! off raw history, `/monthly` serves the pre-aggregated rollup rows. Invalid
//! granularities and dates are rejected here with 400, before the aggregator
//! is reached.

use axum::{
    extract::Query, extract::State, http::StatusCode, response::IntoResponse, routing::get, Json,
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{error, info};

use super::AppState;
use crate::models::Granularity;
use crate::query;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/data", get(get_data))
        .route("/monthly", get(get_monthly))
}

/// Query parameters for the bucketed read mode.
#[derive(Debug, Deserialize)]
struct DataQuery {
    // ---
    device_id: String,
    /// One of `minute`, `hour`, `day`, `week`, `month`.
    granularity: String,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
}

async fn get_data(
    Query(params): Query<DataQuery>,
    State((pool, _writer)): State<AppState>,
) -> impl IntoResponse {
    // ---
    info!(
        "GET /data - device={} granularity={}",
        params.device_id, params.granularity
    );

    let granularity: Granularity = match params.granularity.parse() {
        Ok(g) => g,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(e.to_string())).into_response();
        }
    };

    match query::bucketed_query(
        &pool,
        &params.device_id,
        params.start_date,
        params.end_date,
        granularity,
    )
    .await
    {
        Ok(buckets) => (StatusCode::OK, Json(buckets)).into_response(),
        Err(e) => {
            error!("Bucketed query failed for '{}': {:#}", params.device_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json("Failed to query history"),
            )
                .into_response()
        }
    }
}

/// Query parameters for the monthly-detail read mode.
#[derive(Debug, Deserialize)]
struct MonthlyQuery {
    // ---
    device_id: String,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
}

async fn get_monthly(
    Query(params): Query<MonthlyQuery>,
    State((pool, _writer)): State<AppState>,
) -> impl IntoResponse {
    // ---
    info!("GET /monthly - device={}", params.device_id);

    match query::monthly_detail(&pool, &params.device_id, params.start_date, params.end_date).await
    {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(e) => {
            error!(
                "Monthly detail query failed for '{}': {:#}",
                params.device_id, e
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json("Failed to query monthly data"),
            )
                .into_response()
        }
    }
}
