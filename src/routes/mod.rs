use std::sync::Arc;

use axum::Router;
use sqlx::PgPool;

use crate::TelemetryWriter;

mod data;
mod devices;
mod health;
mod telemetry;

// ---

/// Shared state for all routes: the read pool and the write path.
pub type AppState = (PgPool, Arc<TelemetryWriter>);

pub fn router(pool: PgPool, writer: Arc<TelemetryWriter>) -> Router {
    // ---
    Router::new()
        .merge(data::router())
        .merge(devices::router())
        .merge(telemetry::router())
        .merge(health::router())
        .with_state((pool, writer))
}
